mod convergence;
mod end_to_end;
mod handoff;
mod startup;
