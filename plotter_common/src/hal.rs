//! Hardware output seam.
//!
//! The motion core never touches pins directly; it drives the
//! [`driver::StepperOutputs`] trait, implemented by the concrete backends.

pub mod driver;
