//! # Plotter Sender
//!
//! Host side of the target handoff: loads a path of `(x, y)` points and
//! feeds it to the control unit one point per readiness announcement.
//!
//! - [`path`] - path file formats, scaling and decimation
//! - [`session`] - READY-driven streaming over a byte link

pub mod path;
pub mod session;
