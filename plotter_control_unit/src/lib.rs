//! # Plotter Control Unit Library
//!
//! Real-time step/direction control for the two linear axes of an XY motion
//! platform. Two loops run side by side for the lifetime of the process:
//!
//! 1. **PulseGenerator** ([`pulse`]): fixed-cadence pulse train walking every
//!    axis's `current_position` toward its `target_position`.
//! 2. **TargetCoordinator** ([`coordinator`]): waits for all axes to come to
//!    rest, announces readiness on the link, receives the next `(x,y)` target
//!    ([`codec`], [`link`]) and installs it.
//!
//! The loops share nothing but the [`state::axis::MotionTable`]: per-axis
//! atomics plus an odd/even write sequence that lets the pulse loop read both
//! targets as one consistent pair.

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod cycle;
pub mod driver_registry;
pub mod drivers;
pub mod link;
pub mod pulse;
pub mod state;
