//! Step/direction output backends.
//!
//! - [`simulation`] - In-memory line levels with edge counting, for
//!   development and testing without hardware
//! - [`null`] - Discards every write (dry run)
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `StepperOutputs` from `plotter_common::hal::driver`
//! 3. Register its factory in [`register_builtin`]

pub mod null;
pub mod simulation;

pub use null::NullOutputs;
pub use simulation::{SimulatedAxis, SimulationOutputs};

use crate::driver_registry::DriverRegistry;

/// Register all built-in backends.
pub fn register_builtin(registry: &mut DriverRegistry) {
    registry.register(simulation::DRIVER_NAME, simulation::create_outputs);
    registry.register(null::DRIVER_NAME, null::create_outputs);
}
