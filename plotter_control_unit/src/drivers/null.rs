//! Backend that drops every output write.

use plotter_common::axis::Axis;
use plotter_common::config::AxesConfig;
use plotter_common::hal::driver::{HalError, Level, StepperOutputs};

pub const DRIVER_NAME: &str = "null";

/// Dry-run outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutputs;

impl StepperOutputs for NullOutputs {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn enable(&mut self, _axis: Axis) -> Result<(), HalError> {
        Ok(())
    }

    fn set_direction(&mut self, _axis: Axis, _level: Level) {}

    fn set_step(&mut self, _axis: Axis, _level: Level) {}
}

pub fn create_outputs(_config: &AxesConfig) -> Box<dyn StepperOutputs> {
    Box::new(NullOutputs)
}
