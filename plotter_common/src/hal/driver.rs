//! Stepper output trait and error types.
//!
//! This module defines:
//! - `StepperOutputs` trait - Interface for pluggable step/direction backends
//! - `HalError` enum - Error types for output operations
//! - `OutputFactory` type alias - Factory function type
//! - `Level` - Logic level of a single output line

use crate::axis::Axis;
use crate::config::AxesConfig;
use crate::consts::AXIS_COUNT;
use thiserror::Error;

/// Error types for output backends.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Backend initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),
}

/// Logic level of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    #[inline]
    pub const fn from_bool(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }

    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }

    /// Logical complement.
    #[inline]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// Optional backend diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDiagnostics {
    /// Rising step edges seen per axis.
    pub pulses: [u64; AXIS_COUNT],
    /// Net signed steps per axis, as interpreted from the direction line.
    pub net_steps: [i64; AXIS_COUNT],
}

/// Factory function type for creating output backends.
pub type OutputFactory = fn(&AxesConfig) -> Box<dyn StepperOutputs>;

/// Trait defining the step/direction output capability.
///
/// The pulse generator owns one backend and calls it from its real-time
/// loop, so `set_direction` and `set_step` must not block or allocate.
///
/// # Lifecycle
///
/// 1. `enable()` - Called once per axis before the pulse loop starts
/// 2. `set_direction()` / `set_step()` - Called every pulse cycle
/// 3. `disable()` - Called when the process shuts down
pub trait StepperOutputs: Send {
    /// Returns the backend's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Assert the driver enable line for `axis`.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` if the axis driver cannot be enabled.
    fn enable(&mut self, axis: Axis) -> Result<(), HalError>;

    /// Drive the direction line of `axis`.
    fn set_direction(&mut self, axis: Axis, level: Level);

    /// Drive the step line of `axis`.
    fn set_step(&mut self, axis: Axis, level: Level);

    /// Release the driver enable line for `axis`.
    /// Default: no-op
    fn disable(&mut self, _axis: Axis) -> Result<(), HalError> {
        Ok(())
    }

    /// Get backend diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<OutputDiagnostics> {
        None
    }
}

impl<T: StepperOutputs + ?Sized> StepperOutputs for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn enable(&mut self, axis: Axis) -> Result<(), HalError> {
        (**self).enable(axis)
    }

    fn set_direction(&mut self, axis: Axis, level: Level) {
        (**self).set_direction(axis, level)
    }

    fn set_step(&mut self, axis: Axis, level: Level) {
        (**self).set_step(axis, level)
    }

    fn disable(&mut self, axis: Axis) -> Result<(), HalError> {
        (**self).disable(axis)
    }

    fn diagnostics(&self) -> Option<OutputDiagnostics> {
        (**self).diagnostics()
    }
}
