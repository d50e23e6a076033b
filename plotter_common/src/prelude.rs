//! Prelude module for common re-exports.
//!
//! ```rust
//! use plotter_common::prelude::*;
//! ```

// ─── Axis model ─────────────────────────────────────────────────────
pub use crate::axis::{Axis, AxisMask, StepDirection};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    AxesConfig, AxisConfig, ConfigError, ConfigLoader, LinkConfig, LinkKind, LogLevel,
    PlotterConfig, SharedConfig, TimingConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{AXIS_COUNT, MAX_TOKEN_LEN, READY_TOKEN};

// ─── Hardware outputs ───────────────────────────────────────────────
pub use crate::hal::driver::{HalError, Level, OutputDiagnostics, OutputFactory, StepperOutputs};
