//! Plotter Common Library
//!
//! Shared constants, the axis model, configuration loading and the hardware
//! output seam used by every crate of the XY plotter workspace.
//!
//! # Module Structure
//!
//! - [`axis`] - Axis identifiers, step direction and axis masks
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide numeric limits and protocol literals
//! - [`hal`] - Hardware output trait and error types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use plotter_common::prelude::*;
//!
//! let config = PlotterConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(Axis::ALL.len(), AXIS_COUNT);
//! ```

pub mod axis;
pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
