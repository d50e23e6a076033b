//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the plotter TOML
//! configuration and validate its parameter bounds.
//!
//! # Usage
//!
//! ```rust,no_run
//! use plotter_common::config::{ConfigLoader, ConfigError, PlotterConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = PlotterConfig::load(Path::new("plotter.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::axis::Axis;
use crate::consts::{
    AXIS_COUNT, DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PATH, DEFAULT_TICKS_PER_UNIT, PULSE_SPACING_US,
    PULSE_SPACING_US_MAX, PULSE_WIDTH_US, PULSE_WIDTH_US_MAX, PULSE_WIDTH_US_MIN, WARMUP_MS,
};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, per-edge tracing.
    Trace,
    /// Per-target diagnostics.
    Debug,
    /// Lifecycle messages.
    #[default]
    Info,
    /// Malformed input and other recoverable problems.
    Warn,
    /// Failures that stop a loop.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across the plotter binaries.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "plotter-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "plotter".to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pulse train cadence and startup timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Step pulse width [µs] (default: 5).
    pub pulse_width_us: u32,
    /// Pause after the release phase [µs] (default: 600).
    pub pulse_spacing_us: u32,
    /// Settling pause after the priming target [ms] (default: 3000).
    pub warmup_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pulse_width_us: PULSE_WIDTH_US,
            pulse_spacing_us: PULSE_SPACING_US,
            warmup_ms: WARMUP_MS,
        }
    }
}

impl TimingConfig {
    pub fn pulse_width(&self) -> Duration {
        Duration::from_micros(u64::from(self.pulse_width_us))
    }

    pub fn pulse_spacing(&self) -> Duration {
        Duration::from_micros(u64::from(self.pulse_spacing_us))
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Nominal duration of one pulse cycle.
    pub fn cycle_period(&self) -> Duration {
        self.pulse_width() + self.pulse_spacing()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pulse_width_us < PULSE_WIDTH_US_MIN || self.pulse_width_us > PULSE_WIDTH_US_MAX {
            return Err(ConfigError::ValidationError(format!(
                "pulse_width_us {} out of range [{}, {}]",
                self.pulse_width_us, PULSE_WIDTH_US_MIN, PULSE_WIDTH_US_MAX
            )));
        }
        if self.pulse_spacing_us < self.pulse_width_us
            || self.pulse_spacing_us > PULSE_SPACING_US_MAX
        {
            return Err(ConfigError::ValidationError(format!(
                "pulse_spacing_us {} out of range [{}, {}]",
                self.pulse_spacing_us, self.pulse_width_us, PULSE_SPACING_US_MAX
            )));
        }
        Ok(())
    }
}

/// Transport carrying readiness tokens out and target messages in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// tty device configured raw (8N1).
    #[default]
    Serial,
    /// Process stdin/stdout.
    Stdio,
    /// TCP connection to a remote peer.
    Tcp,
    /// Accept one TCP connection on `address`.
    #[serde(rename = "tcp_listen")]
    TcpListen,
}

/// Link configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub kind: LinkKind,
    /// Serial device path.
    pub path: String,
    /// Serial baud rate.
    pub baud: u32,
    /// `host:port` to connect to (`kind = "tcp"`) or bind (`kind = "tcp_listen"`).
    pub address: Option<String>,
    /// Give up waiting for a target after this long [ms]; 0 waits forever.
    pub receive_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: LinkKind::default(),
            path: DEFAULT_SERIAL_PATH.to_string(),
            baud: DEFAULT_BAUD_RATE,
            address: None,
            receive_timeout_ms: 0,
        }
    }
}

impl LinkConfig {
    /// Receive timeout, `None` when waiting forever.
    pub fn receive_timeout(&self) -> Option<Duration> {
        (self.receive_timeout_ms > 0).then(|| Duration::from_millis(self.receive_timeout_ms))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            LinkKind::Serial if self.path.is_empty() => Err(ConfigError::ValidationError(
                "link.path cannot be empty for a serial link".to_string(),
            )),
            LinkKind::Serial if self.baud == 0 => Err(ConfigError::ValidationError(
                "link.baud must be positive".to_string(),
            )),
            LinkKind::Tcp | LinkKind::TcpListen
                if self.address.as_deref().is_none_or(str::is_empty) =>
            {
                Err(ConfigError::ValidationError(
                    "link.address is required for a tcp link".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Per-axis configuration.
///
/// Pin numbers are informational for the motion core and consumed only by
/// hardware backends. `max_velocity` and `max_acceleration` are carried
/// through but not enforced: the pulse train runs at a fixed cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    /// Step output line.
    pub step_pin: Option<u32>,
    /// Direction output line.
    pub dir_pin: Option<u32>,
    /// Driver enable output line.
    pub enable_pin: Option<u32>,
    /// Swap the electrical meaning of forward/reverse.
    pub polarity_inverted: bool,
    /// Maximum velocity [rev/s] (not enforced).
    pub max_velocity: f64,
    /// Maximum acceleration [rev/s²] (not enforced).
    pub max_acceleration: f64,
    /// Elementary steps per caller unit.
    pub ticks_per_unit: f64,
    /// Lowest accepted target [caller units].
    pub travel_min: Option<f64>,
    /// Highest accepted target [caller units].
    pub travel_max: Option<f64>,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            step_pin: None,
            dir_pin: None,
            enable_pin: None,
            polarity_inverted: false,
            max_velocity: 0.5,
            max_acceleration: 5.0,
            ticks_per_unit: DEFAULT_TICKS_PER_UNIT,
            travel_min: None,
            travel_max: None,
        }
    }
}

impl AxisConfig {
    /// Reference wiring of the X axis.
    pub fn default_x() -> Self {
        Self {
            step_pin: Some(18),
            dir_pin: Some(2),
            enable_pin: Some(6),
            ..Self::default()
        }
    }

    /// Reference wiring of the Y axis.
    pub fn default_y() -> Self {
        Self {
            step_pin: Some(16),
            dir_pin: Some(3),
            enable_pin: Some(7),
            ..Self::default()
        }
    }

    fn validate(&self, axis: Axis) -> Result<(), ConfigError> {
        if !self.ticks_per_unit.is_finite() || self.ticks_per_unit <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: ticks_per_unit must be positive and finite, got {}",
                self.ticks_per_unit
            )));
        }
        if !self.max_velocity.is_finite() || self.max_velocity < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: max_velocity must be non-negative, got {}",
                self.max_velocity
            )));
        }
        if !self.max_acceleration.is_finite() || self.max_acceleration < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "axis {axis}: max_acceleration must be non-negative, got {}",
                self.max_acceleration
            )));
        }
        if let (Some(min), Some(max)) = (self.travel_min, self.travel_max) {
            if min >= max {
                return Err(ConfigError::ValidationError(format!(
                    "axis {axis}: travel_min {min} must be below travel_max {max}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration of both axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxesConfig {
    #[serde(default = "AxisConfig::default_x")]
    pub x: AxisConfig,
    #[serde(default = "AxisConfig::default_y")]
    pub y: AxisConfig,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            x: AxisConfig::default_x(),
            y: AxisConfig::default_y(),
        }
    }
}

impl AxesConfig {
    pub fn get(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }
}

/// Top-level plotter configuration.
///
/// # TOML Example
///
/// ```toml
/// priming = [0.0, 0.0]
///
/// [shared]
/// service_name = "plotter"
///
/// [timing]
/// pulse_width_us = 5
/// pulse_spacing_us = 600
///
/// [link]
/// kind = "serial"
/// path = "/dev/ttyACM0"
///
/// [axes.x]
/// ticks_per_unit = 1600.0
/// polarity_inverted = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlotterConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub link: LinkConfig,
    /// First target installed at startup [caller units].
    #[serde(default)]
    pub priming: [f64; AXIS_COUNT],
    #[serde(default)]
    pub axes: AxesConfig,
}

impl PlotterConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate all parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.timing.validate()?;
        self.link.validate()?;
        for axis in Axis::ALL {
            self.axes.get(axis).validate(axis)?;
        }
        if self.priming.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::ValidationError(
                "priming coordinates must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Any serde-deserializable struct can use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
