//! System-wide constants for the plotter workspace.
//!
//! Single source of truth for numeric limits, timing defaults and protocol
//! literals. Imported by all crates.

use static_assertions::const_assert;

/// Number of driven axes (X and Y).
pub const AXIS_COUNT: usize = 2;

/// Step pulse width in microseconds (setup phase pause).
pub const PULSE_WIDTH_US: u32 = 5;

/// Pause after the release phase in microseconds.
pub const PULSE_SPACING_US: u32 = 600;

/// Lower bound for the configured pulse width.
pub const PULSE_WIDTH_US_MIN: u32 = 1;

/// Upper bound for the configured pulse width.
pub const PULSE_WIDTH_US_MAX: u32 = 1_000;

/// Upper bound for the configured pulse spacing (1 s).
pub const PULSE_SPACING_US_MAX: u32 = 1_000_000;

/// Settling pause after the priming target is installed [ms].
pub const WARMUP_MS: u64 = 3_000;

/// Full steps per motor revolution (1.8° motors).
pub const STEPS_PER_REVOLUTION: u32 = 200;

/// Driver microstep resolution.
pub const MICROSTEP_RESOLUTION: u32 = 8;

/// Elementary steps per motor revolution.
pub const TICKS_PER_REVOLUTION: u32 = STEPS_PER_REVOLUTION * MICROSTEP_RESOLUTION;

/// Default scale from caller units to elementary steps (one revolution per unit).
pub const DEFAULT_TICKS_PER_UNIT: f64 = TICKS_PER_REVOLUTION as f64;

/// Largest accepted target magnitude in elementary steps (2^53, exact in f64).
pub const MAX_TARGET_TICKS: i64 = 1 << 53;

/// Maximum payload length between `(` and `)` of a target message.
pub const MAX_TOKEN_LEN: usize = 64;

/// Readiness token written once per completed motion.
pub const READY_TOKEN: &str = "READYREADYREADYREADY\n";

/// Substring the host side looks for on each received line.
pub const READY_MARKER: &str = "READY";

/// Default serial device.
pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyACM0";

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const_assert!(AXIS_COUNT == 2);
const_assert!(PULSE_WIDTH_US >= PULSE_WIDTH_US_MIN && PULSE_WIDTH_US <= PULSE_WIDTH_US_MAX);
const_assert!(PULSE_SPACING_US >= PULSE_WIDTH_US);
const_assert!(MAX_TOKEN_LEN >= 16);
