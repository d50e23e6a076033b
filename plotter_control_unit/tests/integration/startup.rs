//! Integration test: startup from a TOML configuration.
//!
//! Validates: config parsing and validation → backend selected by name from
//! the registry → priming pose installed in steps → axis settings carried
//! into the motion table and the backend.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use plotter_common::axis::Axis;
use plotter_common::config::LinkKind;
use plotter_common::hal::driver::{HalError, StepperOutputs};
use plotter_control_unit::config::load_config_from_str;
use plotter_control_unit::coordinator::TargetCoordinator;
use plotter_control_unit::driver_registry::DriverRegistry;
use plotter_control_unit::link::MemoryLink;
use plotter_control_unit::pulse::PulseGenerator;
use plotter_control_unit::state::axis::MotionTable;

const PLOTTER_TOML: &str = r#"
priming = [0.5, -0.25]

[shared]
log_level = "debug"
service_name = "bench-plotter"

[timing]
pulse_width_us = 5
pulse_spacing_us = 600
warmup_ms = 0

[link]
kind = "tcp"
address = "127.0.0.1:7777"
receive_timeout_ms = 500

[axes.x]
step_pin = 18
dir_pin = 2
enable_pin = 6
ticks_per_unit = 1600.0
travel_min = -10.0
travel_max = 10.0

[axes.y]
step_pin = 16
dir_pin = 3
enable_pin = 7
polarity_inverted = true
ticks_per_unit = 800.0
"#;

#[test]
fn config_to_primed_table() {
    let config = load_config_from_str(PLOTTER_TOML).unwrap();
    assert_eq!(config.shared.service_name, "bench-plotter");
    assert_eq!(config.link.kind, LinkKind::Tcp);

    let registry = DriverRegistry::with_builtin();
    let outputs = registry.create("simulation", &config.axes).unwrap();
    assert_eq!(outputs.name(), "simulation");

    let (table, writer) = MotionTable::create(&config.axes);
    assert!(table.axis(Axis::Y).polarity_inverted());
    assert_eq!(table.axis(Axis::X).config().travel_max, Some(10.0));

    let mut coordinator = TargetCoordinator::new(writer, MemoryLink::new(b""), &config);
    coordinator.prime(&AtomicBool::new(true)).unwrap();
    assert_eq!(table.target_snapshot(), [800, -200]);

    let mut pulse = PulseGenerator::new(Arc::clone(&table), outputs, &config.timing);
    pulse.enable_outputs().unwrap();
    for _ in 0..800 {
        pulse.cycle();
    }
    assert!(table.all_at_target());
    let diag = pulse.outputs().diagnostics().unwrap();
    assert_eq!(diag.net_steps, [800, -200]);
}

#[test]
fn unknown_backend_is_rejected() {
    let config = load_config_from_str(PLOTTER_TOML).unwrap();
    let registry = DriverRegistry::with_builtin();
    assert!(matches!(
        registry.create("gpio", &config.axes),
        Err(HalError::DriverNotFound(_))
    ));
}

#[test]
fn invalid_timing_is_rejected() {
    let toml = "[timing]\npulse_width_us = 10\npulse_spacing_us = 5";
    assert!(load_config_from_str(toml).is_err());
}
