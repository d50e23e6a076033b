//! Integration test: one target from the wire to the step lines.
//!
//! Validates: READY only once the priming pose is reached → `(2,3)` parsed
//! and installed → both axes pulse together, X settles after 2 cycles and Y
//! after 3 → READY again only after the last pulse.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use plotter_common::axis::{Axis, AxisMask};
use plotter_common::config::{PlotterConfig, TimingConfig};
use plotter_common::consts::READY_TOKEN;
use plotter_control_unit::coordinator::{CoordinatorState, TargetCoordinator};
use plotter_control_unit::drivers::SimulationOutputs;
use plotter_control_unit::link::MemoryLink;
use plotter_control_unit::pulse::PulseGenerator;
use plotter_control_unit::state::axis::MotionTable;

fn unit_scale_config() -> PlotterConfig {
    let mut config = PlotterConfig::default();
    config.timing.warmup_ms = 0;
    config.axes.x.ticks_per_unit = 1.0;
    config.axes.y.ticks_per_unit = 1.0;
    config
}

fn step_to(
    coordinator: &mut TargetCoordinator<MemoryLink>,
    running: &AtomicBool,
    wanted: fn(CoordinatorState) -> bool,
) {
    for _ in 0..100 {
        if wanted(coordinator.state()) {
            return;
        }
        coordinator.step(running).unwrap();
    }
    panic!("coordinator stuck in {:?}", coordinator.state());
}

#[test]
fn target_pair_is_walked_and_readiness_follows() {
    let config = unit_scale_config();
    let (table, writer) = MotionTable::create(&config.axes);
    let outputs = SimulationOutputs::new(&config.axes);
    let probe = outputs.clone();
    let mut pulse = PulseGenerator::new(Arc::clone(&table), outputs, &TimingConfig::default());
    pulse.enable_outputs().unwrap();

    let mut coordinator = TargetCoordinator::new(writer, MemoryLink::new(b"(2,3)"), &config);
    let running = AtomicBool::new(true);
    coordinator.prime(&running).unwrap();

    // Priming pose is the origin, so the first READY goes out immediately.
    step_to(&mut coordinator, &running, |s| s == CoordinatorState::AwaitIdle);
    coordinator.step(&running).unwrap();
    coordinator.step(&running).unwrap();
    assert_eq!(coordinator.link().sent_text(), READY_TOKEN);

    step_to(&mut coordinator, &running, |s| {
        matches!(s, CoordinatorState::InstallTarget(_))
    });
    coordinator.step(&running).unwrap();
    assert_eq!(table.target_snapshot(), [2, 3]);

    // No second READY while the axes are moving.
    for _ in 0..50 {
        coordinator.step(&running).unwrap();
    }
    assert_eq!(coordinator.state(), CoordinatorState::AwaitIdle);
    assert_eq!(coordinator.stats().announcements, 1);

    assert_eq!(pulse.cycle(), AxisMask::X | AxisMask::Y);
    assert_eq!(pulse.cycle(), AxisMask::X | AxisMask::Y);
    assert_eq!(table.axis(Axis::X).current_position(), 2);
    coordinator.step(&running).unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::AwaitIdle);

    assert_eq!(pulse.cycle(), AxisMask::Y);
    assert_eq!(table.positions(), [2, 3]);
    assert_eq!(probe.net_steps(), [2, 3]);

    coordinator.step(&running).unwrap();
    coordinator.step(&running).unwrap();
    assert_eq!(coordinator.link().sent_text(), READY_TOKEN.repeat(2));
    assert_eq!(coordinator.stats().targets_installed, 1);
}

#[test]
fn malformed_and_oversized_input_never_moves_the_axes() {
    let config = unit_scale_config();
    let (table, writer) = MotionTable::create(&config.axes);
    let mut pulse =
        PulseGenerator::new(Arc::clone(&table), SimulationOutputs::new(&config.axes), &TimingConfig::default());

    let mut inbound = b"(abc,2)(1,2,3)(".to_vec();
    inbound.extend(std::iter::repeat_n(b'7', 100));
    inbound.extend_from_slice(b")(nan,1)(-1,1)");
    let mut coordinator = TargetCoordinator::new(writer, MemoryLink::new(&inbound), &config);
    let running = AtomicBool::new(true);

    for _ in 0..200 {
        coordinator.step(&running).unwrap();
        pulse.cycle();
        if coordinator.stats().targets_installed == 1 {
            break;
        }
    }

    let stats = coordinator.stats();
    assert_eq!(stats.protocol_errors, 4);
    assert_eq!(stats.targets_installed, 1);
    assert_eq!(table.installs(), 1);
    assert_eq!(table.target_snapshot(), [-1, 1]);
}
