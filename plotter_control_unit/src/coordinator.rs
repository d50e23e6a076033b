//! Target coordinator.
//!
//! State machine advanced by [`TargetCoordinator::step`]:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!  ┌───────────┐ all axes at target ┌───────────────┐       │
//!  │ AwaitIdle │───────────────────►│ AnnounceReady │       │
//!  └───────────┘                    └───────┬───────┘       │
//!        ▲  ▲                               │ READY token   │
//!        │  │ malformed / timeout   ┌───────▼───────┐       │
//!        │  └───────────────────────│  AwaitTarget  │       │
//!        │                          └───────┬───────┘       │
//!        │                                  │ (x,y)         │
//!        │                         ┌────────▼────────┐      │
//!        └─────────────────────────│  InstallTarget  │──────┘
//!                                  └─────────────────┘
//! ```
//!
//! Before the loop, [`TargetCoordinator::prime`] installs the priming pose and
//! waits out the warm-up period. A target is only installed after every axis
//! was confirmed at rest, so a new pair never interrupts motion toward the
//! previous one.

use std::hint::spin_loop;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use plotter_common::axis::Axis;
use plotter_common::config::{AxesConfig, AxisConfig, PlotterConfig};
use plotter_common::consts::{AXIS_COUNT, MAX_TARGET_TICKS, READY_TOKEN};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{TargetDecoder, TargetPair};
use crate::link::{ByteLink, ReceiveError, RecvOutcome, is_disconnect, receive_target};
use crate::state::axis::{MotionTable, TargetWriter};

/// Idle polls between two `yield_now` calls while waiting for motion to end.
const IDLE_POLLS_PER_YIELD: u32 = 1024;

/// Granularity of the interruptible warm-up wait.
const WARMUP_SLICE: Duration = Duration::from_millis(20);

/// Coordinate that cannot become a target.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetError {
    #[error("axis {axis}: coordinate {value} is not finite")]
    NotFinite { axis: Axis, value: f64 },

    #[error("axis {axis}: coordinate {value} exceeds the representable step range")]
    OutOfRange { axis: Axis, value: f64 },

    #[error("axis {axis}: coordinate {value} is outside travel [{min}, {max}]")]
    OutsideTravel {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("link I/O error: {0}")]
    Link(#[from] io::Error),

    #[error("priming target rejected: {0}")]
    Priming(#[from] TargetError),
}

/// Reason the coordinator loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorExit {
    /// The running flag was cleared.
    Cancelled,
    /// The peer closed the link.
    LinkClosed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinatorState {
    AwaitIdle,
    AnnounceReady,
    AwaitTarget,
    InstallTarget(TargetPair),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub targets_installed: u64,
    pub targets_rejected: u64,
    pub protocol_errors: u64,
    pub announcements: u64,
    pub receive_timeouts: u64,
}

/// Convert a coordinate in caller units to elementary steps.
///
/// Rounds to the nearest step.
pub fn units_to_ticks(axis: Axis, config: &AxisConfig, value: f64) -> Result<i64, TargetError> {
    if !value.is_finite() {
        return Err(TargetError::NotFinite { axis, value });
    }

    let min = config.travel_min.unwrap_or(f64::NEG_INFINITY);
    let max = config.travel_max.unwrap_or(f64::INFINITY);
    if value < min || value > max {
        return Err(TargetError::OutsideTravel {
            axis,
            value,
            min,
            max,
        });
    }

    let ticks = (value * config.ticks_per_unit).round();
    if !ticks.is_finite() || ticks.abs() > MAX_TARGET_TICKS as f64 {
        return Err(TargetError::OutOfRange { axis, value });
    }
    Ok(ticks as i64)
}

/// Convert both coordinates; either both succeed or nothing is returned.
pub fn pair_to_ticks(axes: &AxesConfig, pair: &TargetPair) -> Result<[i64; AXIS_COUNT], TargetError> {
    let mut ticks = [0; AXIS_COUNT];
    for axis in Axis::ALL {
        ticks[axis.index()] = units_to_ticks(axis, axes.get(axis), pair.get(axis))?;
    }
    Ok(ticks)
}

/// Readiness/handoff loop over a [`ByteLink`].
pub struct TargetCoordinator<L: ByteLink> {
    writer: TargetWriter,
    link: L,
    decoder: TargetDecoder,
    axes: AxesConfig,
    priming: TargetPair,
    warmup: Duration,
    receive_timeout: Option<Duration>,
    state: CoordinatorState,
    stats: CoordinatorStats,
    idle_polls: u32,
}

impl<L: ByteLink> TargetCoordinator<L> {
    pub fn new(writer: TargetWriter, link: L, config: &PlotterConfig) -> Self {
        Self {
            writer,
            link,
            decoder: TargetDecoder::new(),
            axes: config.axes.clone(),
            priming: TargetPair::new(config.priming[0], config.priming[1]),
            warmup: config.timing.warmup(),
            receive_timeout: config.link.receive_timeout(),
            state: CoordinatorState::AwaitIdle,
            stats: CoordinatorStats::default(),
            idle_polls: 0,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    pub fn table(&self) -> &MotionTable {
        self.writer.table()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Install the priming pose, then wait out the warm-up period.
    ///
    /// Returns early if `running` is cleared during the wait.
    pub fn prime(&mut self, running: &AtomicBool) -> Result<(), CoordinatorError> {
        let ticks = pair_to_ticks(&self.axes, &self.priming)?;
        self.writer.install(ticks);
        info!(
            "Priming target ({}, {}) installed as {:?} steps, warming up for {} ms",
            self.priming.x,
            self.priming.y,
            ticks,
            self.warmup.as_millis()
        );

        let deadline = Instant::now() + self.warmup;
        while running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(WARMUP_SLICE.min(deadline - now));
        }
        Ok(())
    }

    /// Advance the state machine by one transition.
    ///
    /// `AwaitIdle` performs a single check per call. Returns `Some` when the
    /// loop must end.
    pub fn step(&mut self, running: &AtomicBool) -> Result<Option<CoordinatorExit>, CoordinatorError> {
        match self.state {
            CoordinatorState::AwaitIdle => {
                if self.writer.table().all_at_target() {
                    self.idle_polls = 0;
                    self.state = CoordinatorState::AnnounceReady;
                } else {
                    self.idle_polls = self.idle_polls.wrapping_add(1);
                    if self.idle_polls % IDLE_POLLS_PER_YIELD == 0 {
                        thread::yield_now();
                    } else {
                        spin_loop();
                    }
                }
            }

            CoordinatorState::AnnounceReady => {
                match self.link.send(READY_TOKEN.as_bytes()) {
                    Ok(()) => {}
                    Err(e) if is_disconnect(e.kind()) => {
                        return Ok(Some(CoordinatorExit::LinkClosed));
                    }
                    Err(e) => return Err(e.into()),
                }
                self.stats.announcements += 1;
                debug!(positions = ?self.writer.table().positions(), "readiness announced");
                self.state = CoordinatorState::AwaitTarget;
            }

            CoordinatorState::AwaitTarget => {
                match receive_target(&mut self.link, &mut self.decoder, running, self.receive_timeout) {
                    Ok(RecvOutcome::Received(pair)) => {
                        self.state = CoordinatorState::InstallTarget(pair);
                    }
                    Ok(RecvOutcome::TimedOut) => {
                        self.stats.receive_timeouts += 1;
                        info!("No target received within {:?}, announcing again", self.receive_timeout);
                        self.state = CoordinatorState::AwaitIdle;
                    }
                    Ok(RecvOutcome::Cancelled) => return Ok(Some(CoordinatorExit::Cancelled)),
                    Ok(RecvOutcome::Closed) => return Ok(Some(CoordinatorExit::LinkClosed)),
                    Err(ReceiveError::Protocol(e)) => {
                        self.stats.protocol_errors += 1;
                        warn!("Discarding malformed target message: {e}");
                        self.state = CoordinatorState::AwaitIdle;
                    }
                    Err(ReceiveError::Link(e)) => return Err(e.into()),
                }
            }

            CoordinatorState::InstallTarget(pair) => {
                match pair_to_ticks(&self.axes, &pair) {
                    Ok(ticks) => {
                        self.writer.install(ticks);
                        self.stats.targets_installed += 1;
                        debug!(x = pair.x, y = pair.y, ticks = ?ticks, "target installed");
                    }
                    Err(e) => {
                        self.stats.targets_rejected += 1;
                        warn!("Discarding target: {e}");
                    }
                }
                self.state = CoordinatorState::AwaitIdle;
            }
        }
        Ok(None)
    }

    /// Run until `running` is cleared or the link closes.
    pub fn run(&mut self, running: &AtomicBool) -> Result<CoordinatorExit, CoordinatorError> {
        info!("Target coordinator started");
        loop {
            if !running.load(Ordering::Relaxed) {
                return Ok(CoordinatorExit::Cancelled);
            }
            if let Some(exit) = self.step(running)? {
                info!(
                    "Target coordinator stopped ({:?}): {} installed, {} rejected, {} malformed",
                    exit,
                    self.stats.targets_installed,
                    self.stats.targets_rejected,
                    self.stats.protocol_errors
                );
                return Ok(exit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::NullOutputs;
    use crate::link::MemoryLink;
    use crate::pulse::PulseGenerator;
    use plotter_common::config::TimingConfig;
    use std::sync::Arc;

    fn config(ticks_per_unit: f64) -> PlotterConfig {
        let mut config = PlotterConfig::default();
        config.timing.warmup_ms = 0;
        config.axes.x.ticks_per_unit = ticks_per_unit;
        config.axes.y.ticks_per_unit = ticks_per_unit;
        config
    }

    fn setup(
        config: &PlotterConfig,
        inbound: &[u8],
    ) -> (TargetCoordinator<MemoryLink>, PulseGenerator<NullOutputs>) {
        let (table, writer) = MotionTable::create(&config.axes);
        let pulse = PulseGenerator::new(Arc::clone(&table), NullOutputs, &TimingConfig::default());
        let coordinator = TargetCoordinator::new(writer, MemoryLink::new(inbound), config);
        (coordinator, pulse)
    }

    /// Step until the coordinator reaches `AwaitTarget` with an empty inbox.
    fn step_until(
        coordinator: &mut TargetCoordinator<MemoryLink>,
        running: &AtomicBool,
        done: impl Fn(&TargetCoordinator<MemoryLink>) -> bool,
    ) {
        for _ in 0..100 {
            if done(coordinator) {
                return;
            }
            assert_eq!(coordinator.step(running).unwrap(), None);
        }
        panic!("state not reached, stuck in {:?}", coordinator.state());
    }

    #[test]
    fn units_to_ticks_rounds_to_nearest_step() {
        let axis = AxisConfig::default();
        assert_eq!(units_to_ticks(Axis::X, &axis, 2.5).unwrap(), 4000);
        assert_eq!(units_to_ticks(Axis::X, &axis, -0.25).unwrap(), -400);
        assert_eq!(units_to_ticks(Axis::X, &axis, 0.0003).unwrap(), 0);
        assert_eq!(units_to_ticks(Axis::X, &axis, 0.0004).unwrap(), 1);
    }

    #[test]
    fn units_to_ticks_rejects_unusable_values() {
        let mut axis = AxisConfig::default();
        assert!(matches!(
            units_to_ticks(Axis::Y, &axis, f64::NAN),
            Err(TargetError::NotFinite { axis: Axis::Y, .. })
        ));
        assert!(matches!(
            units_to_ticks(Axis::Y, &axis, 1.0e300),
            Err(TargetError::OutOfRange { .. })
        ));

        axis.travel_min = Some(-1.0);
        axis.travel_max = Some(10.0);
        assert!(matches!(
            units_to_ticks(Axis::X, &axis, 10.5),
            Err(TargetError::OutsideTravel { .. })
        ));
        assert!(units_to_ticks(Axis::X, &axis, 10.0).is_ok());
        assert!(units_to_ticks(Axis::X, &axis, -1.0).is_ok());
    }

    #[test]
    fn prime_installs_priming_pose() {
        let mut cfg = config(1600.0);
        cfg.priming = [1.0, -0.5];
        let (mut coordinator, _pulse) = setup(&cfg, b"");
        coordinator.prime(&AtomicBool::new(true)).unwrap();
        assert_eq!(coordinator.table().target_snapshot(), [1600, -800]);
        assert_eq!(coordinator.table().installs(), 1);
    }

    #[test]
    fn prime_rejects_priming_outside_travel() {
        let mut cfg = config(1600.0);
        cfg.axes.x.travel_min = Some(0.0);
        cfg.priming = [-1.0, 0.0];
        let (mut coordinator, _pulse) = setup(&cfg, b"");
        let err = coordinator.prime(&AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, CoordinatorError::Priming(TargetError::OutsideTravel { .. })));
    }

    #[test]
    fn readiness_waits_for_motion_to_finish() {
        let cfg = config(1.0);
        let (mut coordinator, mut pulse) = setup(&cfg, b"(2,3)");
        let running = AtomicBool::new(true);
        coordinator.writer.install([2, 0]);

        for _ in 0..10 {
            coordinator.step(&running).unwrap();
            assert_eq!(coordinator.state(), CoordinatorState::AwaitIdle);
        }
        assert!(coordinator.link().sent().is_empty());

        pulse.cycle();
        pulse.cycle();
        coordinator.step(&running).unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::AnnounceReady);
        coordinator.step(&running).unwrap();
        assert_eq!(coordinator.link().sent_text(), READY_TOKEN);
        assert_eq!(coordinator.state(), CoordinatorState::AwaitTarget);
    }

    #[test]
    fn received_target_is_installed_after_ready() {
        let cfg = config(1600.0);
        let (mut coordinator, _pulse) = setup(&cfg, b"(2.5,-1)");
        let running = AtomicBool::new(true);

        step_until(&mut coordinator, &running, |c| {
            matches!(c.state(), CoordinatorState::InstallTarget(_))
        });
        assert_eq!(
            coordinator.state(),
            CoordinatorState::InstallTarget(TargetPair::new(2.5, -1.0))
        );
        coordinator.step(&running).unwrap();

        let x = coordinator.table().axis(Axis::X);
        assert_eq!(x.target_position(), 4000);
        assert_eq!(x.last_target_position(), 0);
        assert_eq!(coordinator.table().axis(Axis::Y).target_position(), -1600);
        assert_eq!(coordinator.stats().targets_installed, 1);
        assert_eq!(coordinator.state(), CoordinatorState::AwaitIdle);
    }

    #[test]
    fn malformed_message_reannounces_without_state_change() {
        let cfg = config(1.0);
        let (mut coordinator, _pulse) = setup(&cfg, b"(abc,2)");
        let running = AtomicBool::new(true);

        step_until(&mut coordinator, &running, |c| c.stats().protocol_errors == 1);
        assert_eq!(coordinator.state(), CoordinatorState::AwaitIdle);
        assert_eq!(coordinator.table().target_snapshot(), [0, 0]);
        assert_eq!(coordinator.table().installs(), 0);

        step_until(&mut coordinator, &running, |c| c.stats().announcements == 2);
        assert_eq!(coordinator.link().sent_text(), READY_TOKEN.repeat(2));
    }

    #[test]
    fn rejected_target_leaves_table_untouched() {
        let mut cfg = config(1.0);
        cfg.axes.y.travel_max = Some(5.0);
        let (mut coordinator, _pulse) = setup(&cfg, b"(1,6)");
        let running = AtomicBool::new(true);

        step_until(&mut coordinator, &running, |c| c.stats().targets_rejected == 1);
        assert_eq!(coordinator.table().installs(), 0);
        assert_eq!(coordinator.table().target_snapshot(), [0, 0]);
    }

    #[test]
    fn run_ends_when_link_closes() {
        let cfg = config(1.0);
        let (table, writer) = MotionTable::create(&cfg.axes);
        let mut coordinator = TargetCoordinator::new(writer, MemoryLink::closing(b"(0,0)"), &cfg);
        let running = AtomicBool::new(true);

        let exit = coordinator.run(&running).unwrap();
        assert_eq!(exit, CoordinatorExit::LinkClosed);
        assert_eq!(coordinator.stats().targets_installed, 1);
        assert_eq!(coordinator.stats().announcements, 2);
        assert_eq!(table.installs(), 1);
    }

    #[test]
    fn receive_timeout_reannounces() {
        let mut cfg = config(1.0);
        cfg.link.receive_timeout_ms = 1;
        let (mut coordinator, _pulse) = setup(&cfg, b"");
        let running = AtomicBool::new(true);

        step_until(&mut coordinator, &running, |c| c.stats().receive_timeouts == 1);
        assert_eq!(coordinator.state(), CoordinatorState::AwaitIdle);
        step_until(&mut coordinator, &running, |c| c.stats().announcements == 2);
    }

    /// Link whose writes fail with a fixed error kind.
    struct FailingWrites(io::ErrorKind);

    impl ByteLink for FailingWrites {
        fn poll_byte(&mut self) -> io::Result<Option<u8>> {
            Ok(None)
        }

        fn write_all(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(self.0, "write failed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn peer_gone_while_announcing_ends_as_closed() {
        let cfg = config(1.0);
        let running = AtomicBool::new(true);
        for kind in [io::ErrorKind::BrokenPipe, io::ErrorKind::ConnectionReset] {
            let (_table, writer) = MotionTable::create(&cfg.axes);
            let mut coordinator = TargetCoordinator::new(writer, FailingWrites(kind), &cfg);
            assert_eq!(coordinator.run(&running).unwrap(), CoordinatorExit::LinkClosed);
            assert_eq!(coordinator.stats().announcements, 0);
        }
    }

    #[test]
    fn other_write_errors_are_fatal() {
        let cfg = config(1.0);
        let (_table, writer) = MotionTable::create(&cfg.axes);
        let mut coordinator =
            TargetCoordinator::new(writer, FailingWrites(io::ErrorKind::PermissionDenied), &cfg);
        let err = coordinator.run(&AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, CoordinatorError::Link(_)));
    }

    #[test]
    fn cleared_flag_cancels_wait() {
        let cfg = config(1.0);
        let (mut coordinator, _pulse) = setup(&cfg, b"");
        let running = AtomicBool::new(false);
        assert_eq!(coordinator.run(&running).unwrap(), CoordinatorExit::Cancelled);
    }
}
