//! Per-axis motion records and the target handoff.
//!
//! Each [`AxisState`] is created once at startup with
//! `current_position = target_position = 0` and mutated in place for the
//! whole run. Access discipline:
//!
//! | Field | Writer | Readers |
//! |-------|--------|---------|
//! | `current_position` | pulse loop | coordinator, diagnostics |
//! | `step_direction` | pulse loop | diagnostics |
//! | `target_position`, `last_target_position` | [`TargetWriter`] | pulse loop, coordinator |
//!
//! ## Target handoff
//!
//! Targets for both axes are published under `target_seq` with the odd/even
//! protocol:
//! - Odd = install in progress (reader must retry)
//! - Even = committed (reader can use the values it loaded)
//!
//! A reader therefore never observes one axis's new target next to the
//! other axis's old one.

use std::hint::spin_loop;
use std::sync::Arc;
use std::sync::atomic::{AtomicI8, AtomicI64, AtomicU64, Ordering, fence};

use plotter_common::axis::{Axis, StepDirection};
use plotter_common::config::{AxesConfig, AxisConfig};
use plotter_common::consts::AXIS_COUNT;

/// Motion record of one axis.
#[derive(Debug)]
pub struct AxisState {
    axis: Axis,
    current_position: AtomicI64,
    target_position: AtomicI64,
    last_target_position: AtomicI64,
    step_direction: AtomicI8,
    config: AxisConfig,
}

impl AxisState {
    fn new(axis: Axis, config: AxisConfig) -> Self {
        Self {
            axis,
            current_position: AtomicI64::new(0),
            target_position: AtomicI64::new(0),
            last_target_position: AtomicI64::new(0),
            step_direction: AtomicI8::new(StepDirection::Idle as i8),
            config,
        }
    }

    #[inline]
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Position in elementary steps.
    #[inline]
    pub fn current_position(&self) -> i64 {
        self.current_position.load(Ordering::Acquire)
    }

    /// Committed target in elementary steps.
    ///
    /// Prefer [`MotionTable::target_snapshot`] when both axes are needed.
    #[inline]
    pub fn target_position(&self) -> i64 {
        self.target_position.load(Ordering::Acquire)
    }

    /// Target that was replaced by the most recent install.
    #[inline]
    pub fn last_target_position(&self) -> i64 {
        self.last_target_position.load(Ordering::Acquire)
    }

    /// Direction chosen by the last setup phase.
    #[inline]
    pub fn step_direction(&self) -> StepDirection {
        StepDirection::from_i8(self.step_direction.load(Ordering::Acquire))
    }

    #[inline]
    pub fn polarity_inverted(&self) -> bool {
        self.config.polarity_inverted
    }

    #[inline]
    pub fn ticks_per_unit(&self) -> f64 {
        self.config.ticks_per_unit
    }

    /// Static configuration this record was built from.
    pub fn config(&self) -> &AxisConfig {
        &self.config
    }

    /// Pulse loop only.
    #[inline]
    pub(crate) fn set_step_direction(&self, direction: StepDirection) {
        self.step_direction.store(direction as i8, Ordering::Release);
    }

    /// Pulse loop only: register one completed pulse.
    #[inline]
    pub(crate) fn advance(&self, direction: StepDirection) {
        self.current_position
            .fetch_add(direction.unit(), Ordering::AcqRel);
    }
}

/// Diagnostic copy of one axis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSnapshot {
    pub axis: Axis,
    pub current_position: i64,
    pub target_position: i64,
    pub last_target_position: i64,
    pub step_direction: StepDirection,
}

impl AxisSnapshot {
    /// Remaining distance in steps.
    #[inline]
    pub fn remaining(&self) -> i64 {
        self.target_position - self.current_position
    }
}

/// Table of all axis records plus the target write sequence.
#[derive(Debug)]
pub struct MotionTable {
    axes: [AxisState; AXIS_COUNT],
    target_seq: AtomicU64,
}

impl MotionTable {
    /// Build the table and the single target writer for it.
    ///
    /// The writer is the only way to change targets; it is not `Clone`, so
    /// the ownership of target installation is explicit.
    pub fn create(config: &AxesConfig) -> (Arc<Self>, TargetWriter) {
        let table = Arc::new(Self {
            axes: Axis::ALL.map(|axis| AxisState::new(axis, config.get(axis).clone())),
            target_seq: AtomicU64::new(0),
        });
        let writer = TargetWriter {
            table: Arc::clone(&table),
        };
        (table, writer)
    }

    #[inline]
    pub fn axis(&self, axis: Axis) -> &AxisState {
        &self.axes[axis.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisState> {
        self.axes.iter()
    }

    /// Consistent pair of committed targets.
    pub fn target_snapshot(&self) -> [i64; AXIS_COUNT] {
        loop {
            let before = self.target_seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                spin_loop();
                continue;
            }
            let targets = self
                .axes
                .each_ref()
                .map(|state| state.target_position.load(Ordering::Relaxed));
            fence(Ordering::Acquire);
            if self.target_seq.load(Ordering::Relaxed) == before {
                return targets;
            }
            spin_loop();
        }
    }

    /// Number of committed target installs.
    pub fn installs(&self) -> u64 {
        self.target_seq.load(Ordering::Acquire) / 2
    }

    pub fn positions(&self) -> [i64; AXIS_COUNT] {
        self.axes.each_ref().map(AxisState::current_position)
    }

    /// True when every axis sits on its committed target.
    pub fn all_at_target(&self) -> bool {
        let targets = self.target_snapshot();
        self.axes
            .iter()
            .zip(targets)
            .all(|(state, target)| state.current_position() == target)
    }

    pub fn snapshot(&self) -> [AxisSnapshot; AXIS_COUNT] {
        let targets = self.target_snapshot();
        Axis::ALL.map(|axis| {
            let state = self.axis(axis);
            AxisSnapshot {
                axis,
                current_position: state.current_position(),
                target_position: targets[axis.index()],
                last_target_position: state.last_target_position(),
                step_direction: state.step_direction(),
            }
        })
    }
}

/// Exclusive handle for installing targets into a [`MotionTable`].
#[derive(Debug)]
pub struct TargetWriter {
    table: Arc<MotionTable>,
}

impl TargetWriter {
    pub fn table(&self) -> &Arc<MotionTable> {
        &self.table
    }

    /// Publish new targets for all axes as one unit.
    ///
    /// Every axis's previous target is kept in `last_target_position`.
    pub fn install(&mut self, targets: [i64; AXIS_COUNT]) {
        let seq = self.table.target_seq.load(Ordering::Relaxed);
        self.table
            .target_seq
            .store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for (state, target) in self.table.axes.iter().zip(targets) {
            let previous = state.target_position.load(Ordering::Relaxed);
            state
                .last_target_position
                .store(previous, Ordering::Relaxed);
            state.target_position.store(target, Ordering::Relaxed);
        }

        self.table
            .target_seq
            .store(seq.wrapping_add(2), Ordering::Release);
    }
}
