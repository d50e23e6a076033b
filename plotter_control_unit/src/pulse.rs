//! Fixed-cadence dual-axis step pulse generator.
//!
//! One pulse cycle has two phases:
//!
//! 1. **Setup**: for each axis compare `current_position` with the committed
//!    target, store the step direction, drive the direction line (respecting
//!    polarity) and raise the step line, or hold it low when the axis is at
//!    rest. Pause for the pulse width.
//! 2. **Release**: for each axis lower the step line and, if a pulse was
//!    issued, add its signed unit to `current_position`. Pause for the pulse
//!    spacing.
//!
//! Both axes share the cadence: an axis at rest contributes no pulse while
//! the other keeps moving. Direction is re-evaluated every cycle, so a new
//! target takes effect on the next setup phase. No ramp, velocity limit or
//! interpolation is applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use plotter_common::axis::{Axis, AxisMask, StepDirection};
use plotter_common::config::TimingConfig;
use plotter_common::hal::driver::{HalError, Level, StepperOutputs};
use tracing::{debug, info};

use crate::cycle::{OVERRUN_TOLERANCE, PulseStats, pause};
use crate::state::axis::MotionTable;

/// Cycles between two periodic statistics lines.
pub const STATS_LOG_INTERVAL: u64 = 10_000;

/// Pulse train driver for all axes of a [`MotionTable`].
pub struct PulseGenerator<O: StepperOutputs> {
    table: Arc<MotionTable>,
    outputs: O,
    pulse_width: Duration,
    pulse_spacing: Duration,
    stats: PulseStats,
}

impl<O: StepperOutputs> PulseGenerator<O> {
    pub fn new(table: Arc<MotionTable>, outputs: O, timing: &TimingConfig) -> Self {
        Self {
            table,
            outputs,
            pulse_width: timing.pulse_width(),
            pulse_spacing: timing.pulse_spacing(),
            stats: PulseStats::new(),
        }
    }

    pub fn stats(&self) -> &PulseStats {
        &self.stats
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn table(&self) -> &Arc<MotionTable> {
        &self.table
    }

    /// Assert the enable line of every axis and park step lines low.
    pub fn enable_outputs(&mut self) -> Result<(), HalError> {
        for axis in Axis::ALL {
            self.outputs.enable(axis)?;
            self.outputs.set_step(axis, Level::Low);
        }
        info!("{} outputs enabled for {} axes", self.outputs.name(), Axis::ALL.len());
        Ok(())
    }

    /// Release the enable line of every axis.
    pub fn disable_outputs(&mut self) -> Result<(), HalError> {
        for axis in Axis::ALL {
            self.outputs.set_step(axis, Level::Low);
            self.outputs.disable(axis)?;
        }
        Ok(())
    }

    /// Setup phase: choose directions and raise step lines.
    ///
    /// Returns the axes that asserted a pulse.
    pub fn setup_phase(&mut self) -> AxisMask {
        let targets = self.table.target_snapshot();
        let mut stepping = AxisMask::empty();

        for axis in Axis::ALL {
            let state = self.table.axis(axis);
            let direction = StepDirection::between(state.current_position(), targets[axis.index()]);
            state.set_step_direction(direction);

            match direction.direction_level(state.polarity_inverted()) {
                Some(level) => {
                    self.outputs.set_direction(axis, level);
                    self.outputs.set_step(axis, Level::High);
                    stepping |= axis.mask();
                }
                None => self.outputs.set_step(axis, Level::Low),
            }
        }
        stepping
    }

    /// Release phase: lower step lines and register completed pulses.
    ///
    /// Returns the axes whose position advanced.
    pub fn release_phase(&mut self) -> AxisMask {
        let mut advanced = AxisMask::empty();

        for axis in Axis::ALL {
            let state = self.table.axis(axis);
            self.outputs.set_step(axis, Level::Low);

            let direction = state.step_direction();
            if !direction.is_idle() {
                state.advance(direction);
                self.stats.pulses[axis.index()] += 1;
                advanced |= axis.mask();
            }
        }
        self.stats.cycle_count += 1;
        advanced
    }

    /// One full pulse cycle without pauses.
    pub fn cycle(&mut self) -> AxisMask {
        self.setup_phase();
        self.release_phase()
    }

    /// Paced pulse loop. Runs until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> PulseStats {
        let budget = self.pulse_width + self.pulse_spacing + OVERRUN_TOLERANCE;
        let budget_ns = budget.as_nanos() as u64;
        info!(
            "Pulse loop started (width={}µs, spacing={}µs)",
            self.pulse_width.as_micros(),
            self.pulse_spacing.as_micros()
        );

        while running.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            self.setup_phase();
            pause(self.pulse_width);
            self.release_phase();
            pause(self.pulse_spacing);

            self.stats
                .record_timing(cycle_start.elapsed().as_nanos() as u64, budget_ns);

            if self.stats.cycle_count % STATS_LOG_INTERVAL == 0 {
                debug!(
                    cycles = self.stats.cycle_count,
                    pulses_x = self.stats.pulses[Axis::X.index()],
                    pulses_y = self.stats.pulses[Axis::Y.index()],
                    avg_ns = self.stats.avg_cycle_ns(),
                    max_ns = self.stats.max_cycle_ns,
                    overruns = self.stats.overruns,
                    "pulse loop statistics"
                );
            }
        }

        info!(
            "Pulse loop stopped after {} cycles ({} overruns)",
            self.stats.cycle_count, self.stats.overruns
        );
        self.stats.clone()
    }
}
