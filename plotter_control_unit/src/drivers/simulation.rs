//! Simulation backend.
//!
//! Keeps the level of every enable/direction/step line in memory and counts
//! the steps a real driver would take: one per rising step edge on an enabled
//! axis, signed by the direction line as seen through the axis polarity.
//! Clones share the same state, so a test can hold one clone while the pulse
//! generator owns another.

use std::sync::Arc;

use parking_lot::Mutex;
use plotter_common::axis::Axis;
use plotter_common::config::AxesConfig;
use plotter_common::consts::AXIS_COUNT;
use plotter_common::hal::driver::{HalError, Level, OutputDiagnostics, StepperOutputs};
use tracing::{debug, trace};

pub const DRIVER_NAME: &str = "simulation";

/// Line levels and step counters of one simulated driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedAxis {
    pub enabled: bool,
    pub step: Level,
    pub direction: Level,
    pub polarity_inverted: bool,
    /// Low-to-high step transitions while enabled.
    pub rising_edges: u64,
    /// Signed steps taken.
    pub net_steps: i64,
}

impl SimulatedAxis {
    /// Level of the direction line that means "forward".
    fn forward_level(&self) -> Level {
        Level::from_bool(!self.polarity_inverted)
    }
}

/// In-memory stepper outputs.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutputs {
    axes: Arc<Mutex<[SimulatedAxis; AXIS_COUNT]>>,
}

impl SimulationOutputs {
    pub fn new(config: &AxesConfig) -> Self {
        let axes = Axis::ALL.map(|axis| SimulatedAxis {
            polarity_inverted: config.get(axis).polarity_inverted,
            ..SimulatedAxis::default()
        });
        Self {
            axes: Arc::new(Mutex::new(axes)),
        }
    }

    /// Copy of one axis's simulated lines.
    pub fn axis(&self, axis: Axis) -> SimulatedAxis {
        self.axes.lock()[axis.index()]
    }

    /// Signed steps taken by every axis.
    pub fn net_steps(&self) -> [i64; AXIS_COUNT] {
        self.axes.lock().map(|a| a.net_steps)
    }
}

impl StepperOutputs for SimulationOutputs {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn enable(&mut self, axis: Axis) -> Result<(), HalError> {
        self.axes.lock()[axis.index()].enabled = true;
        debug!("Simulated {} driver enabled", axis);
        Ok(())
    }

    fn set_direction(&mut self, axis: Axis, level: Level) {
        self.axes.lock()[axis.index()].direction = level;
    }

    fn set_step(&mut self, axis: Axis, level: Level) {
        let mut axes = self.axes.lock();
        let state = &mut axes[axis.index()];
        let rising = !state.step.is_high() && level.is_high();
        state.step = level;

        if rising && state.enabled {
            state.rising_edges += 1;
            state.net_steps += if state.direction == state.forward_level() {
                1
            } else {
                -1
            };
            trace!(axis = %axis, net_steps = state.net_steps, "step edge");
        }
    }

    fn disable(&mut self, axis: Axis) -> Result<(), HalError> {
        self.axes.lock()[axis.index()].enabled = false;
        Ok(())
    }

    fn diagnostics(&self) -> Option<OutputDiagnostics> {
        let axes = self.axes.lock();
        Some(OutputDiagnostics {
            pulses: axes.map(|a| a.rising_edges),
            net_steps: axes.map(|a| a.net_steps),
        })
    }
}

pub fn create_outputs(config: &AxesConfig) -> Box<dyn StepperOutputs> {
    Box::new(SimulationOutputs::new(config))
}
