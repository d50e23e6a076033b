//! Property tests: pulse train convergence.
//!
//! For any pair of targets, each axis moves exactly one step toward its
//! target per cycle, never overshoots, and sits still once it arrives.

use std::sync::Arc;

use plotter_common::axis::Axis;
use plotter_common::config::{AxesConfig, TimingConfig};
use plotter_control_unit::drivers::NullOutputs;
use plotter_control_unit::pulse::PulseGenerator;
use plotter_control_unit::state::axis::MotionTable;
use proptest::prelude::*;

proptest! {
    #[test]
    fn each_cycle_closes_the_gap_by_one(
        first in prop::array::uniform2(-300i64..300),
        second in prop::array::uniform2(-300i64..300),
    ) {
        let (table, mut writer) = MotionTable::create(&AxesConfig::default());
        let mut pulse = PulseGenerator::new(Arc::clone(&table), NullOutputs, &TimingConfig::default());

        for targets in [first, second] {
            writer.install(targets);
            let start = table.positions();
            let needed = Axis::ALL
                .iter()
                .map(|a| (targets[a.index()] - start[a.index()]).abs())
                .max()
                .unwrap_or(0);

            for _ in 0..needed {
                let before = table.positions();
                pulse.cycle();
                let after = table.positions();
                for axis in Axis::ALL {
                    let i = axis.index();
                    let gap_before = targets[i] - before[i];
                    let gap_after = targets[i] - after[i];
                    if gap_before == 0 {
                        prop_assert_eq!(gap_after, 0);
                    } else {
                        prop_assert_eq!(gap_after.abs(), gap_before.abs() - 1);
                        prop_assert!(gap_after == 0 || gap_after.signum() == gap_before.signum());
                    }
                }
            }

            prop_assert!(table.all_at_target());
            pulse.cycle();
            prop_assert_eq!(table.positions(), targets);
        }
    }
}
