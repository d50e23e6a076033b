//! Axis identifiers, step direction and axis masks.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::consts::AXIS_COUNT;
use crate::hal::driver::Level;

/// One linear degree of freedom of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Axis {
    /// Horizontal axis.
    X = 0,
    /// Vertical axis.
    Y = 1,
}

impl Axis {
    /// All axes in table order.
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::X, Axis::Y];

    /// Index into per-axis arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
        }
    }

    /// Single-axis mask.
    #[inline]
    pub const fn mask(self) -> AxisMask {
        match self {
            Self::X => AxisMask::X,
            Self::Y => AxisMask::Y,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of the step issued in the current pulse cycle.
///
/// The discriminant is the signed unit added to `current_position` when the
/// pulse completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i8)]
pub enum StepDirection {
    /// Moving toward smaller positions.
    Reverse = -1,
    /// No pulse this cycle.
    #[default]
    Idle = 0,
    /// Moving toward larger positions.
    Forward = 1,
}

impl StepDirection {
    /// Direction that walks `current` toward `target`.
    #[inline]
    pub fn between(current: i64, target: i64) -> Self {
        match current.cmp(&target) {
            std::cmp::Ordering::Less => Self::Forward,
            std::cmp::Ordering::Greater => Self::Reverse,
            std::cmp::Ordering::Equal => Self::Idle,
        }
    }

    /// Convert from the raw stored value. Unknown values map to `Idle`.
    #[inline]
    pub const fn from_i8(value: i8) -> Self {
        match value {
            1 => Self::Forward,
            -1 => Self::Reverse,
            _ => Self::Idle,
        }
    }

    /// Signed position increment for one completed pulse.
    #[inline]
    pub const fn unit(self) -> i64 {
        self as i8 as i64
    }

    #[inline]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Electrical level of the direction output, or `None` when idle.
    ///
    /// Forward drives the line high unless the axis polarity is inverted.
    #[inline]
    pub const fn direction_level(self, polarity_inverted: bool) -> Option<Level> {
        match self {
            Self::Forward => Some(Level::from_bool(!polarity_inverted)),
            Self::Reverse => Some(Level::from_bool(polarity_inverted)),
            Self::Idle => None,
        }
    }
}

bitflags! {
    /// Set of axes, e.g. the axes that emitted a pulse in one cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisMask: u8 {
        const X = 0x01;
        const Y = 0x02;
    }
}

impl AxisMask {
    /// Returns true if `axis` is in the set.
    #[inline]
    pub const fn has(self, axis: Axis) -> bool {
        self.contains(axis.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_indices_match_table_order() {
        for (i, axis) in Axis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), i);
        }
        assert_eq!(Axis::X.to_string(), "X");
    }

    #[test]
    fn direction_walks_toward_target() {
        assert_eq!(StepDirection::Forward.unit(), 1);
        assert_eq!(StepDirection::Reverse.unit(), -1);
        assert_eq!(StepDirection::Idle.unit(), 0);
        assert_eq!(StepDirection::between(i64::MIN, i64::MAX), StepDirection::Forward);
        assert_eq!(StepDirection::between(5, -5), StepDirection::Reverse);
        assert_eq!(StepDirection::between(3, 3), StepDirection::Idle);
    }

    #[test]
    fn direction_raw_value() {
        for dir in [StepDirection::Reverse, StepDirection::Idle, StepDirection::Forward] {
            assert_eq!(StepDirection::from_i8(dir as i8), dir);
        }
        assert_eq!(StepDirection::from_i8(7), StepDirection::Idle);
    }

    #[test]
    fn inverted_polarity_complements_level() {
        for dir in [StepDirection::Forward, StepDirection::Reverse] {
            let normal = dir.direction_level(false).unwrap();
            let inverted = dir.direction_level(true).unwrap();
            assert_eq!(inverted, normal.inverted());
        }
        assert_eq!(StepDirection::Forward.direction_level(false), Some(Level::High));
        assert_eq!(StepDirection::Idle.direction_level(true), None);
    }

    #[test]
    fn axis_mask_membership() {
        let mask = AxisMask::X;
        assert!(mask.has(Axis::X));
        assert!(!mask.has(Axis::Y));
        assert_eq!(Axis::X.mask() | Axis::Y.mask(), AxisMask::all());
    }
}
