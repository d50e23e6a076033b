//! Shared motion state.
//!
//! The only channel between the pulse loop and the target coordinator.

pub mod axis;
