//! Real-time plumbing for the pulse loop: RT setup, pauses, statistics.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to an isolated CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`: RT priority.
//!
//! All four steps are no-ops unless the `rt` feature is enabled.
//!
//! ## Pauses
//! With `rt`, pauses use `clock_nanosleep(CLOCK_MONOTONIC)`. Without it,
//! pauses up to [`SPIN_THRESHOLD`] busy-wait on `Instant` (thread sleep
//! granularity is far coarser than a 5 µs pulse width) and longer ones use
//! `std::thread::sleep`.

use std::time::Duration;

use plotter_common::consts::AXIS_COUNT;
use thiserror::Error;

/// Pauses at or below this length busy-wait in simulation mode.
pub const SPIN_THRESHOLD: Duration = Duration::from_micros(100);

/// Slack on top of the nominal cycle period before a cycle counts as overrun.
pub const OVERRUN_TOLERANCE: Duration = Duration::from_micros(200);

/// Errors during RT setup.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),
}

// ─── Pulse statistics ───────────────────────────────────────────────

/// O(1) per-cycle statistics of the pulse loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseStats {
    /// Total pulse cycles executed.
    pub cycle_count: u64,
    /// Pulses emitted per axis.
    pub pulses: [u64; AXIS_COUNT],
    /// Last measured cycle duration [ns].
    pub last_cycle_ns: u64,
    /// Longest measured cycle duration [ns].
    pub max_cycle_ns: u64,
    /// Running sum for average computation.
    pub sum_cycle_ns: u128,
    /// Number of timed cycles.
    pub timed_cycles: u64,
    /// Cycles longer than nominal period + tolerance.
    pub overruns: u64,
}

impl PulseStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            pulses: [0; AXIS_COUNT],
            last_cycle_ns: 0,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            timed_cycles: 0,
            overruns: 0,
        }
    }

    /// Record a measured cycle duration against its budget.
    #[inline]
    pub fn record_timing(&mut self, duration_ns: u64, budget_ns: u64) {
        self.timed_cycles += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += u128::from(duration_ns);
        if duration_ns > budget_ns {
            self.overruns += 1;
        }
    }

    /// Average measured cycle time [ns] (0 if nothing was timed).
    #[inline]
    pub fn avg_cycle_ns(&self) -> u64 {
        if self.timed_cycles == 0 {
            0
        } else {
            (self.sum_cycle_ns / u128::from(self.timed_cycles)) as u64
        }
    }
}

impl Default for PulseStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Pauses ─────────────────────────────────────────────────────────

/// Pause the calling thread for `duration`.
///
/// Sleeps to an absolute `CLOCK_MONOTONIC` deadline and resumes after
/// `EINTR`, so a signal never shortens the pause.
#[cfg(feature = "rt")]
pub fn pause(duration: Duration) {
    use nix::errno::Errno;
    use nix::sys::time::TimeSpec;
    use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

    let Ok(now) = clock_gettime(ClockId::CLOCK_MONOTONIC) else {
        std::thread::sleep(duration);
        return;
    };
    let deadline = now + TimeSpec::from_duration(duration);
    while let Err(Errno::EINTR) = clock_nanosleep(
        ClockId::CLOCK_MONOTONIC,
        ClockNanosleepFlags::TIMER_ABSTIME,
        &deadline,
    ) {}
}

/// Pause the calling thread for `duration`.
#[cfg(not(feature = "rt"))]
pub fn pause(duration: Duration) {
    if duration <= SPIN_THRESHOLD {
        let deadline = std::time::Instant::now() + duration;
        while std::time::Instant::now() < deadline {
            std::hint::spin_loop();
        }
    } else {
        std::thread::sleep(duration);
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the pulse loop never faults a stack page in.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param; pid 0 targets the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Perform the RT setup sequence for the calling thread.
///
/// Must be called from the pulse thread before it enters its loop.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}
