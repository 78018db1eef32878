//! TEAM_430: Seams to the rest of the kernel.
//!
//! The RTC, the power controller, the scheduler and the hibernation policy are
//! owned elsewhere; the subsystem only sees them through these traits.

extern crate alloc;

use alloc::vec::Vec;

use crate::error::PowerError;
use crate::registry::ResumeEntry;
use crate::types::{Pid, ThreadRef, Ticks};

/// RTC-backed kernel clock.
///
/// Must keep counting while main memory is off, so that deadlines taken before
/// a power cycle compare correctly with `now()` after it.
pub trait Clock: Send + Sync {
    fn now(&self) -> Ticks;
}

/// What the hibernate task saw when the barrier held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierSnapshot {
    /// Coordinator epoch the snapshot was taken at.
    pub epoch: u64,
    /// Suspended processes, ascending pid.
    pub suspended: Vec<Pid>,
    /// Earliest pending resume deadline.
    pub next_wakeup: Option<ResumeEntry>,
}

/// Decides whether a fully suspended system is worth powering down.
pub trait HibernationPolicy {
    fn should_hibernate(&self, snapshot: &BarrierSnapshot) -> bool;
}

impl<F> HibernationPolicy for F
where
    F: Fn(&BarrierSnapshot) -> bool,
{
    fn should_hibernate(&self, snapshot: &BarrierSnapshot) -> bool {
        self(snapshot)
    }
}

/// Low-power controller.
pub trait PowerControl {
    /// Cut main-memory power and program the RTC alarm for `wake_at`.
    ///
    /// On hardware a successful call does not return. Simulators return `Ok`
    /// once the cut has been modelled.
    fn power_down(&self, wake_at: Option<Ticks>) -> Result<(), PowerError>;
}

/// Scheduler hooks used when threads come back from an outage.
pub trait ThreadScheduler {
    /// Make `thread` runnable ahead of every deadline waiter.
    fn wake_now(&mut self, thread: ThreadRef);

    /// Arm a timer that wakes `entry.thread_ref()` at `entry.resume_time`.
    fn arm_timer(&mut self, entry: ResumeEntry);
}
