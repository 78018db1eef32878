//! TEAM_430: Restoring processes after a power cycle.
//!
//! [`SuspendManager::resume`] rebuilds live processes from dirty records and
//! reconciles every parked call against the RTC. [`ResumeTask`] runs it once
//! per boot and hands the result to the scheduler: forced wakes first, then
//! one timer per pending deadline, earliest first.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::backup::{BackupMemory, DirtySlot, RejectedSlot};
use crate::coordinator::{CoordinatorState, SuspendManager};
use crate::process::Process;
use crate::registry::ResumeEntry;
use crate::traits::{Clock, ThreadScheduler};
use crate::types::{Pid, ProcessState, ThreadRef, Ticks, WakeMode};

/// What a resume restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// Restored pids, in slot order.
    pub restored: Vec<Pid>,
    /// Threads whose deadline elapsed during the outage or that were forced.
    pub wake_now: Vec<ThreadRef>,
    /// Threads still waiting, earliest deadline first.
    pub armed: Vec<ResumeEntry>,
    /// Slots that failed validation; they have been retired.
    pub rejected: Vec<RejectedSlot>,
    /// Records whose pid was already live; they have been retired.
    pub discarded: Vec<Pid>,
    /// Longest time any restored record spent in backup memory.
    pub longest_outage: Ticks,
}

/// Result of [`SuspendManager::resume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No dirty slot was found.
    NothingToRestore,
    Restored(ResumeReport),
}

impl ResumeOutcome {
    /// Numeric form: `-1` when nothing was found, else the restored count.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            ResumeOutcome::NothingToRestore => -1,
            ResumeOutcome::Restored(report) => i32::try_from(report.restored.len()).unwrap_or(i32::MAX),
        }
    }

    #[must_use]
    pub fn report(&self) -> Option<&ResumeReport> {
        match self {
            ResumeOutcome::NothingToRestore => None,
            ResumeOutcome::Restored(report) => Some(report),
        }
    }
}

impl<M: BackupMemory, C: Clock> SuspendManager<M, C> {
    /// [RS1] Restore every dirty record in the backup area.
    ///
    /// Each restored slot is marked consumed, so a second call finds nothing.
    /// A thread wakes now if its deadline elapsed or it was forced; the others
    /// are indexed again under their original absolute deadline. A process
    /// comes back Running if any of its threads wakes now, else Suspended.
    pub fn resume(&self) -> ResumeOutcome {
        let mut st = self.state.lock();
        let now = self.clock.now();
        let scanned: Vec<Result<DirtySlot, RejectedSlot>> = self.backup.lock().scan_dirty().collect();
        if scanned.is_empty() {
            log::debug!("[RESUME] No dirty records");
            return ResumeOutcome::NothingToRestore;
        }

        let mut report = ResumeReport::default();
        for item in scanned {
            match item {
                Ok(dirty) => self.restore_one(&mut st, dirty, now, &mut report),
                Err(rejected) => self.reject(rejected, &mut report),
            }
        }
        self.backup.lock().flush();
        report.armed.sort_unstable();

        log::info!(
            "[RESUME] Restored {} processes ({} waking now, {} timers, {} rejected), outage {}",
            report.restored.len(),
            report.wake_now.len(),
            report.armed.len(),
            report.rejected.len(),
            report.longest_outage
        );
        self.publish(&mut st);
        ResumeOutcome::Restored(report)
    }

    fn reject(&self, rejected: RejectedSlot, report: &mut ResumeReport) {
        log::error!("[RESUME] Slot {} rejected: {}", rejected.slot, rejected.error);
        self.retire_slot(rejected.slot);
        report.rejected.push(rejected);
    }

    fn restore_one(&self, st: &mut CoordinatorState, dirty: DirtySlot, now: Ticks, report: &mut ResumeReport) {
        let DirtySlot { slot, record } = dirty;
        let pid = record.pid;
        if st.processes.contains_key(&pid) {
            log::warn!("[RESUME] pid {} already live, discarding slot {}", pid, slot);
            self.retire_slot(slot);
            report.discarded.push(pid);
            return;
        }

        let payload = self.backup.lock().read_payload(slot, &record);
        let (image, program) = match payload {
            Ok(regions) => regions,
            Err(error) => {
                self.reject(RejectedSlot { slot, error }, report);
                return;
            }
        };

        let mut points = record.points;
        let mut wakes = false;
        for (thread, point) in points.iter_mut() {
            match point.reconcile(now) {
                WakeMode::Now => {
                    wakes = true;
                    report.wake_now.push(ThreadRef::new(pid, thread));
                }
                WakeMode::AtDeadline => {
                    let entry = ResumeEntry::new(point.deadline, pid, thread);
                    st.resume_index.insert(entry);
                    report.armed.push(entry);
                }
            }
        }
        let state = if wakes {
            ProcessState::Running
        } else {
            ProcessState::Suspended
        };

        if let Err(e) = self.backup.lock().mark_consumed(slot, &record, state) {
            log::warn!("[RESUME] Could not mark slot {} consumed: {}", slot, e);
        }

        let outage = now.since(record.serialized_at);
        report.longest_outage = report.longest_outage.max(outage);
        st.live += 1;
        st.live_threads += usize::from(record.thread_count);
        if state == ProcessState::Suspended {
            st.suspended.insert(pid);
        }
        st.processes.insert(
            pid,
            Arc::new(Process::restore(&record, points, image, program, state)),
        );
        report.restored.push(pid);
        log::debug!(
            "[RESUME] pid {} from slot {} as {:?} after {}",
            pid,
            slot,
            state,
            outage
        );
    }
}

/// Runs [`SuspendManager::resume`] once after power-on.
pub struct ResumeTask<'a, M: BackupMemory, C: Clock> {
    manager: &'a SuspendManager<M, C>,
}

impl<'a, M: BackupMemory, C: Clock> ResumeTask<'a, M, C> {
    pub fn new(manager: &'a SuspendManager<M, C>) -> Self {
        Self { manager }
    }

    /// [RT1] Restore, then wake forced threads ahead of every timer.
    ///
    /// Consumes the task: a boot resumes exactly once.
    pub fn run<S: ThreadScheduler + ?Sized>(self, scheduler: &mut S) -> ResumeOutcome {
        let outcome = self.manager.resume();
        if let ResumeOutcome::Restored(report) = &outcome {
            for thread in &report.wake_now {
                scheduler.wake_now(*thread);
            }
            for entry in &report.armed {
                scheduler.arm_timer(*entry);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupArea, RamBackup};
    use crate::config::{AllocatorExtents, BackupLayout};
    use crate::process::ProcessSpec;
    use crate::registry::BlockingCall;
    use crate::types::{SyscallId, ThreadIndex};
    use core::sync::atomic::{AtomicI64, Ordering};

    struct TestClock(AtomicI64);

    impl Clock for TestClock {
        fn now(&self) -> Ticks {
            Ticks(self.0.load(Ordering::Relaxed))
        }
    }

    const EXTENTS: AllocatorExtents = AllocatorExtents::new(0x20, 0x20);
    const LAYOUT: BackupLayout = BackupLayout::new(32, 16);

    fn fresh(mem: RamBackup, now: i64) -> SuspendManager<RamBackup, TestClock> {
        let area = BackupArea::new(mem, EXTENTS, LAYOUT).unwrap();
        SuspendManager::new(area, TestClock(AtomicI64::new(now)))
    }

    /// One process parked until `deadline`, hibernated at t=100.
    fn hibernated(deadline: i64) -> RamBackup {
        let m = fresh(
            RamBackup::new(0, EXTENTS.reserved() + 2 * LAYOUT.slot_size()),
            100,
        );
        m.process_port()
            .register(ProcessSpec::new(Pid(4)).image(alloc::vec![0xAB; 20]))
            .unwrap();
        m.enter_interruption_point(
            Pid(4),
            ThreadIndex(0),
            &BlockingCall::new(SyscallId::new(6).unwrap(), Ticks(deadline)),
        )
        .unwrap();
        m.request_suspend(Pid(4)).unwrap();
        let snap = m.barrier_snapshot().unwrap();
        m.begin_pass(&snap).unwrap();
        m.serialize_process(Pid(4)).unwrap();
        drop(m.seal_pass().unwrap());
        m.into_backup().into_memory()
    }

    /// Tests: [RS1] future deadline stays armed, process Suspended
    #[test]
    fn test_resume_rearms_future_deadline() {
        let m = fresh(hibernated(1_000), 400);
        let outcome = m.resume();
        assert_eq!(outcome.code(), 1);
        let report = outcome.report().unwrap();
        assert!(report.wake_now.is_empty());
        assert_eq!(
            report.armed,
            [ResumeEntry::new(Ticks(1_000), Pid(4), ThreadIndex(0))]
        );
        assert_eq!(report.longest_outage, Ticks(300));

        let p = m.process(Pid(4)).unwrap();
        assert_eq!(p.state(), ProcessState::Suspended);
        assert_eq!(&p.image()[..], &[0xAB; 20]);
        assert!(m.hibernation_barrier_satisfied());
    }

    /// Tests: [RS1] elapsed deadline forces wake
    #[test]
    fn test_resume_wakes_elapsed_deadline() {
        let m = fresh(hibernated(300), 400);
        let report = m.resume().report().cloned().unwrap();
        assert_eq!(report.wake_now, [ThreadRef::new(Pid(4), ThreadIndex(0))]);
        assert!(report.armed.is_empty());
        assert_eq!(m.process(Pid(4)).unwrap().state(), ProcessState::Running);
        assert_eq!(m.next_wakeup(), None);
    }

    /// Tests: [RS1] second resume finds nothing
    #[test]
    fn test_resume_is_idempotent() {
        let m = fresh(hibernated(1_000), 400);
        assert_eq!(m.resume().code(), 1);
        assert_eq!(m.resume(), ResumeOutcome::NothingToRestore);
        assert_eq!(m.resume().code(), -1);
    }

    #[test]
    fn test_resume_rejects_corrupt_slot() {
        let mut mem = hibernated(1_000);
        mem.as_bytes_mut()[EXTENTS.reserved() + 40] ^= 0x04;
        let m = fresh(mem, 400);
        let outcome = m.resume();
        let report = outcome.report().unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(outcome.code(), 0);
        // Reported once, then retired.
        assert_eq!(m.resume(), ResumeOutcome::NothingToRestore);
    }

    #[test]
    fn test_resume_discards_live_pid() {
        let m = fresh(hibernated(1_000), 400);
        m.process_port().register(ProcessSpec::new(Pid(4))).unwrap();
        let report = m.resume().report().cloned().unwrap();
        assert_eq!(report.discarded, [Pid(4)]);
        assert!(report.restored.is_empty());
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<(&'static str, ThreadRef)>,
    }

    impl ThreadScheduler for Recorder {
        fn wake_now(&mut self, thread: ThreadRef) {
            self.events.push(("wake", thread));
        }

        fn arm_timer(&mut self, entry: ResumeEntry) {
            self.events.push(("timer", entry.thread_ref()));
        }
    }

    /// Tests: [RT1] scheduler sees the restored threads
    #[test]
    fn test_resume_task_schedules() {
        let m = fresh(hibernated(1_000), 400);
        let mut sched = Recorder::default();
        let outcome = ResumeTask::new(&m).run(&mut sched);
        assert_eq!(outcome.code(), 1);
        assert_eq!(
            sched.events,
            [("timer", ThreadRef::new(Pid(4), ThreadIndex(0)))]
        );
    }
}
