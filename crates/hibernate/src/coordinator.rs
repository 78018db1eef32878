//! TEAM_430: Suspend coordinator.
//!
//! One explicitly constructed [`SuspendManager`] owns the process table, the
//! suspended set, the resume index and the backup area. Everything that can
//! change whether the hibernation barrier holds goes through it.
//!
//! Lock order is `state -> process -> backup`. Every mutation of a process
//! happens with the coordinator state held, so the barrier predicate never sees
//! a half-applied change.
//!
//! The coordinator keeps an epoch that moves on every externally caused change
//! (suspend, wake, terminate, register, restore); the hibernate task acts on a
//! given epoch at most once. An open pass re-checks the barrier before every
//! record and again before sealing.

extern crate alloc;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec::Vec;

use los_utils::{CondVar, HashMap, HashSet, Mutex, MutexGuard};

use crate::backup::{BackupArea, BackupMemory, SlotIndex};
use crate::error::{PowerError, SerializeError, SuspendError};
use crate::port::ProcessPort;
use crate::process::{Process, ProcessInner};
use crate::registry::{BlockingCall, InterruptionPoint, ResumeEntry, ResumeIndex};
use crate::traits::{BarrierSnapshot, Clock, PowerControl};
use crate::types::{Pid, ProcessState, QueueRef, SampleProgress, ThreadIndex, Ticks, WakeMode};

/// Result of [`SuspendManager::request_suspend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendOutcome {
    Suspended,
    AlreadySuspended,
}

pub(crate) struct PassState {
    /// Processes whose regions did not fit a slot; lost at power-down.
    dropped: BTreeSet<Pid>,
}

pub(crate) struct CoordinatorState {
    pub(crate) processes: BTreeMap<Pid, Arc<Process>>,
    /// Suspended or Serialized processes.
    pub(crate) suspended: HashSet<Pid>,
    /// Slots written in the current pass.
    pub(crate) serialized: HashMap<Pid, SlotIndex>,
    pub(crate) resume_index: ResumeIndex,
    pub(crate) live: usize,
    pub(crate) live_threads: usize,
    pub(crate) epoch: u64,
    pass: Option<PassState>,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            suspended: HashSet::new(),
            serialized: HashMap::new(),
            resume_index: ResumeIndex::new(),
            live: 0,
            live_threads: 0,
            epoch: 0,
            pass: None,
        }
    }

    /// [CO3] Suspended set equals the live set, and the live set is not empty.
    pub(crate) fn barrier_satisfied(&self) -> bool {
        self.live > 0 && self.suspended.len() == self.live
    }

    pub(crate) fn process(&self, pid: Pid) -> Result<Arc<Process>, SuspendError> {
        self.processes
            .get(&pid)
            .cloned()
            .ok_or(SuspendError::UnknownProcess)
    }

    fn snapshot(&self) -> BarrierSnapshot {
        let mut suspended: Vec<Pid> = self.suspended.iter().copied().collect();
        suspended.sort_unstable();
        BarrierSnapshot {
            epoch: self.epoch,
            suspended,
            next_wakeup: self.resume_index.earliest().copied(),
        }
    }
}

/// The suspend/hibernate/resume coordinator.
pub struct SuspendManager<M: BackupMemory, C: Clock> {
    pub(crate) state: Mutex<CoordinatorState>,
    barrier: CondVar,
    pub(crate) backup: Mutex<BackupArea<M>>,
    pub(crate) clock: C,
}

impl<M: BackupMemory, C: Clock> SuspendManager<M, C> {
    pub fn new(backup: BackupArea<M>, clock: C) -> Self {
        log::debug!(
            "[SUSPEND] Coordinator up, backup area at 0x{:x} ({} slots)",
            backup.base_address(),
            backup.capacity()
        );
        Self {
            state: Mutex::new(CoordinatorState::new()),
            barrier: CondVar::new(),
            backup: Mutex::new(backup),
            clock,
        }
    }

    /// Restricted handle for the process manager.
    pub fn process_port(&self) -> ProcessPort<'_, M, C> {
        ProcessPort::new(self)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn process(&self, pid: Pid) -> Option<Arc<Process>> {
        self.state.lock().processes.get(&pid).cloned()
    }

    /// Threads owned by live processes.
    pub fn live_threads(&self) -> usize {
        self.state.lock().live_threads
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Run `f` against the backup area, e.g. to inspect it after a pass.
    pub fn with_backup<R>(&self, f: impl FnOnce(&BackupArea<M>) -> R) -> R {
        f(&*self.backup.lock())
    }

    /// Tear the coordinator down and keep only the backup area.
    ///
    /// Simulators use this to model main memory going away.
    pub fn into_backup(self) -> BackupArea<M> {
        self.backup.into_inner()
    }

    /// Record an externally visible change and wake the hibernate task if the
    /// barrier now holds.
    pub(crate) fn publish(&self, st: &mut CoordinatorState) {
        st.epoch = st.epoch.wrapping_add(1);
        if st.barrier_satisfied() {
            self.barrier.notify_all();
        }
    }

    pub(crate) fn retire_slot(&self, slot: SlotIndex) {
        let mut backup = self.backup.lock();
        if let Err(e) = backup.retire(slot) {
            log::warn!("[BACKUP] Failed to retire slot {}: {}", slot, e);
        }
        backup.flush();
    }

    /// Drop the record written for `pid` in the current pass, if any.
    pub(crate) fn forget_record(&self, st: &mut CoordinatorState, pid: Pid) {
        if let Some(slot) = st.serialized.remove(&pid) {
            log::debug!("[HIBERNATE] Retiring record of pid {} in slot {}", pid, slot);
            self.retire_slot(slot);
        }
    }

    /// A Serialized process changed under its record: fall back to Suspended.
    pub(crate) fn invalidate_record(&self, st: &mut CoordinatorState, pid: Pid, inner: &mut ProcessInner) {
        if inner.state == ProcessState::Serialized {
            inner.state = ProcessState::Suspended;
            self.forget_record(st, pid);
            self.publish(st);
        }
    }

    /// [CO1] Park `thread` of `pid` in a blocking call.
    ///
    /// Fills the thread's interruption slot from `call` and indexes its
    /// deadline. Takes only coordinator locks.
    pub fn enter_interruption_point(
        &self,
        pid: Pid,
        thread: ThreadIndex,
        call: &BlockingCall,
    ) -> Result<(), SuspendError> {
        let mut st = self.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        if !inner.state.is_live() {
            return Err(SuspendError::ProcessTerminated);
        }
        if !inner.owns(thread) {
            return Err(SuspendError::ThreadOutOfRange);
        }
        let point = InterruptionPoint::enter(call);
        if point.backup_queue.is_some_and(|q| q.len > QueueRef::MAX_LEN) {
            return Err(SuspendError::QueueTooLarge);
        }
        inner.points.park(thread, point)?;
        st.resume_index
            .insert(ResumeEntry::new(point.deadline, pid, thread));
        self.invalidate_record(&mut st, pid, &mut inner);

        #[cfg(feature = "verbose-hibernate")]
        log::trace!(
            "[SUSPEND] {}.{} parked in call {} until {}",
            pid,
            thread.0,
            point.call.get(),
            point.deadline
        );
        Ok(())
    }

    /// [CO2] Move `pid` to Suspended. Every thread must be parked.
    ///
    /// Idempotent: suspending a Suspended or Serialized process is a no-op.
    pub fn request_suspend(&self, pid: Pid) -> Result<SuspendOutcome, SuspendError> {
        let mut st = self.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        match inner.state {
            ProcessState::Terminated => Err(SuspendError::ProcessTerminated),
            ProcessState::Suspended | ProcessState::Serialized => Ok(SuspendOutcome::AlreadySuspended),
            ProcessState::Running => {
                if !inner.all_parked() {
                    return Err(SuspendError::ThreadsNotQuiescent);
                }
                inner.transition(ProcessState::Suspended)?;
                drop(inner);
                st.suspended.insert(pid);
                log::debug!(
                    "[SUSPEND] pid {} suspended ({}/{} live)",
                    pid,
                    st.suspended.len(),
                    st.live
                );
                self.publish(&mut st);
                Ok(SuspendOutcome::Suspended)
            }
        }
    }

    /// [CO3] Every live process is suspended.
    pub fn hibernation_barrier_satisfied(&self) -> bool {
        self.state.lock().barrier_satisfied()
    }

    /// [CO4] Earliest pending resume deadline.
    pub fn next_wakeup(&self) -> Option<ResumeEntry> {
        self.state.lock().resume_index.earliest().copied()
    }

    fn with_parked<R>(
        &self,
        pid: Pid,
        thread: ThreadIndex,
        f: impl FnOnce(&mut InterruptionPoint) -> R,
    ) -> Result<R, SuspendError> {
        let mut st = self.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        if !inner.state.is_live() {
            return Err(SuspendError::ProcessTerminated);
        }
        let point = inner.points.get_mut(thread).ok_or(SuspendError::NotParked)?;
        let out = f(point);
        self.invalidate_record(&mut st, pid, &mut inner);
        Ok(out)
    }

    /// [CO5] Driver-side completion: the parked call must resume immediately.
    ///
    /// The flag survives a power cycle and wins over a future deadline.
    pub fn signal_wake(&self, pid: Pid, thread: ThreadIndex) -> Result<(), SuspendError> {
        self.with_parked(pid, thread, |p| p.wake = WakeMode::Now)
    }

    /// [CO6] Account `samples` more samples taken by a parked sampling call.
    ///
    /// Returns the new total. The counter stops at
    /// [`SampleProgress::MAX_COUNT`].
    pub fn record_samples(&self, pid: Pid, thread: ThreadIndex, samples: u32) -> Result<u32, SuspendError> {
        self.with_parked(pid, thread, |p| {
            p.sample.count = p
                .sample
                .count
                .saturating_add(samples)
                .min(SampleProgress::MAX_COUNT);
            p.sample.count
        })
    }

    /// Block until the barrier holds at an epoch other than `seen_epoch`.
    pub fn wait_for_barrier(&self, seen_epoch: Option<u64>) -> BarrierSnapshot {
        let mut st = self.state.lock();
        loop {
            if st.barrier_satisfied() && Some(st.epoch) != seen_epoch {
                return st.snapshot();
            }
            st = self.barrier.wait(&self.state, st);
        }
    }

    /// Current barrier state, if it holds.
    pub fn barrier_snapshot(&self) -> Option<BarrierSnapshot> {
        let st = self.state.lock();
        st.barrier_satisfied().then(|| st.snapshot())
    }

    /// [HB1] Open a pass for `snapshot`.
    ///
    /// Leftovers of an earlier pass are reverted to Suspended and their records
    /// retired. Returns the processes to serialize, ascending pid.
    pub fn begin_pass(&self, snapshot: &BarrierSnapshot) -> Result<Vec<Pid>, SerializeError> {
        let mut st = self.state.lock();
        if st.epoch != snapshot.epoch || !st.barrier_satisfied() {
            return Err(SerializeError::BarrierLost);
        }
        for process in st.processes.values() {
            let mut inner = process.lock();
            if inner.state == ProcessState::Serialized {
                inner.state = ProcessState::Suspended;
            }
        }
        st.serialized.clear();
        self.backup.lock().begin_pass()?;
        st.pass = Some(PassState {
            dropped: BTreeSet::new(),
        });
        let pids = st
            .processes
            .keys()
            .filter(|pid| st.suspended.contains(*pid))
            .copied()
            .collect();
        Ok(pids)
    }

    /// [HB2] Write the record and regions of `pid` into the next slot.
    ///
    /// Liveness is checked again here: a process that terminated since the
    /// snapshot is `Vanished`, one that was woken is `NoLongerSuspended`.
    pub fn serialize_process(&self, pid: Pid) -> Result<SlotIndex, SerializeError> {
        let mut st = self.state.lock();
        if st.pass.is_none() || !st.barrier_satisfied() {
            return Err(SerializeError::BarrierLost);
        }
        let Some(process) = st.processes.get(&pid).cloned() else {
            return Err(SerializeError::Vanished);
        };
        let mut inner = process.lock();
        match inner.state {
            ProcessState::Terminated => return Err(SerializeError::Vanished),
            ProcessState::Running => return Err(SerializeError::NoLongerSuspended),
            ProcessState::Serialized => {
                if let Some(&slot) = st.serialized.get(&pid) {
                    return Ok(slot);
                }
            }
            ProcessState::Suspended => {}
        }

        let mut backup = self.backup.lock();
        let mut record = inner.to_record(pid, process.parent(), self.clock.now());
        let slot = backup.next_slot()?;
        if let Err(e) = backup.write(slot, &mut record, &inner.image, &inner.program) {
            if let Some(pass) = st.pass.as_mut() {
                pass.dropped.insert(pid);
            }
            return Err(e.into());
        }
        inner.state = ProcessState::Serialized;
        drop(backup);
        drop(inner);
        st.serialized.insert(pid, slot);
        log::debug!("[HIBERNATE] pid {} -> slot {}", pid, slot);
        Ok(slot)
    }

    /// [HB3] Re-evaluate the barrier and make the pass durable.
    ///
    /// Succeeds only if the barrier still holds and every live process was
    /// serialized (or dropped for not fitting a slot). The returned
    /// [`SealedPass`] keeps the coordinator locked until power-down.
    pub fn seal_pass(&self) -> Result<SealedPass<'_>, SerializeError> {
        let st = self.state.lock();
        let Some(pass) = st.pass.as_ref() else {
            return Err(SerializeError::BarrierLost);
        };
        if !st.barrier_satisfied() {
            return Err(SerializeError::BarrierLost);
        }
        for (pid, process) in &st.processes {
            let covered = st.serialized.contains_key(pid) || pass.dropped.contains(pid);
            if process.state().is_live() && !covered {
                log::debug!("[HIBERNATE] pid {} has no record, not sealing", pid);
                return Err(SerializeError::BarrierLost);
            }
        }
        if !pass.dropped.is_empty() {
            log::error!(
                "[HIBERNATE] {} processes will not survive power-down",
                pass.dropped.len()
            );
        }
        self.backup.lock().flush();

        let wake_at = st.resume_index.earliest().map(|e| e.resume_time);
        let records = st.serialized.len();
        log::info!(
            "[HIBERNATE] Sealed {} records, next wakeup {:?}",
            records,
            wake_at
        );
        Ok(SealedPass {
            _state: st,
            wake_at,
            records,
        })
    }

    /// [HB4] Retire every record of the current pass and revert Serialized
    /// processes to Suspended. Returns how many records were retired.
    pub fn abandon_pass(&self) -> usize {
        let mut st = self.state.lock();
        st.pass = None;
        let slots: Vec<(Pid, SlotIndex)> = st.serialized.drain().collect();
        for (pid, _) in &slots {
            if let Some(process) = st.processes.get(pid) {
                let mut inner = process.lock();
                if inner.state == ProcessState::Serialized {
                    inner.state = ProcessState::Suspended;
                }
            }
        }
        let mut backup = self.backup.lock();
        for (_, slot) in &slots {
            if let Err(e) = backup.retire(*slot) {
                log::warn!("[BACKUP] Failed to retire slot {}: {}", slot, e);
            }
        }
        backup.flush();
        if !slots.is_empty() {
            log::info!("[HIBERNATE] Abandoned pass, retired {} records", slots.len());
        }
        slots.len()
    }
}

/// A durable pass waiting for power-down.
pub struct SealedPass<'a> {
    _state: MutexGuard<'a, CoordinatorState>,
    wake_at: Option<Ticks>,
    records: usize,
}

impl SealedPass<'_> {
    pub fn wake_at(&self) -> Option<Ticks> {
        self.wake_at
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Hand off to `power`; the coordinator is unlocked once it returns.
    pub fn power_down<P: PowerControl + ?Sized>(self, power: &P) -> Result<(), PowerError> {
        log::info!("[HIBERNATE] Powering down, {} records", self.records);
        power.power_down(self.wake_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::RamBackup;
    use crate::config::{AllocatorExtents, BackupLayout};
    use crate::error::BackupError;
    use crate::process::ProcessSpec;
    use crate::types::SyscallId;
    use core::sync::atomic::{AtomicI64, Ordering};

    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now(&self) -> Ticks {
            Ticks(self.0.load(Ordering::Relaxed))
        }
    }

    fn manager(slots: usize) -> SuspendManager<RamBackup, FixedClock> {
        let layout = BackupLayout::new(32, 16);
        let extents = AllocatorExtents::new(0x40, 0x40);
        let mem = RamBackup::new(0x4002_4000, extents.reserved() + slots * layout.slot_size());
        let area = BackupArea::new(mem, extents, layout).unwrap();
        SuspendManager::new(area, FixedClock(AtomicI64::new(100)))
    }

    fn call(at: i64) -> BlockingCall {
        BlockingCall::new(SyscallId::new(1).unwrap(), Ticks(at))
    }

    fn parked(m: &SuspendManager<RamBackup, FixedClock>, pid: u32, deadline: i64) {
        m.process_port().register(ProcessSpec::new(Pid(pid))).unwrap();
        m.enter_interruption_point(Pid(pid), ThreadIndex(0), &call(deadline))
            .unwrap();
    }

    /// Tests: [CO1] slot filled and deadline indexed
    #[test]
    fn test_enter_interruption_point() {
        let m = manager(2);
        parked(&m, 1, 500);
        let p = m.process(Pid(1)).unwrap();
        assert_eq!(
            p.interruption_point(ThreadIndex(0)).map(|p| p.deadline),
            Some(Ticks(500))
        );
        assert_eq!(
            m.next_wakeup(),
            Some(ResumeEntry::new(Ticks(500), Pid(1), ThreadIndex(0)))
        );
        assert_eq!(
            m.enter_interruption_point(Pid(1), ThreadIndex(2), &call(1)),
            Err(SuspendError::ThreadOutOfRange)
        );
        assert_eq!(
            m.enter_interruption_point(Pid(9), ThreadIndex(0), &call(1)),
            Err(SuspendError::UnknownProcess)
        );
    }

    /// Tests: [CO2] quiescence check and idempotence
    #[test]
    fn test_request_suspend() {
        let m = manager(2);
        m.process_port().register(ProcessSpec::new(Pid(1))).unwrap();
        assert_eq!(
            m.request_suspend(Pid(1)),
            Err(SuspendError::ThreadsNotQuiescent)
        );
        m.enter_interruption_point(Pid(1), ThreadIndex(0), &call(10))
            .unwrap();
        assert_eq!(m.request_suspend(Pid(1)), Ok(SuspendOutcome::Suspended));
        let epoch = m.epoch();
        assert_eq!(
            m.request_suspend(Pid(1)),
            Ok(SuspendOutcome::AlreadySuspended)
        );
        assert_eq!(m.epoch(), epoch);
    }

    /// Tests: [CO3] empty set is not a barrier
    #[test]
    fn test_barrier_predicate() {
        let m = manager(2);
        assert!(!m.hibernation_barrier_satisfied());
        parked(&m, 1, 10);
        parked(&m, 2, 20);
        m.request_suspend(Pid(1)).unwrap();
        assert!(!m.hibernation_barrier_satisfied());
        m.request_suspend(Pid(2)).unwrap();
        assert!(m.hibernation_barrier_satisfied());
    }

    /// Tests: [CO5] [CO6] parked-call updates
    #[test]
    fn test_signal_wake_and_samples() {
        let m = manager(2);
        parked(&m, 1, 10);
        assert_eq!(m.record_samples(Pid(1), ThreadIndex(0), 3), Ok(3));
        assert_eq!(m.record_samples(Pid(1), ThreadIndex(0), 2), Ok(5));
        m.signal_wake(Pid(1), ThreadIndex(0)).unwrap();
        let point = m.process(Pid(1)).unwrap().interruption_point(ThreadIndex(0));
        assert_eq!(point.map(|p| p.wake), Some(WakeMode::Now));
        assert_eq!(
            m.signal_wake(Pid(1), ThreadIndex::SUPERVISOR),
            Err(SuspendError::NotParked)
        );
    }

    /// Tests: [CO6] counter stops where the record field ends
    #[test]
    fn test_record_samples_saturates() {
        let m = manager(2);
        parked(&m, 1, 10);
        assert_eq!(
            m.record_samples(Pid(1), ThreadIndex(0), 0x8000_0000),
            Ok(SampleProgress::MAX_COUNT)
        );
        assert_eq!(
            m.record_samples(Pid(1), ThreadIndex(0), 1),
            Ok(SampleProgress::MAX_COUNT)
        );
    }

    /// Tests: [CO1] queue longer than a record can describe
    #[test]
    fn test_enter_rejects_oversized_queue() {
        let m = manager(2);
        m.process_port().register(ProcessSpec::new(Pid(1))).unwrap();
        let queue = |len| QueueRef {
            at: crate::types::SramOffset(0x10),
            len,
        };
        let target = crate::types::ImageOffset(0);
        assert_eq!(
            m.enter_interruption_point(
                Pid(1),
                ThreadIndex(0),
                &call(10).sampling(queue(QueueRef::MAX_LEN + 1), 4, target)
            ),
            Err(SuspendError::QueueTooLarge)
        );
        assert_eq!(m.next_wakeup(), None);
        assert!(
            m.enter_interruption_point(
                Pid(1),
                ThreadIndex(0),
                &call(10).sampling(queue(QueueRef::MAX_LEN), 4, target)
            )
            .is_ok()
        );
    }

    /// Tests: [HB1] [HB2] [HB3] full pass
    #[test]
    fn test_pass_marks_processes_serialized() {
        let m = manager(2);
        parked(&m, 1, 10);
        parked(&m, 2, 20);
        m.request_suspend(Pid(1)).unwrap();
        m.request_suspend(Pid(2)).unwrap();
        let snap = m.barrier_snapshot().unwrap();
        assert_eq!(snap.suspended, [Pid(1), Pid(2)]);

        let pids = m.begin_pass(&snap).unwrap();
        for pid in &pids {
            m.serialize_process(*pid).unwrap();
        }
        assert_eq!(m.process(Pid(2)).unwrap().state(), ProcessState::Serialized);
        assert!(m.hibernation_barrier_satisfied());
        {
            let sealed = m.seal_pass().unwrap();
            assert_eq!(sealed.records(), 2);
            assert_eq!(sealed.wake_at(), Some(Ticks(10)));
        }
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 2);
    }

    /// Tests: [HB2] capacity boundary
    #[test]
    fn test_serialize_exhausts_area() {
        let m = manager(1);
        parked(&m, 1, 10);
        parked(&m, 2, 20);
        m.request_suspend(Pid(1)).unwrap();
        m.request_suspend(Pid(2)).unwrap();
        let snap = m.barrier_snapshot().unwrap();
        m.begin_pass(&snap).unwrap();
        assert!(m.serialize_process(Pid(1)).is_ok());
        assert_eq!(
            m.serialize_process(Pid(2)),
            Err(SerializeError::Backup(BackupError::Exhausted))
        );
        // The first record stays valid.
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 1);
    }

    /// Tests: [HB4] a woken process invalidates the pass
    #[test]
    fn test_abandon_after_wake() {
        let m = manager(2);
        parked(&m, 1, 10);
        m.request_suspend(Pid(1)).unwrap();
        let snap = m.barrier_snapshot().unwrap();
        m.begin_pass(&snap).unwrap();
        m.serialize_process(Pid(1)).unwrap();

        m.process_port().make_runnable(Pid(1)).unwrap();
        assert!(matches!(m.seal_pass(), Err(SerializeError::BarrierLost)));
        assert_eq!(m.abandon_pass(), 0);
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 0);
        assert_eq!(m.process(Pid(1)).unwrap().state(), ProcessState::Running);
    }

    #[test]
    fn test_begin_pass_rejects_stale_snapshot() {
        let m = manager(2);
        parked(&m, 1, 10);
        m.request_suspend(Pid(1)).unwrap();
        let snap = m.barrier_snapshot().unwrap();
        m.process_port().register(ProcessSpec::new(Pid(2))).unwrap();
        assert_eq!(m.begin_pass(&snap), Err(SerializeError::BarrierLost));
    }
}
