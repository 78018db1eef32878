//! TEAM_430: Interruption-point registry.
//!
//! A thread about to block in a long-running system call parks its state here:
//! which call, which file, when it is due, and how far its sampling got. The
//! same [`InterruptionPoint`] is what gets serialized, so a parked thread
//! survives a power cycle without any translation step.
//!
//! The [`ResumeIndex`] orders every parked thread by deadline so the coordinator
//! can answer "what wakes next" in logarithmic time.

extern crate alloc;

use alloc::collections::BTreeSet;

use crate::config::{INTERRUPTION_SLOTS, MAX_THREADS_PER_PROCESS};
use crate::error::SuspendError;
use crate::types::{
    FileId, ImageOffset, Pid, QueueRef, SampleProgress, SavedContext, SyscallId, ThreadIndex,
    ThreadRef, Ticks, WakeMode,
};

/// Description of a blocking call, supplied by the syscall layer at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingCall {
    call: SyscallId,
    resume_time: Ticks,
    file: Option<FileId>,
    registers: SavedContext,
    backup_queue: Option<QueueRef>,
    target: Option<ImageOffset>,
    sample_size: u8,
}

impl BlockingCall {
    #[must_use]
    pub fn new(call: SyscallId, resume_time: Ticks) -> Self {
        Self {
            call,
            resume_time,
            file: None,
            registers: SavedContext::default(),
            backup_queue: None,
            target: None,
            sample_size: 0,
        }
    }

    #[must_use]
    pub fn on_file(mut self, file: FileId) -> Self {
        self.file = Some(file);
        self
    }

    #[must_use]
    pub fn with_registers(mut self, registers: SavedContext) -> Self {
        self.registers = registers;
        self
    }

    /// The call accumulates samples of `sample_size` bytes into `queue`, to be
    /// copied to `target` inside the process image when it completes.
    #[must_use]
    pub fn sampling(mut self, queue: QueueRef, sample_size: u8, target: ImageOffset) -> Self {
        self.backup_queue = Some(queue);
        self.sample_size = sample_size;
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn resume_time(&self) -> Ticks {
        self.resume_time
    }
}

/// State of a thread parked inside a blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptionPoint {
    pub call: SyscallId,
    pub file: Option<FileId>,
    pub deadline: Ticks,
    pub backup_queue: Option<QueueRef>,
    pub wake: WakeMode,
    pub sample: SampleProgress,
    pub registers: SavedContext,
    pub target: Option<ImageOffset>,
}

impl InterruptionPoint {
    /// [IP1] Fresh entry: deadline from the call, sample counter zeroed.
    #[must_use]
    pub fn enter(call: &BlockingCall) -> Self {
        Self {
            call: call.call,
            file: call.file,
            deadline: call.resume_time,
            backup_queue: call.backup_queue,
            wake: WakeMode::AtDeadline,
            sample: SampleProgress {
                size: call.sample_size,
                count: 0,
            },
            registers: call.registers,
            target: call.target,
        }
    }

    /// [IP2] Reconcile against the clock after a power cycle.
    ///
    /// A forced wake always wins; otherwise the thread wakes now iff its
    /// deadline is not in the future.
    pub fn reconcile(&mut self, now: Ticks) -> WakeMode {
        if self.deadline <= now {
            self.wake = WakeMode::Now;
        }
        self.wake
    }
}

/// Fixed per-process array of interruption slots.
///
/// Slots `0..MAX_THREADS_PER_PROCESS` belong to threads by index; the last slot
/// is [`ThreadIndex::SUPERVISOR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptionTable {
    slots: [Option<InterruptionPoint>; INTERRUPTION_SLOTS],
}

impl InterruptionTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None; INTERRUPTION_SLOTS],
        }
    }

    #[must_use]
    pub const fn from_slots(slots: [Option<InterruptionPoint>; INTERRUPTION_SLOTS]) -> Self {
        Self { slots }
    }

    #[must_use]
    pub const fn slots(&self) -> &[Option<InterruptionPoint>; INTERRUPTION_SLOTS] {
        &self.slots
    }

    /// [IP3] Park `thread`; a slot can hold only one call at a time.
    pub fn park(&mut self, thread: ThreadIndex, point: InterruptionPoint) -> Result<(), SuspendError> {
        let slot = self
            .slots
            .get_mut(thread.slot())
            .ok_or(SuspendError::ThreadOutOfRange)?;
        if slot.is_some() {
            return Err(SuspendError::SlotBusy);
        }
        *slot = Some(point);
        Ok(())
    }

    /// Remove and return the entry of `thread`, if parked.
    pub fn clear(&mut self, thread: ThreadIndex) -> Option<InterruptionPoint> {
        self.slots.get_mut(thread.slot()).and_then(Option::take)
    }

    #[must_use]
    pub fn get(&self, thread: ThreadIndex) -> Option<&InterruptionPoint> {
        self.slots.get(thread.slot()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, thread: ThreadIndex) -> Option<&mut InterruptionPoint> {
        self.slots.get_mut(thread.slot()).and_then(Option::as_mut)
    }

    /// Thread slots in use, supervisory slot excluded.
    #[must_use]
    pub fn parked_threads(&self) -> usize {
        self.slots[..MAX_THREADS_PER_PROCESS]
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    /// [IP4] True iff exactly the first `thread_count` thread slots are in use.
    #[must_use]
    pub fn covers_threads(&self, thread_count: usize) -> bool {
        self.slots[..MAX_THREADS_PER_PROCESS]
            .iter()
            .enumerate()
            .all(|(i, s)| s.is_some() == (i < thread_count))
    }

    /// In-use slots with their thread index.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadIndex, &InterruptionPoint)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|p| (ThreadIndex(i as u8), p)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ThreadIndex, &mut InterruptionPoint)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|p| (ThreadIndex(i as u8), p)))
    }
}

/// Non-owning index entry: "thread `pid.thread` is due at `resume_time`".
///
/// Field order gives the total order: time, then pid, then thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResumeEntry {
    pub resume_time: Ticks,
    pub pid: Pid,
    pub thread: ThreadIndex,
}

impl ResumeEntry {
    #[must_use]
    pub const fn new(resume_time: Ticks, pid: Pid, thread: ThreadIndex) -> Self {
        Self {
            resume_time,
            pid,
            thread,
        }
    }

    #[must_use]
    pub const fn thread_ref(&self) -> ThreadRef {
        ThreadRef::new(self.pid, self.thread)
    }
}

/// Pending resume deadlines, earliest first.
#[derive(Debug, Default)]
pub struct ResumeIndex {
    entries: BTreeSet<ResumeEntry>,
}

impl ResumeIndex {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, entry: ResumeEntry) -> bool {
        self.entries.insert(entry)
    }

    pub fn remove(&mut self, entry: &ResumeEntry) -> bool {
        self.entries.remove(entry)
    }

    /// [RI1] Earliest deadline; ties broken by pid then thread.
    #[must_use]
    pub fn earliest(&self) -> Option<&ResumeEntry> {
        self.entries.first()
    }

    /// Drop every entry of `pid`; returns how many were removed.
    pub fn remove_process(&mut self, pid: Pid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.pid != pid);
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResumeEntry> {
        self.entries.iter()
    }
}
