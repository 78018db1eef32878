//! TEAM_430: Live process state as seen by the hibernation subsystem.
//!
//! The coordinator owns every [`Process`] through an `Arc`; the kernel keeps
//! clones for read access. All mutation goes through the coordinator, which
//! holds its own lock before taking a process lock.

extern crate alloc;

use alloc::boxed::Box;

use los_utils::{Mutex, MutexGuard};

use crate::config::{MAX_OPEN_FILES, MAX_THREADS_PER_PROCESS};
use crate::error::SuspendError;
use crate::record::{ProcessRecord, RecordFlags, RegionDescriptor};
use crate::registry::{InterruptionPoint, InterruptionTable};
use crate::types::{FileId, Pid, ProcessState, ThreadIndex, Ticks};

/// Per-process file descriptor table.
///
/// Only file identifiers are stored; what they refer to is the file
/// subsystem's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FdTable {
    entries: [Option<FileId>; MAX_OPEN_FILES],
}

impl FdTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_OPEN_FILES],
        }
    }

    #[must_use]
    pub const fn from_entries(entries: [Option<FileId>; MAX_OPEN_FILES]) -> Self {
        Self { entries }
    }

    /// Install `file` in the lowest free slot.
    pub fn alloc(&mut self, file: FileId) -> Option<usize> {
        let (fd, slot) = self.entries.iter_mut().enumerate().find(|(_, s)| s.is_none())?;
        *slot = Some(file);
        Some(fd)
    }

    #[must_use]
    pub fn get(&self, fd: usize) -> Option<FileId> {
        self.entries.get(fd).copied().flatten()
    }

    /// Replace slot `fd`, returning the previous entry.
    pub fn set(&mut self, fd: usize, file: Option<FileId>) -> Result<Option<FileId>, SuspendError> {
        let slot = self.entries.get_mut(fd).ok_or(SuspendError::BadFileSlot)?;
        Ok(core::mem::replace(slot, file))
    }

    #[must_use]
    pub const fn entries(&self) -> &[Option<FileId>; MAX_OPEN_FILES] {
        &self.entries
    }
}

/// Everything needed to register a process with the coordinator.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub(crate) pid: Pid,
    pub(crate) parent: Option<Pid>,
    pub(crate) image: Box<[u8]>,
    pub(crate) program: Box<[u8]>,
    pub(crate) files: FdTable,
    pub(crate) threads: u16,
}

impl ProcessSpec {
    /// A single-threaded process with no parent, no files and empty regions.
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            parent: None,
            image: Box::default(),
            program: Box::default(),
            files: FdTable::new(),
            threads: 1,
        }
    }

    #[must_use]
    pub fn parent(mut self, parent: Pid) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Writable process image (data, bss, heap, stacks).
    #[must_use]
    pub fn image(mut self, image: impl Into<Box<[u8]>>) -> Self {
        self.image = image.into();
        self
    }

    /// Read-only program the image was loaded from.
    #[must_use]
    pub fn program(mut self, program: impl Into<Box<[u8]>>) -> Self {
        self.program = program.into();
        self
    }

    /// Open `file` in the lowest free descriptor slot; ignored when full.
    #[must_use]
    pub fn open_file(mut self, file: FileId) -> Self {
        let _ = self.files.alloc(file);
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: u16) -> Self {
        self.threads = threads;
        self
    }
}

pub(crate) struct ProcessInner {
    pub(crate) state: ProcessState,
    pub(crate) exit_code: i32,
    pub(crate) thread_count: u16,
    pub(crate) files: FdTable,
    pub(crate) image: Box<[u8]>,
    pub(crate) program: Box<[u8]>,
    pub(crate) points: InterruptionTable,
}

impl ProcessInner {
    /// Owns `thread`: either one of its threads or the supervisory slot.
    pub(crate) fn owns(&self, thread: ThreadIndex) -> bool {
        thread.is_supervisor() || thread.slot() < usize::from(self.thread_count)
    }

    /// Every thread is parked in an interruption point.
    pub(crate) fn all_parked(&self) -> bool {
        self.points.covers_threads(usize::from(self.thread_count))
    }

    /// Move to `next`, refusing edges the lifecycle does not allow.
    pub(crate) fn transition(&mut self, next: ProcessState) -> Result<(), SuspendError> {
        if !self.state.can_transition_to(next) {
            return Err(SuspendError::InvalidTransition);
        }
        self.state = next;
        Ok(())
    }

    /// Record of this process as it would be serialized at `now`.
    ///
    /// Region descriptors and the payload checksum are filled in by the backup
    /// area when the regions are copied.
    pub(crate) fn to_record(&self, pid: Pid, parent: Option<Pid>, now: Ticks) -> ProcessRecord {
        let mut flags = RecordFlags::empty();
        if self
            .points
            .iter()
            .any(|(_, p)| p.backup_queue.is_some() && p.sample.count > 0)
        {
            flags |= RecordFlags::SAMPLES_PENDING;
        }
        ProcessRecord {
            flags,
            payload_checksum: 0,
            serialized_at: now,
            pid,
            parent,
            state: ProcessState::Serialized,
            thread_count: self.thread_count,
            exit_code: self.exit_code,
            image: RegionDescriptor::default(),
            program: RegionDescriptor::default(),
            files: *self.files.entries(),
            points: self.points,
        }
    }
}

/// A process known to the coordinator.
pub struct Process {
    pid: Pid,
    parent: Option<Pid>,
    inner: Mutex<ProcessInner>,
}

impl Process {
    pub(crate) fn from_spec(spec: ProcessSpec) -> Result<Self, SuspendError> {
        if usize::from(spec.threads) > MAX_THREADS_PER_PROCESS {
            return Err(SuspendError::TooManyThreads);
        }
        if spec.pid > Pid::MAX || spec.parent.is_some_and(|p| p > Pid::MAX) {
            return Err(SuspendError::PidOutOfRange);
        }
        Ok(Self {
            pid: spec.pid,
            parent: spec.parent,
            inner: Mutex::new(ProcessInner {
                state: ProcessState::Running,
                exit_code: 0,
                thread_count: spec.threads,
                files: spec.files,
                image: spec.image,
                program: spec.program,
                points: InterruptionTable::new(),
            }),
        })
    }

    /// Rebuild a process from a restored record and its copied regions.
    pub(crate) fn restore(
        record: &ProcessRecord,
        points: InterruptionTable,
        image: Box<[u8]>,
        program: Box<[u8]>,
        state: ProcessState,
    ) -> Self {
        Self {
            pid: record.pid,
            parent: record.parent,
            inner: Mutex::new(ProcessInner {
                state,
                exit_code: record.exit_code,
                thread_count: record.thread_count,
                files: FdTable::from_entries(record.files),
                image,
                program,
                points,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    /// Exit code; only meaningful once terminated.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        let inner = self.inner.lock();
        (inner.state == ProcessState::Terminated).then_some(inner.exit_code)
    }

    #[must_use]
    pub fn thread_count(&self) -> u16 {
        self.inner.lock().thread_count
    }

    #[must_use]
    pub fn files(&self) -> FdTable {
        self.inner.lock().files
    }

    #[must_use]
    pub fn interruption_point(&self, thread: ThreadIndex) -> Option<InterruptionPoint> {
        self.inner.lock().points.get(thread).copied()
    }

    /// Snapshot of every interruption slot.
    #[must_use]
    pub fn points(&self) -> InterruptionTable {
        self.inner.lock().points
    }

    /// Copy of the writable image.
    #[must_use]
    pub fn image(&self) -> Box<[u8]> {
        self.inner.lock().image.clone()
    }

    /// Copy of the program region.
    #[must_use]
    pub fn program(&self) -> Box<[u8]> {
        self.inner.lock().program.clone()
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent)
            .field("state", &inner.state)
            .field("threads", &inner.thread_count)
            .finish_non_exhaustive()
    }
}
