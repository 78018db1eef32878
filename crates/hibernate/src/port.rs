//! TEAM_430: Process-manager port.
//!
//! The process manager never touches coordinator internals. It gets a
//! [`ProcessPort`] that exposes exactly the lifecycle operations it owns: pid,
//! status, file table and interruption points.

extern crate alloc;

use alloc::sync::Arc;

use crate::backup::BackupMemory;
use crate::coordinator::SuspendManager;
use crate::error::SuspendError;
use crate::process::{FdTable, Process, ProcessSpec};
use crate::registry::{InterruptionPoint, InterruptionTable, ResumeEntry};
use crate::traits::Clock;
use crate::types::{FileId, Pid, ProcessState, ThreadIndex};

/// Restricted handle on a [`SuspendManager`], see
/// [`SuspendManager::process_port`].
pub struct ProcessPort<'a, M: BackupMemory, C: Clock> {
    manager: &'a SuspendManager<M, C>,
}

impl<'a, M: BackupMemory, C: Clock> ProcessPort<'a, M, C> {
    pub(crate) fn new(manager: &'a SuspendManager<M, C>) -> Self {
        Self { manager }
    }

    /// [PP1] Add a freshly loaded process in state Running.
    pub fn register(&self, spec: ProcessSpec) -> Result<Arc<Process>, SuspendError> {
        let m = self.manager;
        let mut st = m.state.lock();
        if st.processes.contains_key(&spec.pid) {
            return Err(SuspendError::DuplicatePid);
        }
        let pid = spec.pid;
        let process = Arc::new(Process::from_spec(spec)?);
        st.live += 1;
        st.live_threads += usize::from(process.thread_count());
        st.processes.insert(pid, Arc::clone(&process));
        log::debug!("[SUSPEND] Registered pid {} ({} live)", pid, st.live);
        m.publish(&mut st);
        Ok(process)
    }

    /// [PP2] Give a Running process one more thread.
    pub fn spawn_thread(&self, pid: Pid) -> Result<ThreadIndex, SuspendError> {
        let mut st = self.manager.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        match inner.state {
            ProcessState::Terminated => return Err(SuspendError::ProcessTerminated),
            ProcessState::Suspended | ProcessState::Serialized => {
                return Err(SuspendError::InvalidTransition);
            }
            ProcessState::Running => {}
        }
        if usize::from(inner.thread_count) >= crate::config::MAX_THREADS_PER_PROCESS {
            return Err(SuspendError::TooManyThreads);
        }
        let thread = ThreadIndex(inner.thread_count as u8);
        inner.thread_count += 1;
        st.live_threads += 1;
        Ok(thread)
    }

    /// [PP3] Terminate `pid` from any live state.
    ///
    /// Its resume entries go away, and a record already written for it in the
    /// current pass is retired.
    pub fn terminate(&self, pid: Pid, exit_code: i32) -> Result<(), SuspendError> {
        let m = self.manager;
        let mut st = m.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        if inner.state == ProcessState::Terminated {
            return Err(SuspendError::ProcessTerminated);
        }
        inner.transition(ProcessState::Terminated)?;
        inner.exit_code = exit_code;
        inner.points = InterruptionTable::new();
        let threads = usize::from(inner.thread_count);
        drop(inner);

        m.forget_record(&mut st, pid);
        st.suspended.remove(&pid);
        st.resume_index.remove_process(pid);
        st.live -= 1;
        st.live_threads = st.live_threads.saturating_sub(threads);
        log::debug!("[SUSPEND] pid {} terminated ({})", pid, exit_code);
        m.publish(&mut st);
        Ok(())
    }

    /// [PP4] Asynchronous un-suspend, e.g. an interrupt for one of its threads.
    ///
    /// Cancels a pending hibernation: the barrier no longer holds and a record
    /// already written for `pid` is retired.
    pub fn make_runnable(&self, pid: Pid) -> Result<(), SuspendError> {
        let m = self.manager;
        let mut st = m.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        match inner.state {
            ProcessState::Terminated => Err(SuspendError::ProcessTerminated),
            ProcessState::Running => Ok(()),
            ProcessState::Suspended | ProcessState::Serialized => {
                inner.transition(ProcessState::Running)?;
                drop(inner);
                m.forget_record(&mut st, pid);
                st.suspended.remove(&pid);
                log::debug!("[SUSPEND] pid {} runnable again", pid);
                m.publish(&mut st);
                Ok(())
            }
        }
    }

    /// [PP5] Remove a terminated process and return its exit code.
    pub fn reap(&self, pid: Pid) -> Result<i32, SuspendError> {
        let mut st = self.manager.state.lock();
        let process = st.process(pid)?;
        let exit_code = process.exit_code().ok_or(SuspendError::InvalidTransition)?;
        st.processes.remove(&pid);
        Ok(exit_code)
    }

    pub fn status(&self, pid: Pid) -> Option<ProcessState> {
        self.manager.process(pid).map(|p| p.state())
    }

    pub fn file_descriptors(&self, pid: Pid) -> Result<FdTable, SuspendError> {
        let st = self.manager.state.lock();
        Ok(st.process(pid)?.files())
    }

    /// [PP6] Install or close (`None`) descriptor `fd`; returns the old entry.
    pub fn set_file(&self, pid: Pid, fd: usize, file: Option<FileId>) -> Result<Option<FileId>, SuspendError> {
        let m = self.manager;
        let mut st = m.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        if !inner.state.is_live() {
            return Err(SuspendError::ProcessTerminated);
        }
        let old = inner.files.set(fd, file)?;
        m.invalidate_record(&mut st, pid, &mut inner);
        Ok(old)
    }

    pub fn interruption_point(
        &self,
        pid: Pid,
        thread: ThreadIndex,
    ) -> Result<Option<InterruptionPoint>, SuspendError> {
        let st = self.manager.state.lock();
        let process = st.process(pid)?;
        let inner = process.lock();
        if !inner.owns(thread) {
            return Err(SuspendError::ThreadOutOfRange);
        }
        Ok(inner.points.get(thread).copied())
    }

    /// [PP7] The blocking call of `thread` returned normally.
    ///
    /// Clears the slot (and with it any forced wake), drops the resume entry
    /// and, since one of its threads is running, takes the process out of the
    /// suspended set.
    pub fn call_completed(&self, pid: Pid, thread: ThreadIndex) -> Result<InterruptionPoint, SuspendError> {
        let m = self.manager;
        let mut st = m.state.lock();
        let process = st.process(pid)?;
        let mut inner = process.lock();
        if !inner.state.is_live() {
            return Err(SuspendError::ProcessTerminated);
        }
        let point = inner.points.clear(thread).ok_or(SuspendError::NotParked)?;
        st.resume_index
            .remove(&ResumeEntry::new(point.deadline, pid, thread));
        if inner.state.is_quiescent() {
            inner.transition(ProcessState::Running)?;
            drop(inner);
            m.forget_record(&mut st, pid);
            st.suspended.remove(&pid);
            m.publish(&mut st);
        }
        Ok(point)
    }
}
