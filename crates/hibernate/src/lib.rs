//! TEAM_430: Process hibernation for kernels with a volatile main memory and a
//! small non-volatile backup memory.
//!
//! Lifecycle of a process with respect to hibernation:
//!
//! ```text
//! Running -> Suspended -> Serialized -> { Running | Suspended } -> Terminated
//! ```
//!
//! Threads park in interruption points while blocked in long system calls
//! ([`SuspendManager::enter_interruption_point`]). Once every thread of a
//! process is parked the process can be suspended; once every live process is
//! suspended the [`HibernateTask`] may write them all into the
//! [`BackupArea`] and cut power. After the next boot the [`ResumeTask`]
//! restores them and reconciles every deadline against the RTC.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod backup;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hibernate;
pub mod logger;
pub mod port;
pub mod process;
pub mod record;
pub mod registry;
pub mod resume;
pub mod traits;
pub mod types;

pub use backup::{BackupArea, BackupMemory, DirtySlot, RamBackup, RejectedSlot, SlotIndex, SramRegion};
pub use config::{AllocatorExtents, BackupLayout};
pub use coordinator::{SealedPass, SuspendManager, SuspendOutcome};
pub use error::{BackupError, PowerError, RecordError, SerializeError, SuspendError};
pub use hibernate::{HibernateOutcome, HibernateTask};
pub use port::ProcessPort;
pub use process::{FdTable, Process, ProcessSpec};
pub use record::{ProcessRecord, RecordFlags};
pub use registry::{BlockingCall, InterruptionPoint, InterruptionTable, ResumeEntry, ResumeIndex};
pub use resume::{ResumeOutcome, ResumeReport, ResumeTask};
pub use traits::{BarrierSnapshot, Clock, HibernationPolicy, PowerControl, ThreadScheduler};
pub use types::{
    AreaOffset, FileId, ImageOffset, Pid, ProcessState, QueueRef, SampleProgress, SavedContext,
    SramOffset, SyscallId, ThreadIndex, ThreadRef, Ticks, WakeMode,
};
