//! TEAM_430: Identifiers, clock units and relocatable references.

use core::fmt;

use bytemuck::{Pod, Zeroable};

use crate::config::{CTXSAVE_SIZE, MAX_THREADS_PER_PROCESS};

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// Largest pid a process record can carry.
    pub const MAX: Pid = Pid(i32::MAX as u32);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a thread inside its process, or the supervisory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadIndex(pub u8);

impl ThreadIndex {
    /// Slot reserved for the process's own supervisory state.
    pub const SUPERVISOR: ThreadIndex = ThreadIndex(MAX_THREADS_PER_PROCESS as u8);

    #[must_use]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }

    #[must_use]
    pub const fn is_supervisor(self) -> bool {
        self.0 as usize == MAX_THREADS_PER_PROCESS
    }
}

/// A thread, named by its owning process and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadRef {
    pub pid: Pid,
    pub thread: ThreadIndex,
}

impl ThreadRef {
    #[must_use]
    pub const fn new(pid: Pid, thread: ThreadIndex) -> Self {
        Self { pid, thread }
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pid.0, self.thread.0)
    }
}

/// Opaque file identifier owned by the file subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u16);

/// Identifier of the blocking system call a thread is parked in.
///
/// Zero is reserved: a serialized interruption slot with call id zero is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyscallId(core::num::NonZeroU32);

impl SyscallId {
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match core::num::NonZeroU32::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// Absolute time in kernel clock units.
///
/// The clock that produces these is RTC-backed, so values taken before a power
/// cycle remain comparable with values taken after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub i64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);

    /// Time from `earlier` to `self`, clamped at zero.
    #[must_use]
    pub const fn since(self, earlier: Ticks) -> Ticks {
        let d = self.0.saturating_sub(earlier.0);
        if d < 0 { Ticks(0) } else { Ticks(d) }
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// Lifecycle of a process with respect to hibernation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Running,
    Suspended,
    Serialized,
    Terminated,
}

impl ProcessState {
    /// [LC1] Allowed transitions of the per-process state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::{Running, Serialized, Suspended, Terminated};
        // Terminated is reachable from anywhere and is final.
        if matches!(self, Terminated) {
            return false;
        }
        matches!(
            (self, next),
            (_, Terminated)
                | (Running, Suspended)
                | (Suspended, Running | Serialized)
                // Serialized falls back when a pass is abandoned or the process is woken.
                | (Serialized, Suspended | Running)
        )
    }

    /// Counts towards the hibernation barrier.
    #[must_use]
    pub const fn is_quiescent(self) -> bool {
        matches!(self, ProcessState::Suspended | ProcessState::Serialized)
    }

    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, ProcessState::Terminated)
    }

    pub(crate) const fn to_raw(self) -> i16 {
        match self {
            ProcessState::Running => 0,
            ProcessState::Suspended => 1,
            ProcessState::Serialized => 2,
            ProcessState::Terminated => 3,
        }
    }

    pub(crate) const fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(ProcessState::Running),
            1 => Some(ProcessState::Suspended),
            2 => Some(ProcessState::Serialized),
            3 => Some(ProcessState::Terminated),
            _ => None,
        }
    }
}

/// Whether a parked thread resumes at its deadline or immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WakeMode {
    #[default]
    AtDeadline,
    Now,
}

/// Saved execution context of a parked thread; opaque to this subsystem.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SavedContext(pub [u32; CTXSAVE_SIZE]);

impl Default for SavedContext {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

macro_rules! relative_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            /// Encoded form of "no reference".
            pub(crate) const NONE_RAW: u32 = u32::MAX;

            /// Absolute address of this reference against `base`.
            #[must_use]
            pub const fn resolve(self, base: usize) -> usize {
                base + self.0 as usize
            }

            pub(crate) const fn encode(this: Option<Self>) -> u32 {
                match this {
                    Some(r) => r.0,
                    None => Self::NONE_RAW,
                }
            }

            pub(crate) const fn decode(raw: u32) -> Option<Self> {
                if raw == Self::NONE_RAW { None } else { Some(Self(raw)) }
            }
        }
    };
}

relative_ref! {
    /// Offset from the start of the backup state area.
    AreaOffset
}

relative_ref! {
    /// Offset from the start of backup memory (queues live in the reserved extents).
    SramOffset
}

relative_ref! {
    /// Offset from the base of the owning process image.
    ImageOffset
}

/// Queue a sampling driver is filling in backup memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueRef {
    pub at: SramOffset,
    pub len: u32,
}

impl QueueRef {
    /// Longest queue a process record can carry.
    pub const MAX_LEN: u32 = i32::MAX as u32;
}

/// Progress of a call that produces samples incrementally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SampleProgress {
    /// Bytes per sample.
    pub size: u8,
    /// Samples taken so far.
    pub count: u32,
}

impl SampleProgress {
    /// Counter ceiling; the record stores it as a signed 32-bit field.
    pub const MAX_COUNT: u32 = i32::MAX as u32;
}
