//! TEAM_430: Error types for the hibernation subsystem.
//!
//! Codes are stable across builds: a code logged before a power cut identifies
//! the same failure after the next boot.

use los_error::define_kernel_error;

define_kernel_error! {
    /// Backup state area failures (CapacityError family).
    pub enum BackupError(0x21) {
        /// Every slot of the area is in use for this pass
        Exhausted = 0x01 => "Backup state area exhausted",
        /// Image or program larger than the per-slot capacity
        ImageTooLarge = 0x02 => "Memory image exceeds slot capacity",
        /// Backup memory cannot hold even one slot after the reserved extents
        RegionTooSmall = 0x03 => "Backup memory smaller than one slot",
        /// Slot index or byte range outside backup memory
        OutOfBounds = 0x04 => "Access outside backup memory",
    }
}

define_kernel_error! {
    /// A scanned record failed validation (IntegrityError family).
    pub enum RecordError(0x22) {
        /// Slot does not carry the record magic (free or never written)
        NotARecord = 0x01 => "Slot holds no record",
        /// Written by an incompatible schema
        UnsupportedVersion = 0x02 => "Unsupported record version",
        /// Record bytes do not match their checksum
        ChecksumMismatch = 0x03 => "Record checksum mismatch",
        /// Thread count larger than the per-process maximum
        TooManyThreads = 0x04 => "Thread count exceeds maximum",
        /// Status tag is not a known lifecycle state
        InvalidState = 0x05 => "Unknown status tag",
        /// In-use interruption slots disagree with the thread count
        ThreadSlotMismatch = 0x06 => "Interruption slots disagree with thread count",
        /// Image or program descriptor points outside its slot
        RegionOutOfBounds = 0x07 => "Region descriptor outside slot",
        /// Copied image/program bytes do not match their checksum
        PayloadChecksumMismatch = 0x08 => "Payload checksum mismatch",
        /// Negative pid or a malformed field value
        MalformedField = 0x09 => "Malformed field",
    }
}

define_kernel_error! {
    /// Process-manager and registry requests the coordinator refused.
    pub enum SuspendError(0x23) {
        /// No process with this pid
        UnknownProcess = 0x01 => "Unknown process",
        /// Process already terminated
        ProcessTerminated = 0x02 => "Process terminated",
        /// Thread index not owned by the process
        ThreadOutOfRange = 0x03 => "Thread index out of range",
        /// Thread is already parked in an interruption point
        SlotBusy = 0x04 => "Interruption slot already in use",
        /// Some thread is not parked in an interruption point
        ThreadsNotQuiescent = 0x05 => "Threads not parked",
        /// Pid already registered
        DuplicatePid = 0x06 => "Duplicate pid",
        /// Process already owns the maximum number of threads
        TooManyThreads = 0x07 => "Thread limit reached",
        /// Lifecycle transition not allowed from the current state
        InvalidTransition = 0x08 => "Invalid lifecycle transition",
        /// File descriptor slot out of range
        BadFileSlot = 0x09 => "File descriptor slot out of range",
        /// Thread has no call parked in its interruption slot
        NotParked = 0x0A => "Thread not parked",
        /// Pid or parent pid does not fit the record's signed 32-bit field
        PidOutOfRange = 0x0B => "Pid exceeds record range",
        /// Backup queue length does not fit the record's signed 32-bit field
        QueueTooLarge = 0x0C => "Backup queue exceeds record range",
    }
}

define_kernel_error! {
    /// Failures while writing a hibernation pass.
    pub enum SerializeError(0x24) {
        /// Slot allocation or payload copy failed
        Backup(BackupError) = 0x01 => "Backup area rejected the record",
        /// Process terminated after the barrier snapshot
        Vanished = 0x02 => "Process vanished before serialization",
        /// Process became runnable after the barrier snapshot
        NoLongerSuspended = 0x03 => "Process no longer suspended",
        /// Barrier no longer holds, or no pass is open
        BarrierLost = 0x04 => "Hibernation barrier lost",
    }
}

define_kernel_error! {
    /// The power controller could not enter the low-power state.
    pub enum PowerError(0x25) {
        /// Controller refused the request
        Refused = 0x01 => "Power-down refused",
        /// RTC alarm cannot be programmed for the requested wake time
        AlarmOutOfRange = 0x02 => "Wake alarm out of range",
    }
}

impl From<BackupError> for SerializeError {
    fn from(e: BackupError) -> Self {
        SerializeError::Backup(e)
    }
}
