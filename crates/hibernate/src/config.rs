//! TEAM_430: Hibernation configuration.
//!
//! The constants in this file are part of the persisted record format: changing
//! any of them changes `RECORD_SIZE` and must be accompanied by a bump of
//! [`RECORD_VERSION`], or records written before the change will be rejected as
//! corrupt after the next boot.

/// Open file slots per process.
pub const MAX_OPEN_FILES: usize = 8;

/// Threads a single process may own.
pub const MAX_THREADS_PER_PROCESS: usize = 4;

/// Interruption-point slots per process: one per thread plus the supervisory slot.
pub const INTERRUPTION_SLOTS: usize = MAX_THREADS_PER_PROCESS + 1;

/// Words in a saved execution context (callee-saved registers, sp, lr, psr, ...).
pub const CTXSAVE_SIZE: usize = 17;

/// Marks a slot as holding a record ("HBRS" in little-endian ASCII).
pub const RECORD_MAGIC: u32 = 0x5352_4248;

/// Schema version of the record layout.
pub const RECORD_VERSION: u16 = 1;

/// Default per-slot capacity for the writable process image.
pub const DEFAULT_IMAGE_CAPACITY: usize = 4096;

/// Default per-slot capacity for the read-only program.
pub const DEFAULT_PROGRAM_CAPACITY: usize = 2048;

/// Run-time sizing of the backup state area.
///
/// Each slot is a record followed by room for one image and one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupLayout {
    pub image_capacity: usize,
    pub program_capacity: usize,
}

impl BackupLayout {
    #[must_use]
    pub const fn new(image_capacity: usize, program_capacity: usize) -> Self {
        Self {
            image_capacity,
            program_capacity,
        }
    }

    /// Bytes occupied by one slot, record included.
    #[must_use]
    pub const fn slot_size(&self) -> usize {
        crate::record::RECORD_SIZE + self.image_capacity + self.program_capacity
    }
}

impl Default for BackupLayout {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_CAPACITY, DEFAULT_PROGRAM_CAPACITY)
    }
}

/// Extents of the two allocators that live at the start of backup memory.
///
/// Reported by the allocators themselves; this subsystem never manages them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorExtents {
    /// General backup-memory allocator.
    pub general: usize,
    /// Backup queue allocator used by sampling drivers.
    pub backup: usize,
}

impl AllocatorExtents {
    #[must_use]
    pub const fn new(general: usize, backup: usize) -> Self {
        Self { general, backup }
    }

    /// Bytes reserved ahead of the backup state area.
    #[must_use]
    pub const fn reserved(&self) -> usize {
        self.general + self.backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_size_includes_record() {
        let layout = BackupLayout::new(100, 50);
        assert_eq!(layout.slot_size(), crate::record::RECORD_SIZE + 150);
    }

    #[test]
    fn test_reserved_sums_extents() {
        assert_eq!(AllocatorExtents::new(0x200, 0x80).reserved(), 0x280);
        assert_eq!(AllocatorExtents::default().reserved(), 0);
    }
}
