//! TEAM_430: Backup state area.
//!
//! The area starts right after the two allocator extents at the bottom of
//! backup memory and is a dense array of equally sized slots:
//!
//! ```text
//! | general alloc | backup alloc | slot 0 | slot 1 | ... | slot N-1 | (unused) |
//!                                ^ base_address()
//! slot = record (RECORD_SIZE) | image (image_capacity) | program (program_capacity)
//! ```
//!
//! Only the hibernate task writes here and only the resume task reads, once per
//! boot, so the area carries no lock of its own.

pub mod memory;

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

use crate::config::{AllocatorExtents, BackupLayout};
use crate::error::{BackupError, RecordError};
use crate::record::{ProcessRecord, RECORD_SIZE, RecordFlags, RegionDescriptor, payload_checksum};
use crate::types::{AreaOffset, ProcessState};

pub use memory::{BackupMemory, RamBackup, SramRegion};

/// Index of a slot in the backup state area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub usize);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A record waiting to be restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtySlot {
    pub slot: SlotIndex,
    pub record: ProcessRecord,
}

/// A slot that carries the record magic but failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedSlot {
    pub slot: SlotIndex,
    pub error: RecordError,
}

/// Fixed-capacity array of process records in backup memory.
pub struct BackupArea<M: BackupMemory> {
    memory: M,
    extents: AllocatorExtents,
    layout: BackupLayout,
    capacity: usize,
    cursor: usize,
}

impl<M: BackupMemory> BackupArea<M> {
    /// Lay the area out over `memory`; capacity is however many whole slots fit.
    pub fn new(memory: M, extents: AllocatorExtents, layout: BackupLayout) -> Result<Self, BackupError> {
        let available = memory
            .len()
            .checked_sub(extents.reserved())
            .ok_or(BackupError::RegionTooSmall)?;
        let capacity = available / layout.slot_size();
        if capacity == 0 {
            return Err(BackupError::RegionTooSmall);
        }
        log::debug!(
            "[BACKUP] Area at 0x{:x}: {} slots of {} bytes",
            memory.base_address() + extents.reserved(),
            capacity,
            layout.slot_size()
        );
        Ok(Self {
            memory,
            extents,
            layout,
            capacity,
            cursor: 0,
        })
    }

    /// [BA1] Address right after both allocator extents.
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.memory.base_address() + self.extents.reserved()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn layout(&self) -> BackupLayout {
        self.layout
    }

    #[must_use]
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Give the memory back, e.g. to hand it to the next boot in a simulation.
    pub fn into_memory(self) -> M {
        self.memory
    }

    /// Slots handed out since the current pass began.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.cursor
    }

    fn area_offset(&self, slot: SlotIndex) -> usize {
        slot.0 * self.layout.slot_size()
    }

    fn memory_offset(&self, slot: SlotIndex) -> usize {
        self.extents.reserved() + self.area_offset(slot)
    }

    fn check_slot(&self, slot: SlotIndex) -> Result<(), BackupError> {
        if slot.0 < self.capacity {
            Ok(())
        } else {
            Err(BackupError::OutOfBounds)
        }
    }

    /// Start a hibernation pass: every slot becomes available again and records
    /// left dirty by an earlier, abandoned pass are retired.
    pub fn begin_pass(&mut self) -> Result<usize, BackupError> {
        self.cursor = 0;
        let mut retired = 0;
        for i in 0..self.capacity {
            let slot = SlotIndex(i);
            if matches!(self.read_record(slot), Ok(ref r) if r.is_dirty()) {
                self.retire(slot)?;
                retired += 1;
            }
        }
        if retired > 0 {
            log::debug!("[BACKUP] Retired {} stale records", retired);
        }
        Ok(retired)
    }

    /// [BA2] Next unused slot of this pass.
    pub fn next_slot(&mut self) -> Result<SlotIndex, BackupError> {
        if self.cursor >= self.capacity {
            return Err(BackupError::Exhausted);
        }
        let slot = SlotIndex(self.cursor);
        self.cursor += 1;
        Ok(slot)
    }

    /// [BA3] Copy `image` and `program` into `slot`, then write `record`.
    ///
    /// The region descriptors and payload checksum of `record` are filled in
    /// here. The record goes last, so a slot only shows the magic once its
    /// payload is in place.
    pub fn write(
        &mut self,
        slot: SlotIndex,
        record: &mut ProcessRecord,
        image: &[u8],
        program: &[u8],
    ) -> Result<(), BackupError> {
        self.check_slot(slot)?;
        if image.len() > self.layout.image_capacity || program.len() > self.layout.program_capacity {
            return Err(BackupError::ImageTooLarge);
        }

        let image_at = self.area_offset(slot) + RECORD_SIZE;
        let program_at = image_at + self.layout.image_capacity;
        record.image = RegionDescriptor {
            at: Some(AreaOffset(image_at as u32)),
            len: image.len() as u32,
        };
        record.program = RegionDescriptor {
            at: Some(AreaOffset(program_at as u32)),
            len: program.len() as u32,
        };
        record.payload_checksum = payload_checksum(image, program);

        let reserved = self.extents.reserved();
        self.memory.write(reserved + image_at, image)?;
        self.memory.write(reserved + program_at, program)?;
        self.memory.write(self.memory_offset(slot), &record.encode())?;

        #[cfg(feature = "verbose-hibernate")]
        log::trace!(
            "[BACKUP] Slot {} <- pid {} at +0x{:x} (image {}B, program {}B)",
            slot,
            record.pid,
            self.area_offset(slot),
            image.len(),
            program.len()
        );
        Ok(())
    }

    /// Decode the record in `slot`.
    pub fn read_record(&self, slot: SlotIndex) -> Result<ProcessRecord, RecordError> {
        if self.check_slot(slot).is_err() {
            return Err(RecordError::RegionOutOfBounds);
        }
        let mut bytes = [0u8; RECORD_SIZE];
        self.memory
            .read(self.memory_offset(slot), &mut bytes)
            .map_err(|_| RecordError::RegionOutOfBounds)?;
        ProcessRecord::decode(&bytes)
    }

    /// [BA4] Copy the image and program of `record` (stored in `slot`) back out.
    pub fn read_payload(
        &self,
        slot: SlotIndex,
        record: &ProcessRecord,
    ) -> Result<(Box<[u8]>, Box<[u8]>), RecordError> {
        let payload_start = self.area_offset(slot) + RECORD_SIZE;
        let payload_end = self.area_offset(slot) + self.layout.slot_size();
        let image = self.read_region(record.image, payload_start, payload_end)?;
        let program = self.read_region(record.program, payload_start, payload_end)?;
        if payload_checksum(&image, &program) != record.payload_checksum {
            return Err(RecordError::PayloadChecksumMismatch);
        }
        Ok((image, program))
    }

    fn read_region(&self, region: RegionDescriptor, start: usize, end: usize) -> Result<Box<[u8]>, RecordError> {
        let len = region.len as usize;
        let Some(at) = region.at else {
            return if len == 0 {
                Ok(Box::default())
            } else {
                Err(RecordError::RegionOutOfBounds)
            };
        };
        let at = at.0 as usize;
        if at < start || at.checked_add(len).is_none_or(|e| e > end) {
            return Err(RecordError::RegionOutOfBounds);
        }
        let mut buf = vec![0u8; len].into_boxed_slice();
        self.memory
            .read(self.extents.reserved() + at, &mut buf)
            .map_err(|_| RecordError::RegionOutOfBounds)?;
        Ok(buf)
    }

    /// Mark `record` (stored in `slot`) as restored into `state`.
    pub fn mark_consumed(
        &mut self,
        slot: SlotIndex,
        record: &ProcessRecord,
        state: ProcessState,
    ) -> Result<(), BackupError> {
        self.check_slot(slot)?;
        let mut consumed = record.clone();
        consumed.flags |= RecordFlags::CONSUMED;
        consumed.state = state;
        self.memory.write(self.memory_offset(slot), &consumed.encode())?;
        self.memory.flush();
        Ok(())
    }

    /// Clear the record magic of `slot`; it reads as free afterwards.
    pub fn retire(&mut self, slot: SlotIndex) -> Result<(), BackupError> {
        self.check_slot(slot)?;
        self.memory.write(self.memory_offset(slot), &[0u8; 4])
    }

    /// Make every write so far durable.
    pub fn flush(&mut self) {
        self.memory.flush();
    }

    /// [BA5] Lazily walk the area for dirty records.
    ///
    /// Free and consumed slots are skipped; slots that carry the magic but fail
    /// validation are yielded as [`RejectedSlot`]. Each call starts over.
    #[must_use]
    pub fn scan_dirty(&self) -> DirtySlots<'_, M> {
        DirtySlots { area: self, next: 0 }
    }
}

/// Iterator returned by [`BackupArea::scan_dirty`].
pub struct DirtySlots<'a, M: BackupMemory> {
    area: &'a BackupArea<M>,
    next: usize,
}

impl<M: BackupMemory> Iterator for DirtySlots<'_, M> {
    type Item = Result<DirtySlot, RejectedSlot>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.area.capacity {
            let slot = SlotIndex(self.next);
            self.next += 1;
            match self.area.read_record(slot) {
                Ok(record) if record.is_dirty() => return Some(Ok(DirtySlot { slot, record })),
                Ok(_) | Err(RecordError::NotARecord) => {}
                Err(error) => return Some(Err(RejectedSlot { slot, error })),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.area.capacity - self.next))
    }
}
