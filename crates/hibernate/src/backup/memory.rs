//! TEAM_430: Access to the non-volatile backup memory domain.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;
use core::sync::atomic::{Ordering, fence};

use volatile::VolatilePtr;

use crate::error::BackupError;

/// Byte-addressable memory that keeps its contents while main memory is off.
pub trait BackupMemory: Send {
    /// Address of the first byte; relative references are resolved against it.
    fn base_address(&self) -> usize;

    /// Size in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), BackupError>;

    /// Copy `data` to `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BackupError>;

    /// Make every previous write durable before returning.
    fn flush(&mut self) {}
}

fn check_range(offset: usize, n: usize, len: usize) -> Result<(), BackupError> {
    match offset.checked_add(n) {
        Some(end) if end <= len => Ok(()),
        _ => Err(BackupError::OutOfBounds),
    }
}

/// Backup SRAM mapped at a fixed physical address.
///
/// Every access is a volatile byte access so the compiler can neither elide nor
/// reorder writes the hardware must see before power is cut.
pub struct SramRegion {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain memory owned exclusively by this handle.
unsafe impl Send for SramRegion {}

impl SramRegion {
    /// # Safety
    ///
    /// `base..base + len` must be mapped, writable backup memory that nothing
    /// else accesses for the lifetime of the returned handle.
    pub unsafe fn new(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    fn byte(&self, offset: usize) -> VolatilePtr<'_, u8> {
        // SAFETY: callers range-check `offset` against `len`, and the
        // constructor contract makes that range valid memory.
        unsafe { VolatilePtr::new(self.base.add(offset)) }
    }
}

impl BackupMemory for SramRegion {
    fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    fn len(&self) -> usize {
        self.len
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), BackupError> {
        check_range(offset, buf.len(), self.len)?;
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.byte(offset + i).read();
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BackupError> {
        check_range(offset, data.len(), self.len)?;
        for (i, &b) in data.iter().enumerate() {
            self.byte(offset + i).write(b);
        }
        Ok(())
    }

    fn flush(&mut self) {
        fence(Ordering::SeqCst);
    }
}

/// Backup memory simulated in a heap buffer.
///
/// Used by simulators and host tests; moving the buffer from one
/// `BackupArea` into a fresh one models a power cycle.
#[derive(Debug, Clone)]
pub struct RamBackup {
    base: usize,
    bytes: Vec<u8>,
    flushes: usize,
}

impl RamBackup {
    /// Zero-filled memory that pretends to live at `base`.
    #[must_use]
    pub fn new(base: usize, len: usize) -> Self {
        Self {
            base,
            bytes: vec![0; len],
            flushes: 0,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw access, e.g. to model bit rot across an outage.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Number of `flush` calls so far.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl BackupMemory for RamBackup {
    fn base_address(&self) -> usize {
        self.base
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), BackupError> {
        check_range(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BackupError> {
        check_range(offset, data.len(), self.bytes.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }
}
