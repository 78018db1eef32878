//! TEAM_430: Serialized process records.
//!
//! A record is a fixed-size, unpadded, native-endian byte image of one process.
//! The layout is defined here field by field instead of relying on a
//! `#[repr(packed)]` struct, so the on-media format stays put even if the
//! in-memory types change.
//!
//! ```text
//! header   magic u32 | version u16 | flags u16 | checksum u32
//!          payload_checksum u32 | serialized_at i64
//! process  pid i32 | parent i32 | status i16 | threads u16 | exit_code i32
//!          image_ref u32 | image_size i32 | program_ref u32 | program_size i32
//!          fds [i32; MAX_OPEN_FILES]
//!          points [point; INTERRUPTION_SLOTS]
//! point    call u32 | file i32 | deadline i64 | queue_ref u32 | queue_size i32
//!          wake_now u8 | sample_size u8 | sample_count i32
//!          registers [u32; CTXSAVE_SIZE] | target_ref u32
//! ```
//!
//! `checksum` is FNV-1a over every byte of the record except itself.

use bitflags::bitflags;

use crate::config::{
    CTXSAVE_SIZE, INTERRUPTION_SLOTS, MAX_OPEN_FILES, MAX_THREADS_PER_PROCESS, RECORD_MAGIC,
    RECORD_VERSION,
};
use crate::error::RecordError;
use crate::registry::{InterruptionPoint, InterruptionTable};
use crate::types::{
    AreaOffset, FileId, ImageOffset, Pid, ProcessState, QueueRef, SampleProgress, SavedContext,
    SramOffset, SyscallId, Ticks, WakeMode,
};

bitflags! {
    /// Record-level flags stored in the header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RecordFlags: u16 {
        /// Resume has restored this record; it is no longer dirty.
        const CONSUMED = 1 << 0;
        /// At least one parked call has samples in a backup queue.
        const SAMPLES_PENDING = 1 << 1;
    }
}

/// Bytes of the record header.
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 4 + 4 + 8;

/// Bytes of one serialized interruption point.
pub const POINT_SIZE: usize = 4 + 4 + 8 + 4 + 4 + 1 + 1 + 4 + 4 * CTXSAVE_SIZE + 4;

/// Bytes of the process part, interruption points included.
pub const PROCESS_SIZE: usize =
    4 + 4 + 2 + 2 + 4 + 4 + 4 + 4 + 4 + 4 * MAX_OPEN_FILES + POINT_SIZE * INTERRUPTION_SLOTS;

/// Bytes of one complete record.
pub const RECORD_SIZE: usize = HEADER_SIZE + PROCESS_SIZE;

const CHECKSUM_AT: usize = 8;
const NO_PARENT: i32 = -1;
const NO_FILE: i32 = -1;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a, continuing from `seed`.
#[must_use]
pub fn fnv1a(seed: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(seed, |h, &b| (h ^ u32::from(b)).wrapping_mul(FNV_PRIME))
}

/// Checksum over the copied image and program bytes.
#[must_use]
pub fn payload_checksum(image: &[u8], program: &[u8]) -> u32 {
    fnv1a(fnv1a(FNV_OFFSET, image), program)
}

fn record_checksum(bytes: &[u8; RECORD_SIZE]) -> u32 {
    let h = fnv1a(FNV_OFFSET, &bytes[..CHECKSUM_AT]);
    fnv1a(h, &bytes[CHECKSUM_AT + 4..])
}

/// Location of a copied memory region inside the backup state area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionDescriptor {
    pub at: Option<AreaOffset>,
    pub len: u32,
}

/// One serialized process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub flags: RecordFlags,
    pub payload_checksum: u32,
    pub serialized_at: Ticks,
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: ProcessState,
    pub thread_count: u16,
    pub exit_code: i32,
    pub image: RegionDescriptor,
    pub program: RegionDescriptor,
    pub files: [Option<FileId>; MAX_OPEN_FILES],
    pub points: InterruptionTable,
}

impl ProcessRecord {
    /// Still waiting to be restored.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state == ProcessState::Serialized && !self.flags.contains(RecordFlags::CONSUMED)
    }

    /// [REC1] Encode into the fixed on-media layout.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        let mut w = Writer::new(&mut out);

        w.u32(RECORD_MAGIC);
        w.u16(RECORD_VERSION);
        w.u16(self.flags.bits());
        w.u32(0); // checksum, patched below
        w.u32(self.payload_checksum);
        w.i64(self.serialized_at.0);

        w.i32(signed(self.pid.0));
        w.i32(self.parent.map_or(NO_PARENT, |p| signed(p.0)));
        w.i16(self.state.to_raw());
        w.u16(self.thread_count);
        w.i32(self.exit_code);
        w.u32(AreaOffset::encode(self.image.at));
        w.i32(signed(self.image.len));
        w.u32(AreaOffset::encode(self.program.at));
        w.i32(signed(self.program.len));
        for fd in &self.files {
            w.i32(fd.map_or(NO_FILE, |f| i32::from(f.0)));
        }
        for slot in self.points.slots() {
            match slot {
                Some(point) => encode_point(&mut w, point),
                None => w.zeroes(POINT_SIZE),
            }
        }
        debug_assert_eq!(w.pos, RECORD_SIZE);

        let sum = record_checksum(&out);
        out[CHECKSUM_AT..CHECKSUM_AT + 4].copy_from_slice(&sum.to_ne_bytes());
        out
    }

    /// [REC2] Decode and validate a record.
    ///
    /// `NotARecord` means the slot is simply free; every other error is an
    /// integrity failure of a slot that was once written.
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Result<Self, RecordError> {
        let mut r = Reader::new(bytes);

        if r.u32() != RECORD_MAGIC {
            return Err(RecordError::NotARecord);
        }
        if r.u16() != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion);
        }
        let flags = RecordFlags::from_bits_truncate(r.u16());
        if r.u32() != record_checksum(bytes) {
            return Err(RecordError::ChecksumMismatch);
        }
        let payload_checksum = r.u32();
        let serialized_at = Ticks(r.i64());

        let pid = non_negative(r.i32())?;
        let parent = match r.i32() {
            NO_PARENT => None,
            raw => Some(Pid(non_negative(raw)?)),
        };
        let state = ProcessState::from_raw(r.i16()).ok_or(RecordError::InvalidState)?;
        let thread_count = r.u16();
        if usize::from(thread_count) > MAX_THREADS_PER_PROCESS {
            return Err(RecordError::TooManyThreads);
        }
        let exit_code = r.i32();
        let image = RegionDescriptor {
            at: AreaOffset::decode(r.u32()),
            len: non_negative(r.i32())?,
        };
        let program = RegionDescriptor {
            at: AreaOffset::decode(r.u32()),
            len: non_negative(r.i32())?,
        };

        let mut files = [None; MAX_OPEN_FILES];
        for fd in &mut files {
            *fd = match r.i32() {
                NO_FILE => None,
                raw => Some(FileId(u16::try_from(raw).map_err(|_| RecordError::MalformedField)?)),
            };
        }

        let mut slots = [None; INTERRUPTION_SLOTS];
        for slot in &mut slots {
            *slot = decode_point(&mut r)?;
        }
        let points = InterruptionTable::from_slots(slots);
        if !points.covers_threads(usize::from(thread_count)) {
            return Err(RecordError::ThreadSlotMismatch);
        }

        Ok(Self {
            flags,
            payload_checksum,
            serialized_at,
            pid: Pid(pid),
            parent,
            state,
            thread_count,
            exit_code,
            image,
            program,
            files,
            points,
        })
    }
}

/// Counts and ids are stored as signed 32-bit fields. Callers range-check
/// them on entry, so saturation never triggers for a registered process.
fn signed(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn non_negative(raw: i32) -> Result<u32, RecordError> {
    u32::try_from(raw).map_err(|_| RecordError::MalformedField)
}

fn encode_point(w: &mut Writer<'_>, p: &InterruptionPoint) {
    w.u32(p.call.get());
    w.i32(p.file.map_or(NO_FILE, |f| i32::from(f.0)));
    w.i64(p.deadline.0);
    w.u32(SramOffset::encode(p.backup_queue.map(|q| q.at)));
    w.i32(p.backup_queue.map_or(0, |q| signed(q.len)));
    w.u8(u8::from(p.wake == WakeMode::Now));
    w.u8(p.sample.size);
    w.i32(signed(p.sample.count));
    w.bytes(bytemuck::cast_slice::<u32, u8>(&p.registers.0[..]));
    w.u32(ImageOffset::encode(p.target));
}

fn decode_point(r: &mut Reader<'_>) -> Result<Option<InterruptionPoint>, RecordError> {
    let Some(call) = SyscallId::new(r.u32()) else {
        r.skip(POINT_SIZE - 4);
        return Ok(None);
    };
    let file = match r.i32() {
        NO_FILE => None,
        raw => Some(FileId(u16::try_from(raw).map_err(|_| RecordError::MalformedField)?)),
    };
    let deadline = Ticks(r.i64());
    let queue_at = SramOffset::decode(r.u32());
    let queue_len = non_negative(r.i32())?;
    let wake = match r.u8() {
        0 => WakeMode::AtDeadline,
        1 => WakeMode::Now,
        _ => return Err(RecordError::MalformedField),
    };
    let sample = SampleProgress {
        size: r.u8(),
        count: non_negative(r.i32())?,
    };
    let mut registers = SavedContext::default();
    bytemuck::cast_slice_mut::<u32, u8>(&mut registers.0[..]).copy_from_slice(r.take(4 * CTXSAVE_SIZE));
    let target = ImageOffset::decode(r.u32());

    Ok(Some(InterruptionPoint {
        call,
        file,
        deadline,
        backup_queue: queue_at.map(|at| QueueRef { at, len: queue_len }),
        wake,
        sample,
        registers,
        target,
    }))
}

/// Cursor writing native-endian fields into a record buffer.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn zeroes(&mut self, n: usize) {
        self.buf[self.pos..self.pos + n].fill(0);
        self.pos += n;
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_ne_bytes());
    }

    fn i16(&mut self, v: i16) {
        self.bytes(&v.to_ne_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_ne_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_ne_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.bytes(&v.to_ne_bytes());
    }
}

/// Cursor reading native-endian fields out of a record buffer.
///
/// Only used on `[u8; RECORD_SIZE]`, whose length the layout constants match.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        s
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut a = [0u8; N];
        a.copy_from_slice(self.take(N));
        a
    }

    fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_ne_bytes(self.array())
    }

    fn i16(&mut self) -> i16 {
        i16::from_ne_bytes(self.array())
    }

    fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.array())
    }

    fn i32(&mut self) -> i32 {
        i32::from_ne_bytes(self.array())
    }

    fn i64(&mut self) -> i64 {
        i64::from_ne_bytes(self.array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BlockingCall;
    use crate::types::ThreadIndex;

    fn sample_record() -> ProcessRecord {
        let mut points = InterruptionTable::new();
        let mut regs = SavedContext::default();
        for (i, r) in regs.0.iter_mut().enumerate() {
            *r = 0xA000_0000 | i as u32;
        }
        let call = BlockingCall::new(SyscallId::new(7).unwrap(), Ticks(12_345))
            .on_file(FileId(3))
            .with_registers(regs)
            .sampling(
                QueueRef {
                    at: SramOffset(0x80),
                    len: 32,
                },
                4,
                ImageOffset(0x200),
            );
        let mut p = InterruptionPoint::enter(&call);
        p.sample.count = 9;
        points.park(ThreadIndex(0), p).unwrap();
        let mut sup = InterruptionPoint::enter(&BlockingCall::new(SyscallId::new(2).unwrap(), Ticks(-5)));
        sup.wake = WakeMode::Now;
        points.park(ThreadIndex::SUPERVISOR, sup).unwrap();

        let mut files = [None; MAX_OPEN_FILES];
        files[0] = Some(FileId(0));
        files[3] = Some(FileId(3));

        ProcessRecord {
            flags: RecordFlags::SAMPLES_PENDING,
            payload_checksum: 0xDEAD_BEEF,
            serialized_at: Ticks(10_000),
            pid: Pid(42),
            parent: None,
            state: ProcessState::Serialized,
            thread_count: 1,
            exit_code: 0,
            image: RegionDescriptor {
                at: Some(AreaOffset(RECORD_SIZE as u32)),
                len: 64,
            },
            program: RegionDescriptor {
                at: Some(AreaOffset(RECORD_SIZE as u32 + 128)),
                len: 16,
            },
            files,
            points,
        }
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(HEADER_SIZE, 24);
        assert_eq!(POINT_SIZE, 30 + 4 * CTXSAVE_SIZE + 4);
        assert_eq!(RECORD_SIZE, HEADER_SIZE + PROCESS_SIZE);
    }

    /// Tests: [REC1] encode, [REC2] decode of a populated record
    #[test]
    fn test_encode_decode_preserves_fields() {
        let rec = sample_record();
        let bytes = rec.encode();
        assert_eq!(ProcessRecord::decode(&bytes), Ok(rec));
    }

    #[test]
    fn test_field_order_is_native_endian_and_unpadded() {
        let bytes = sample_record().encode();
        assert_eq!(&bytes[0..4], &RECORD_MAGIC.to_ne_bytes());
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 4], &42i32.to_ne_bytes());
        assert_eq!(&bytes[HEADER_SIZE + 4..HEADER_SIZE + 8], &(-1i32).to_ne_bytes());
        // First interruption point's call id follows the fd table.
        let points_at = HEADER_SIZE + 32 + 4 * MAX_OPEN_FILES;
        assert_eq!(&bytes[points_at..points_at + 4], &7i32.to_ne_bytes());
    }

    /// Tests: [REC1] [REC2] largest accepted pid and sample count survive
    #[test]
    fn test_signed_fields_at_range_limit() {
        let mut rec = sample_record();
        rec.pid = Pid::MAX;
        rec.parent = Some(Pid::MAX);
        let point = rec.points.get_mut(ThreadIndex(0)).unwrap();
        point.sample.count = SampleProgress::MAX_COUNT;
        point.backup_queue = Some(QueueRef {
            at: SramOffset(0x80),
            len: QueueRef::MAX_LEN,
        });
        assert_eq!(ProcessRecord::decode(&rec.encode()), Ok(rec));
    }

    #[test]
    fn test_blank_slot_is_not_a_record() {
        let bytes = [0u8; RECORD_SIZE];
        assert_eq!(ProcessRecord::decode(&bytes), Err(RecordError::NotARecord));
    }

    #[test]
    fn test_bit_flip_fails_checksum() {
        let mut bytes = sample_record().encode();
        bytes[HEADER_SIZE + 40] ^= 0x01;
        assert_eq!(
            ProcessRecord::decode(&bytes),
            Err(RecordError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_rejects_future_version() {
        let mut bytes = sample_record().encode();
        bytes[4..6].copy_from_slice(&(RECORD_VERSION + 1).to_ne_bytes());
        assert_eq!(
            ProcessRecord::decode(&bytes),
            Err(RecordError::UnsupportedVersion)
        );
    }

    #[test]
    fn test_rejects_thread_count_over_max() {
        let mut rec = sample_record();
        rec.thread_count = MAX_THREADS_PER_PROCESS as u16 + 1;
        assert_eq!(
            ProcessRecord::decode(&rec.encode()),
            Err(RecordError::TooManyThreads)
        );
    }

    #[test]
    fn test_rejects_slot_count_mismatch() {
        let mut rec = sample_record();
        rec.thread_count = 2;
        assert_eq!(
            ProcessRecord::decode(&rec.encode()),
            Err(RecordError::ThreadSlotMismatch)
        );
    }

    #[test]
    fn test_dirty_flag() {
        let mut rec = sample_record();
        assert!(rec.is_dirty());
        rec.flags |= RecordFlags::CONSUMED;
        assert!(!rec.is_dirty());
        rec.flags = RecordFlags::empty();
        rec.state = ProcessState::Running;
        assert!(!rec.is_dirty());
    }
}
