//! The shared-memory ring transport (C1): a single-producer
//! (untrusted guest) / single-consumer (trusted host) byte queue with
//! acquire/release synchronized cursors and no data-region locking.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::error::CoreError;
use venus_protocol::MAX_FRAME_SIZE;

/// Inline capacity of a frame's payload buffer before it spills to the
/// heap. Comfortably covers every `wire` struct this core decodes
/// (the largest is well under this), so the hot path never allocates.
const PAYLOAD_INLINE_CAPACITY: usize = 64;

const HEAD_OFFSET: usize = 0;
const TAIL_OFFSET: usize = 4;
const STATUS_OFFSET: usize = 8;
/// +12 is a reserved padding word; the layout keeps it to align the
/// command buffer to a 16-byte boundary.
const HEADER_REGION_SIZE: usize = 16;

const STATUS_IDLE: u32 = 0;
const STATUS_RUNNING: u32 = 1;
const STATUS_ERROR: u32 = 2;

/// How the host drains the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingMode {
    /// A dedicated consumer thread owns the wait/notify loop.
    Threaded,
    /// An outer scheduler calls [`Ring::decode_all_with`] (via
    /// `venus_core::decoder`) whenever the virtio-gpu notification
    /// fires; no thread is spawned.
    Polled,
}

/// Describes the shared-memory region backing a [`Ring`], as supplied
/// by the caller (the hypervisor's virtio-gpu device model) at
/// construction.
///
/// # Safety
/// `base` must point to at least `total_size` bytes of memory that
/// stays mapped and valid for as long as the `Ring` built from this
/// layout exists, and that memory must be shared (or otherwise
/// coherent) with the guest's view of the same region.
#[derive(Clone, Copy)]
pub struct SharedMemoryLayout {
    pub base: *mut u8,
    pub total_size: usize,
    /// `N`: size of the cyclic command buffer sub-region, must be a
    /// non-zero power of two.
    pub buffer_size: u32,
    /// `M`: size of the optional extra (reply-scratch) sub-region; 0
    /// if the guest didn't provide one.
    pub extra_size: u32,
}

// SAFETY: the pointer is only ever dereferenced through the atomic
// and bounds-checked accessors below, which are safe to call from any
// thread — that's the whole point of a shared-memory ring.
unsafe impl Send for SharedMemoryLayout {}
unsafe impl Sync for SharedMemoryLayout {}

impl SharedMemoryLayout {
    fn validate(&self) -> Result<(), CoreError> {
        if self.buffer_size == 0 || !self.buffer_size.is_power_of_two() {
            return Err(CoreError::InvalidLayout(format!(
                "buffer_size {} is not a non-zero power of two",
                self.buffer_size
            )));
        }
        let required = HEADER_REGION_SIZE
            + self.buffer_size as usize
            + self.extra_size as usize;
        if self.total_size < required {
            return Err(CoreError::InvalidLayout(format!(
                "total_size {} too small for header ({HEADER_REGION_SIZE}) + buffer ({}) + extra ({})",
                self.total_size, self.buffer_size, self.extra_size
            )));
        }
        if self.base.is_null() {
            return Err(CoreError::InvalidLayout("base pointer is null".into()));
        }
        Ok(())
    }

    unsafe fn atomic_u32_at(&self, offset: usize) -> &AtomicU32 {
        AtomicU32::from_ptr(self.base.add(offset) as *mut u32)
    }

    unsafe fn buffer_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(
            self.base.add(HEADER_REGION_SIZE),
            self.buffer_size as usize,
        )
    }

    unsafe fn extra_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(
            self.base.add(HEADER_REGION_SIZE + self.buffer_size as usize),
            self.extra_size as usize,
        )
    }
}

/// Point-in-time snapshot of a ring's activity counters, supplementing
/// the handler-level counters in `HandlerContext` with transport-level
/// ones the original tracked in `pv_venus_ring_stats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RingStats {
    pub frames_consumed: u64,
    pub bytes_read: u64,
    pub header_errors: u64,
    pub waits: u64,
}

#[derive(Default)]
struct StatsInner {
    frames_consumed: AtomicU64,
    bytes_read: AtomicU64,
    header_errors: AtomicU64,
    waits: AtomicU64,
}

impl StatsInner {
    fn snapshot(&self) -> RingStats {
        RingStats {
            frames_consumed: self.frames_consumed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            header_errors: self.header_errors.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }
}

/// The host-side handle to a shared-memory ring.
///
/// `read_cursor` is a plain `AtomicU32` rather than data behind the
/// wait/notify mutex: dispatch is single-threaded per ring (either the
/// one consumer thread in [`RingMode::Threaded`], or whichever thread
/// calls `decode_all` in [`RingMode::Polled`]), so there is never
/// concurrent access to it — `Relaxed` ordering is enough since it's
/// host-private and never observed by the guest.
pub struct Ring {
    layout: SharedMemoryLayout,
    mode: RingMode,
    read_cursor: AtomicU32,
    last_published_head: AtomicU32,
    stats: StatsInner,
    running: AtomicBool,
    wait_lock: Mutex<()>,
    wait_condvar: Condvar,
}

impl Ring {
    /// Validates `layout`, pins it, and initializes `head` and
    /// `status` to 0 / idle. Fails with [`CoreError::InvalidLayout`]
    /// if the sub-regions don't fit.
    pub fn new(layout: SharedMemoryLayout, mode: RingMode) -> Result<Arc<Self>, CoreError> {
        layout.validate()?;
        let ring = Arc::new(Self {
            layout,
            mode,
            read_cursor: AtomicU32::new(0),
            last_published_head: AtomicU32::new(0),
            stats: StatsInner::default(),
            running: AtomicBool::new(false),
            wait_lock: Mutex::new(()),
            wait_condvar: Condvar::new(),
        });
        unsafe {
            ring.layout.atomic_u32_at(HEAD_OFFSET).store(0, Ordering::Release);
            ring.layout
                .atomic_u32_at(STATUS_OFFSET)
                .store(STATUS_IDLE, Ordering::Release);
        }
        Ok(ring)
    }

    pub fn mode(&self) -> RingMode {
        self.mode
    }

    pub fn capacity(&self) -> u32 {
        self.layout.buffer_size
    }

    fn tail(&self) -> u32 {
        unsafe { self.layout.atomic_u32_at(TAIL_OFFSET).load(Ordering::Acquire) }
    }

    /// `(tail − read_cursor) mod 2^32`.
    ///
    /// No masking against the buffer size here: the 32-bit cursor
    /// domain is only ever allowed to differ by at most `N` (the
    /// ring's core invariant), so the wrapping difference is already
    /// the exact byte count available — masking would make `N` bytes
    /// available indistinguishable from 0.
    pub fn available(&self) -> u32 {
        let tail = self.tail();
        let read_cursor = self.read_cursor.load(Ordering::Relaxed);
        tail.wrapping_sub(read_cursor)
    }

    /// Fill fraction of the ring, 0.0 (empty) to 1.0 (full).
    pub fn utilization(&self) -> f32 {
        self.available() as f32 / self.layout.buffer_size as f32
    }

    pub fn stats(&self) -> RingStats {
        self.stats.snapshot()
    }

    /// Copies `dest.len()` bytes starting `rel_offset` bytes past the
    /// current read cursor, wrapping at the buffer boundary. Does not
    /// advance the cursor — call [`Ring::advance`] once the caller has
    /// decided the frame is worth consuming.
    fn peek(&self, rel_offset: u32, dest: &mut [u8]) -> Result<(), CoreError> {
        let n = self.layout.buffer_size;
        let mask = n - 1;
        let start = self.read_cursor.load(Ordering::Relaxed).wrapping_add(rel_offset) & mask;
        let buffer = unsafe { self.layout.buffer_slice() };

        let len = dest.len();
        let first = (n - start).min(len as u32) as usize;
        dest[..first].copy_from_slice(&buffer[start as usize..start as usize + first]);
        if first < len {
            let remaining = len - first;
            dest[first..].copy_from_slice(&buffer[..remaining]);
        }
        Ok(())
    }

    /// Advances the read cursor by `n` bytes (mod 2^32) and records
    /// the bytes as consumed in the stats. Does not publish to the
    /// shared head word; call [`Ring::publish_head`] for that.
    fn advance(&self, n: u32) {
        self.read_cursor.fetch_add(n, Ordering::Relaxed);
        self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Releases the current read cursor to the shared head word, if
    /// it differs from what was last published. Per the decoder's
    /// single-read-cursor design, this is called once per decoded
    /// frame and once more at the end of a `DecodeAll` batch as a
    /// safety net.
    pub fn publish_head_if_dirty(&self) {
        let current = self.read_cursor.load(Ordering::Relaxed);
        let last = self.last_published_head.swap(current, Ordering::Relaxed);
        if last != current {
            unsafe {
                self.layout
                    .atomic_u32_at(HEAD_OFFSET)
                    .store(current, Ordering::Release);
            }
        }
    }

    /// Bounds-checked borrow into the extra region, for zero-copy
    /// reads/writes of large reply structures. `None` if
    /// `offset + size` overflows or exceeds the extra region.
    pub fn extra_get(&self, offset: u32, size: u32) -> Option<&[u8]> {
        let end = offset.checked_add(size)?;
        if end > self.layout.extra_size {
            return None;
        }
        let extra = unsafe { self.layout.extra_slice() };
        Some(&extra[offset as usize..end as usize])
    }

    /// Mutable counterpart of [`Ring::extra_get`], used by handlers to
    /// write reply structures at the offset the guest supplied.
    pub fn extra_get_mut(&self, offset: u32, size: u32) -> Option<&mut [u8]> {
        let end = offset.checked_add(size)?;
        if end > self.layout.extra_size {
            return None;
        }
        unsafe {
            let ptr = self
                .layout
                .base
                .add(HEADER_REGION_SIZE + self.layout.buffer_size as usize + offset as usize);
            Some(std::slice::from_raw_parts_mut(ptr, size as usize))
        }
    }

    /// Sets the ring's status word to *error*, transitioning it to a
    /// quiescent state; further frames are ignored until `Stop`.
    pub fn mark_error(&self) {
        unsafe {
            self.layout
                .atomic_u32_at(STATUS_OFFSET)
                .store(STATUS_ERROR, Ordering::Release);
        }
    }

    /// Wakes a consumer blocked in [`Ring::wait_for_data`].
    pub fn notify(&self) {
        let _guard = self.wait_lock.lock();
        self.wait_condvar.notify_one();
    }

    /// Blocks (with a 1-second timeout) until data is available or
    /// the ring is stopped. Only meaningful in [`RingMode::Threaded`].
    fn wait_for_data(&self) {
        let mut guard = self.wait_lock.lock();
        if self.available() > 0 || !self.running.load(Ordering::Acquire) {
            return;
        }
        self.stats.waits.fetch_add(1, Ordering::Relaxed);
        self.wait_condvar.wait_for(&mut guard, Duration::from_secs(1));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Decodes and reads exactly one frame header + payload at the
    /// current read cursor, per the validation rules in
    /// `venus_core::decoder`. Internal to this crate: `decoder.rs` is
    /// the only caller.
    pub(crate) fn try_take_frame(&self) -> FrameAttempt {
        let available = self.available();
        if available < venus_protocol::MIN_FRAME_SIZE {
            return FrameAttempt::NoData;
        }

        let mut header_bytes = [0u8; 8];
        self.peek(0, &mut header_bytes).expect("header fits within available bytes");
        let header = venus_protocol::CommandHeader::decode(&header_bytes)
            .expect("fixed 8-byte header always decodes");

        // A declared size larger than the ring's own capacity can never
        // be satisfied no matter how much more the guest writes: that's
        // unrecoverable corruption, not a "wait for more data" case.
        if header.command_size > self.layout.buffer_size {
            self.stats.header_errors.fetch_add(1, Ordering::Relaxed);
            self.mark_error();
            return FrameAttempt::NoData;
        }

        let structurally_invalid = header.command_size < venus_protocol::MIN_FRAME_SIZE
            || header.command_size > MAX_FRAME_SIZE
            || header.command_id >= venus_protocol::MAX_COMMAND_ID;

        if structurally_invalid {
            // Always skip exactly the header we just read, never the
            // guest-declared `command_size`: that value is part of what
            // just failed validation, and a guest sending e.g. 0 would
            // otherwise leave the cursor stuck replaying the same bad
            // header forever. `available >= MIN_FRAME_SIZE` already
            // holds from the check at the top of this function.
            self.advance(venus_protocol::MIN_FRAME_SIZE);
            self.stats.header_errors.fetch_add(1, Ordering::Relaxed);
            return FrameAttempt::InvalidHeader;
        }

        if available < header.command_size {
            // Not enough bytes yet for the declared (well-formed) size;
            // the guest hasn't finished its write. Wait for more data
            // rather than treating this as corruption.
            return FrameAttempt::NoData;
        }

        let payload_len = (header.command_size - 8) as usize;
        let mut payload: SmallVec<[u8; PAYLOAD_INLINE_CAPACITY]> = SmallVec::from_elem(0u8, payload_len);
        self.peek(8, &mut payload).expect("payload fits within available bytes");
        self.advance(header.command_size);
        self.stats.frames_consumed.fetch_add(1, Ordering::Relaxed);

        FrameAttempt::Frame { header, payload }
    }

    /// Starts the dedicated consumer thread in [`RingMode::Threaded`].
    /// No-op in [`RingMode::Polled`].
    pub fn start<Ctx>(
        self: &Arc<Self>,
        dispatch: Arc<crate::decoder::DispatchContext<Ctx>>,
        ctx: Arc<Mutex<Ctx>>,
    ) -> Option<std::thread::JoinHandle<()>>
    where
        Ctx: Send + 'static,
    {
        if self.mode != RingMode::Threaded {
            return None;
        }
        unsafe {
            self.layout
                .atomic_u32_at(STATUS_OFFSET)
                .store(STATUS_RUNNING, Ordering::Release);
        }
        self.running.store(true, Ordering::Release);
        let ring = Arc::clone(self);
        Some(std::thread::spawn(move || {
            while ring.running.load(Ordering::Acquire) {
                if ring.available() == 0 {
                    ring.wait_for_data();
                    continue;
                }
                let mut guard = ctx.lock();
                crate::decoder::decode_all(&ring, &dispatch, &mut guard);
            }
        }))
    }

    /// Idempotent. Signals the consumer thread to exit at the next
    /// wait-wake boundary; the caller should join the handle returned
    /// by [`Ring::start`] afterwards.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        unsafe {
            self.layout
                .atomic_u32_at(STATUS_OFFSET)
                .store(STATUS_IDLE, Ordering::Release);
        }
        self.notify();
    }
}

/// Outcome of attempting to take one frame off the ring.
pub(crate) enum FrameAttempt {
    /// Not enough bytes available yet; caller should stop and wait.
    NoData,
    /// The header was structurally invalid; the declared size was
    /// skipped (never dispatched).
    InvalidHeader,
    /// A well-formed frame, ready to dispatch.
    Frame {
        header: venus_protocol::CommandHeader,
        payload: SmallVec<[u8; PAYLOAD_INLINE_CAPACITY]>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_layout(buffer_size: u32, extra_size: u32) -> (Vec<u8>, SharedMemoryLayout) {
        let total = 16 + buffer_size as usize + extra_size as usize;
        let mut mem = vec![0u8; total];
        let layout = SharedMemoryLayout {
            base: mem.as_mut_ptr(),
            total_size: total,
            buffer_size,
            extra_size,
        };
        (mem, layout)
    }

    #[test]
    fn rejects_non_power_of_two_buffer() {
        let (_mem, layout) = make_layout(100, 0);
        assert!(Ring::new(layout, RingMode::Polled).is_err());
    }

    #[test]
    fn rejects_layout_too_small() {
        let (mut mem, _unused) = make_layout(64, 0);
        let layout = SharedMemoryLayout {
            base: mem.as_mut_ptr(),
            total_size: 10,
            buffer_size: 64,
            extra_size: 0,
        };
        assert!(Ring::new(layout, RingMode::Polled).is_err());
    }

    #[test]
    fn available_tracks_published_tail() {
        let (_mem, layout) = make_layout(64, 0);
        let ring = Ring::new(layout, RingMode::Polled).unwrap();
        assert_eq!(ring.available(), 0);
        unsafe {
            layout.atomic_u32_at(TAIL_OFFSET).store(10, Ordering::Release);
        }
        assert_eq!(ring.available(), 10);
    }

    #[test]
    fn zero_declared_size_header_always_advances() {
        let (mut mem, layout) = make_layout(128, 0);
        let ring = Ring::new(layout, RingMode::Polled).unwrap();
        let header = venus_protocol::CommandHeader {
            command_id: 0,
            command_size: 0,
        };
        mem[16..24].copy_from_slice(&header.encode());
        unsafe {
            layout.atomic_u32_at(TAIL_OFFSET).store(8, Ordering::Release);
        }

        assert!(matches!(ring.try_take_frame(), FrameAttempt::InvalidHeader));
        // The cursor must have moved past the bad header, or a second
        // call would see the exact same bytes and loop forever.
        assert_eq!(ring.available(), 0);
        assert!(matches!(ring.try_take_frame(), FrameAttempt::NoData));
    }

    #[test]
    fn command_size_larger_than_ring_marks_error() {
        let (mut mem, layout) = make_layout(64, 0);
        let ring = Ring::new(layout, RingMode::Polled).unwrap();
        let header = venus_protocol::CommandHeader {
            command_id: 0,
            command_size: 4096,
        };
        mem[16..24].copy_from_slice(&header.encode());
        unsafe {
            layout.atomic_u32_at(TAIL_OFFSET).store(8, Ordering::Release);
        }

        assert!(matches!(ring.try_take_frame(), FrameAttempt::NoData));
        assert_eq!(ring.stats().header_errors, 1);
        let status = unsafe { layout.atomic_u32_at(STATUS_OFFSET).load(Ordering::Acquire) };
        assert_eq!(status, STATUS_ERROR);
    }

    #[test]
    fn extra_get_bounds_checks() {
        let (_mem, layout) = make_layout(64, 16);
        let ring = Ring::new(layout, RingMode::Polled).unwrap();
        assert!(ring.extra_get(0, 16).is_some());
        assert!(ring.extra_get(8, 16).is_none());
        assert!(ring.extra_get(u32::MAX, 1).is_none());
    }
}
