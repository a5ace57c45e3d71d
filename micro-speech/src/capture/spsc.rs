//! Lock-free single-producer single-consumer (SPSC) byte ring.
//!
//! Backing store of the capture buffer. Indices are atomics; bytes are moved
//! in at most two contiguous copies per call.
//!
//! # Safety Contract
//!
//! - Only ONE thread may call [`push_slice()`](ByteRing::push_slice) (the "producer").
//! - Only ONE thread may call [`pop_slice()`](ByteRing::pop_slice) (the "consumer").
//!
//! [`CaptureWriter`](super::CaptureWriter) and
//! [`CaptureReader`](super::CaptureReader) uphold this by construction.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free single-producer single-consumer byte queue.
///
/// The usable capacity is `slots - 1` (one slot is reserved for full/empty
/// disambiguation via the Lamport queue algorithm).
pub struct ByteRing {
    buffer: Box<[UnsafeCell<u8>]>,
    /// Write position (only modified by the producer).
    head: AtomicUsize,
    /// Read position (only modified by the consumer).
    tail: AtomicUsize,
}

// SAFETY: The SPSC contract ensures that head and tail are only modified by
// their respective sides, the producer only writes bytes in the free region
// and the consumer only reads bytes in the filled region. Release/Acquire
// on the indices publishes the byte writes.
unsafe impl Sync for ByteRing {}
unsafe impl Send for ByteRing {}

impl ByteRing {
    /// Allocate a ring holding up to `capacity` bytes.
    ///
    /// Returns `None` if the backing storage cannot be allocated.
    pub fn try_with_capacity(capacity: usize) -> Option<Self> {
        let slots = capacity.checked_add(1)?;
        let mut storage: Vec<UnsafeCell<u8>> = Vec::new();
        storage.try_reserve_exact(slots).ok()?;
        storage.resize_with(slots, || UnsafeCell::new(0));

        Some(ByteRing {
            buffer: storage.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        })
    }

    /// Maximum number of bytes the ring can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    #[inline]
    fn slots(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        // `UnsafeCell<u8>` has the same layout as `u8`.
        UnsafeCell::raw_get(self.buffer.as_ptr())
    }

    /// Copy as much of `data` as fits (producer side).
    ///
    /// Returns the number of bytes enqueued; the rest is left to the caller.
    pub fn push_slice(&self, data: &[u8]) -> usize {
        let n = self.slots();
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let free = (tail + n - head - 1) % n;
        let count = data.len().min(free);
        if count == 0 {
            return 0;
        }

        let first = count.min(n - head);
        // SAFETY: We are the sole producer. `count <= free` guarantees that
        // `[head, head + count)` (mod n) is not visible to the consumer, and
        // both segments stay inside the `n`-slot allocation.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(head), first);
            core::ptr::copy_nonoverlapping(data.as_ptr().add(first), self.base(), count - first);
        }

        // Release ordering makes the byte writes visible before head advances.
        self.head.store((head + count) % n, Ordering::Release);
        count
    }

    /// Copy up to `out.len()` bytes out of the ring (consumer side).
    ///
    /// Returns the number of bytes dequeued.
    pub fn pop_slice(&self, out: &mut [u8]) -> usize {
        let n = self.slots();
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        let filled = (head + n - tail) % n;
        let count = out.len().min(filled);
        if count == 0 {
            return 0;
        }

        let first = count.min(n - tail);
        // SAFETY: We are the sole consumer. `count <= filled` guarantees that
        // `[tail, tail + count)` (mod n) was published by the producer.
        unsafe {
            core::ptr::copy_nonoverlapping(self.base().add(tail), out.as_mut_ptr(), first);
            core::ptr::copy_nonoverlapping(self.base(), out.as_mut_ptr().add(first), count - first);
        }

        // Release ordering makes the reads complete before the slots are
        // handed back to the producer.
        self.tail.store((tail + count) % n, Ordering::Release);
        count
    }

    /// Check if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    /// Check if the ring is full.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Return the number of bytes currently queued.
    pub fn len(&self) -> usize {
        let n = self.slots();
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + n - tail) % n
    }
}
