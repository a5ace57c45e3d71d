//! Bounded capture buffer with timed push/pop.
//!
//! [`capture_buffer()`] allocates a [`ByteRing`] and splits it into a
//! [`CaptureWriter`] (owned by the capture worker) and a [`CaptureReader`]
//! (owned by the feature side). Neither half is `Clone`, so there is exactly
//! one producer and one consumer.
//!
//! Data moves through the lock-free ring. The mutex/condvar pair is only
//! used to sleep when the ring is full (writer) or empty (reader), and every
//! wait is bounded by the caller's timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::spsc::ByteRing;
use crate::error::{Error, Result};

struct Shared {
    ring: ByteRing,
    lock: Mutex<()>,
    readable: Condvar,
    writable: Condvar,
}

impl Shared {
    fn wake(&self, cond: &Condvar) {
        let _guard = self.lock.lock();
        cond.notify_one();
    }
}

/// Producer half of the capture buffer.
pub struct CaptureWriter {
    shared: Arc<Shared>,
}

/// Consumer half of the capture buffer.
pub struct CaptureReader {
    shared: Arc<Shared>,
}

/// Allocate a capture buffer of `capacity` bytes.
///
/// Fails with [`Error::BufferAllocation`] if the backing storage cannot be
/// allocated.
pub fn capture_buffer(capacity: usize) -> Result<(CaptureWriter, CaptureReader)> {
    let ring = ByteRing::try_with_capacity(capacity)
        .ok_or(Error::BufferAllocation { bytes: capacity })?;

    let shared = Arc::new(Shared {
        ring,
        lock: Mutex::new(()),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });

    Ok((
        CaptureWriter {
            shared: Arc::clone(&shared),
        },
        CaptureReader { shared },
    ))
}

impl CaptureWriter {
    /// Append `data`, waiting up to `timeout` for room.
    ///
    /// Returns the number of bytes written. Anything beyond that did not fit
    /// in time and is dropped by the caller.
    pub fn write(&mut self, data: &[u8], timeout: Duration) -> usize {
        let shared = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut written = 0;

        loop {
            let n = shared.ring.push_slice(&data[written..]);
            if n > 0 {
                written += n;
                shared.wake(&shared.readable);
            }
            if written == data.len() {
                return written;
            }

            let mut guard = shared.lock.lock();
            if !shared.ring.is_full() {
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                return written;
            }
            shared.writable.wait_for(&mut guard, deadline - now);
        }
    }

    /// Bytes currently queued.
    pub fn filled(&self) -> usize {
        self.shared.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }
}

impl CaptureReader {
    /// Fill `out`, waiting up to `timeout` for data to arrive.
    ///
    /// Returns the number of bytes read, which is short of `out.len()` if the
    /// timeout expired first.
    pub fn read(&mut self, out: &mut [u8], timeout: Duration) -> usize {
        let shared = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut read = 0;

        loop {
            let n = shared.ring.pop_slice(&mut out[read..]);
            if n > 0 {
                read += n;
                shared.wake(&shared.writable);
            }
            if read == out.len() {
                return read;
            }

            let mut guard = shared.lock.lock();
            if !shared.ring.is_empty() {
                continue;
            }
            let now = Instant::now();
            if now >= deadline {
                return read;
            }
            shared.readable.wait_for(&mut guard, deadline - now);
        }
    }

    /// Bytes currently queued.
    pub fn filled(&self) -> usize {
        self.shared.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }
}
