//! Audio timestamp shared between the capture worker and the feature side.
//!
//! The timestamp counts milliseconds of audio actually enqueued, not wall
//! clock time. Only the capture worker advances it; readers poll it.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Writer side of the audio timestamp, owned by the capture worker.
pub struct AudioTimestamp {
    ms: Arc<AtomicI32>,
}

/// Read-only view of the audio timestamp.
#[derive(Clone)]
pub struct TimestampReader {
    ms: Arc<AtomicI32>,
}

/// Milliseconds of 16-bit mono audio in `bytes` at `sample_rate` Hz.
#[inline]
pub const fn bytes_to_ms(bytes: usize, sample_rate: u32) -> i32 {
    ((1000 * (bytes as u64 / 2)) / sample_rate as u64) as i32
}

impl AudioTimestamp {
    pub fn new() -> Self {
        AudioTimestamp {
            ms: Arc::new(AtomicI32::new(0)),
        }
    }

    /// A reader handle observing this timestamp.
    pub fn reader(&self) -> TimestampReader {
        TimestampReader {
            ms: Arc::clone(&self.ms),
        }
    }

    /// Account for `bytes_written` bytes of audio that reached the capture
    /// buffer. Returns the new timestamp.
    pub fn advance(&self, bytes_written: usize, sample_rate: u32) -> i32 {
        let delta = bytes_to_ms(bytes_written, sample_rate);
        // Single writer, so the Release store pairs with readers' Acquire loads.
        self.ms.fetch_add(delta, Ordering::Release) + delta
    }

    pub fn get(&self) -> i32 {
        self.ms.load(Ordering::Acquire)
    }
}

impl Default for AudioTimestamp {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampReader {
    /// Latest audio timestamp in milliseconds. Never blocks.
    pub fn get(&self) -> i32 {
        self.ms.load(Ordering::Acquire)
    }
}
