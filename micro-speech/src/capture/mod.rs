//! Audio capture: microphone worker, capture buffer and audio timestamp.
//!
//! ## Components
//!
//! | Item | Side | Description |
//! |------|------|-------------|
//! | [`CaptureWorker`] | producer | Pulls chunks from a [`Microphone`] into the buffer |
//! | [`CaptureWriter`] | producer | Timed, bounded append into the capture buffer |
//! | [`CaptureReader`] | consumer | Timed, bounded read out of the capture buffer |
//! | [`AudioTimestamp`] | producer | Milliseconds of audio enqueued so far |
//! | [`TimestampReader`] | consumer | Lock-free view of the timestamp |
//!
//! ## Utilities
//!
//! - [`spsc`]: lock-free single-producer single-consumer byte ring

pub mod spsc;
pub mod buffer;
pub mod timestamp;
pub mod worker;

pub use buffer::{capture_buffer, CaptureReader, CaptureWriter};
pub use timestamp::{bytes_to_ms, AudioTimestamp, TimestampReader};
pub use worker::{rescale_32bit_words, CaptureHandle, CaptureWorker, Microphone};
