//! Capture worker: microphone → capture buffer.
//!
//! The worker pulls fixed-size chunks from a [`Microphone`], appends them to
//! the capture buffer and advances the [`AudioTimestamp`] by the amount of
//! audio that actually made it in.
//!
//! ```text
//!  Microphone            CaptureWorker                 CaptureBuffer
//! ┌──────────┐  chunk   ┌──────────────────┐  bytes   ┌────────────┐
//! │ I2S read │────────►│ (rescale 32→16)  │────────►│  ByteRing  │
//! └──────────┘ ≤100 ms  │ advance timestamp│ ≤100 ms  └────────────┘
//!                       └──────────────────┘
//! ```
//!
//! Partial reads and partial writes are expected under jitter: they are
//! logged and the loop keeps going. Nothing is retried.
//!
//! In production the worker runs until process exit. The stop flag exists so
//! tests can shut it down deterministically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::buffer::CaptureWriter;
use super::timestamp::AudioTimestamp;
use crate::constants::I2S_32BIT_RESCALE_SHIFT;
use crate::error::{Error, Result};
use crate::settings::{CaptureSettings, I2sSampleWidth};

/// A source of raw PCM bytes, typically an I2S microphone driver.
pub trait Microphone: Send + 'static {
    /// Driver error type.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns the number of bytes placed in `buf`, which may be short.
    fn read_chunk(&mut self, buf: &mut [u8], timeout: Duration) -> core::result::Result<usize, Self::Error>;
}

/// Rescale little-endian 32-bit I2S words in `buf[..len]` to 16-bit samples
/// in place. Returns the number of 16-bit bytes produced.
pub fn rescale_32bit_words(buf: &mut [u8], len: usize) -> usize {
    let words = len / 4;
    for i in 0..words {
        let src = 4 * i;
        let word = i32::from_le_bytes([buf[src], buf[src + 1], buf[src + 2], buf[src + 3]]);
        let sample = (word >> I2S_32BIT_RESCALE_SHIFT) as i16;
        // Destination index 2*i never overtakes the source index 4*i.
        buf[2 * i..2 * i + 2].copy_from_slice(&sample.to_le_bytes());
    }
    words * 2
}

/// Background loop moving audio from a [`Microphone`] into the capture buffer.
pub struct CaptureWorker<M: Microphone> {
    mic: M,
    writer: CaptureWriter,
    timestamp: AudioTimestamp,
    settings: CaptureSettings,
    sample_rate: u32,
    chunk: Vec<u8>,
    /// Leading bytes of `chunk` left over from an incomplete word.
    carried: usize,
    stop: Arc<AtomicBool>,
}

impl<M: Microphone> CaptureWorker<M> {
    pub fn new(
        mic: M,
        writer: CaptureWriter,
        timestamp: AudioTimestamp,
        settings: CaptureSettings,
        sample_rate: u32,
    ) -> Self {
        CaptureWorker {
            mic,
            writer,
            timestamp,
            settings,
            sample_rate,
            chunk: vec![0u8; settings.chunk_bytes],
            carried: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mic_mut(&mut self) -> &mut M {
        &mut self.mic
    }

    /// Read one chunk from the microphone and enqueue it.
    ///
    /// A word split across two reads is held back until its remaining bytes
    /// arrive. Returns the number of bytes that reached the capture buffer.
    pub fn capture_once(&mut self) -> usize {
        let carried = self.carried;
        let room = self.chunk.len() - carried;
        let bytes_read = match self
            .mic
            .read_chunk(&mut self.chunk[carried..], self.settings.read_timeout)
        {
            Ok(n) => n.min(room),
            Err(err) => {
                error!(?err, "Error in I2S read");
                return 0;
            }
        };

        if bytes_read == 0 {
            error!(bytes_read, "Error in I2S read");
            return 0;
        }
        if bytes_read < room {
            warn!(bytes_read, requested = room, "Partial I2S read");
        }

        let available = carried + bytes_read;
        let whole = available - available % self.settings.sample_width.bytes();

        let pcm_bytes = match self.settings.sample_width {
            I2sSampleWidth::Bits16 => whole,
            I2sSampleWidth::Bits32 => rescale_32bit_words(&mut self.chunk, whole),
        };
        let bytes_written = if pcm_bytes > 0 {
            self.enqueue(pcm_bytes)
        } else {
            0
        };

        // Rescaling only rewrites bytes below `whole`, so the tail is intact.
        self.chunk.copy_within(whole..available, 0);
        self.carried = available - whole;
        bytes_written
    }

    fn enqueue(&mut self, pcm_bytes: usize) -> usize {
        let bytes_written = self
            .writer
            .write(&self.chunk[..pcm_bytes], self.settings.write_timeout);
        if bytes_written != pcm_bytes {
            debug!(bytes_written, pcm_bytes, "Could only write part of the chunk");
        }

        // The timestamp tracks audio readers can actually get at.
        let now = self.timestamp.advance(bytes_written, self.sample_rate);

        if bytes_written == 0 {
            error!(filled = self.writer.filled(), "Could not write in ring buffer");
        } else if bytes_written < pcm_bytes {
            warn!(bytes_written, pcm_bytes, timestamp_ms = now, "Partial write");
        }
        bytes_written
    }

    /// Run until the stop flag is raised.
    pub fn run(mut self) {
        while !self.stop.load(Ordering::Acquire) {
            self.capture_once();
        }
        debug!("capture worker stopped");
    }

    /// Launch the worker on its own thread.
    pub fn spawn(self) -> Result<CaptureHandle> {
        let stop = Arc::clone(&self.stop);
        let thread = std::thread::Builder::new()
            .name("capture-samples".into())
            .spawn(move || self.run())
            .map_err(Error::WorkerSpawn)?;

        Ok(CaptureHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a running capture worker.
///
/// Dropping the handle detaches the worker; it keeps running until process
/// exit. Use [`stop()`](Self::stop) to shut it down.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Raise the stop flag and wait for the worker to exit.
    ///
    /// The worker notices the flag after its current read and write, so this
    /// returns within roughly one read timeout plus one write timeout.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("capture worker panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
}
