//! Feature geometry and capture configuration.
//!
//! The reference configuration is fixed at compile time in
//! [`constants`](crate::constants); these structs carry the same values at
//! runtime so the pipeline can be exercised with smaller geometries.

use core::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Geometry of the feature matrix and the audio windows it is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSettings {
    /// Sample rate in Hz. Must be a multiple of 1000.
    pub sample_rate: u32,
    /// Time advance between two slices.
    pub stride_ms: u32,
    /// Audio length behind one slice.
    pub duration_ms: u32,
    /// Slices in the feature matrix.
    pub feature_count: usize,
    /// Values per slice.
    pub feature_size: usize,
}

impl ModelSettings {
    /// The micro_speech model geometry: 16 kHz, 20 ms stride, 30 ms window,
    /// 49 slices of 40 values.
    pub const MICRO_SPEECH: ModelSettings = ModelSettings {
        sample_rate: AUDIO_SAMPLE_FREQUENCY,
        stride_ms: FEATURE_STRIDE_MS,
        duration_ms: FEATURE_DURATION_MS,
        feature_count: FEATURE_COUNT,
        feature_size: FEATURE_SIZE,
    };

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate % 1000 != 0 {
            return Err(Error::InvalidSettings(
                "sample rate must be a non-zero multiple of 1000",
            ));
        }
        if self.stride_ms == 0 {
            return Err(Error::InvalidSettings("stride must be non-zero"));
        }
        if self.stride_ms > self.duration_ms {
            return Err(Error::InvalidSettings(
                "stride must not exceed the window duration",
            ));
        }
        if self.feature_count == 0 || self.feature_size == 0 {
            return Err(Error::InvalidSettings("feature geometry must be non-empty"));
        }
        Ok(())
    }

    #[inline]
    pub const fn samples_per_ms(&self) -> usize {
        (self.sample_rate / 1000) as usize
    }

    /// Samples behind one slice.
    #[inline]
    pub const fn window_samples(&self) -> usize {
        self.duration_ms as usize * self.samples_per_ms()
    }

    /// Fresh samples per slice.
    #[inline]
    pub const fn stride_samples(&self) -> usize {
        self.stride_ms as usize * self.samples_per_ms()
    }

    /// Samples carried from one window into the next.
    #[inline]
    pub const fn history_samples(&self) -> usize {
        (self.duration_ms - self.stride_ms) as usize * self.samples_per_ms()
    }

    /// Values in the whole feature matrix.
    #[inline]
    pub const fn element_count(&self) -> usize {
        self.feature_count * self.feature_size
    }

    /// Quantize a millisecond time into a stride step.
    #[inline]
    pub const fn step(&self, time_ms: i32) -> i32 {
        time_ms / self.stride_ms as i32
    }

    /// Time span covered by the full feature matrix.
    #[inline]
    pub const fn span_ms(&self) -> u32 {
        self.feature_count as u32 * self.stride_ms
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::MICRO_SPEECH
    }
}

/// Width of one I2S word as delivered by the microphone driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I2sSampleWidth {
    /// Little-endian 16-bit samples, enqueued as-is.
    #[default]
    Bits16,
    /// Little-endian 32-bit words, rescaled to 16 bits before enqueueing.
    Bits32,
}

impl I2sSampleWidth {
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            I2sSampleWidth::Bits16 => 2,
            I2sSampleWidth::Bits32 => 4,
        }
    }
}

/// What [`AudioProvider::read_window`](crate::AudioProvider::read_window)
/// does when the capture buffer cannot supply a full stride in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialReadPolicy {
    /// Zero the missing samples and hand out a full-length window.
    #[default]
    ZeroFill,
    /// Hand out only the samples that arrived; the feature cache then
    /// reports insufficient audio.
    Reject,
}

/// Capture buffer and worker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Capture ring buffer capacity in bytes.
    pub capacity: usize,
    /// Bytes requested from the microphone per read.
    pub chunk_bytes: usize,
    /// Word width the microphone delivers.
    pub sample_width: I2sSampleWidth,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub window_read_timeout: Duration,
    /// Give up waiting for the first batch after this long. `None` waits
    /// forever.
    pub startup_timeout: Option<Duration>,
    pub partial_read_policy: PartialReadPolicy,
}

impl CaptureSettings {
    /// Reference capture configuration: 40 kB buffer, 100 ms reads.
    pub const DEFAULT: CaptureSettings = CaptureSettings {
        capacity: AUDIO_CAPTURE_BUFFER_SIZE,
        chunk_bytes: I2S_BYTES_TO_READ,
        sample_width: I2sSampleWidth::Bits16,
        read_timeout: Duration::from_millis(I2S_READ_TIMEOUT_MS as u64),
        write_timeout: Duration::from_millis(CAPTURE_WRITE_TIMEOUT_MS as u64),
        window_read_timeout: Duration::from_millis(WINDOW_READ_TIMEOUT_MS as u64),
        startup_timeout: None,
        partial_read_policy: PartialReadPolicy::ZeroFill,
    };

    pub fn validate(&self) -> Result<()> {
        if self.chunk_bytes == 0 || self.chunk_bytes % self.sample_width.bytes() != 0 {
            return Err(Error::InvalidSettings(
                "chunk size must be a non-zero multiple of the I2S word size",
            ));
        }
        if self.capacity % 2 != 0 {
            return Err(Error::InvalidSettings(
                "capture capacity must hold whole 16-bit samples",
            ));
        }
        if self.capacity < 4 * self.chunk_bytes {
            return Err(Error::InvalidSettings(
                "capture capacity must be well above the chunk size",
            ));
        }
        Ok(())
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}
