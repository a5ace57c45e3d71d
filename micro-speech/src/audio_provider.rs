//! Audio windows for the feature cache.
//!
//! [`AudioProvider`] owns the consumer side of the capture buffer plus the
//! history tail. Each [`read_window()`](AudioProvider::read_window) call
//! hands out one feature window:
//!
//! ```text
//!  output buffer (window_samples)
//! ┌────────────────┬───────────────────────────────┐
//! │ history tail   │ stride samples from the ring  │
//! │ (10 ms / 160)  │ (20 ms / 320)                 │
//! └────────────────┴───────────────────────────────┘
//!                   └──────── last 160 ───────────►  next history tail
//! ```
//!
//! The stride is shorter than the window, so the tail of every window is the
//! head of the next one even though the capture buffer has already let go
//! of those samples.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use tracing::{debug, info, trace, warn};

use crate::capture::{
    capture_buffer, AudioTimestamp, CaptureHandle, CaptureReader, CaptureWorker, Microphone,
    TimestampReader,
};
use crate::error::{Error, Result};
use crate::settings::{CaptureSettings, ModelSettings, PartialReadPolicy};

/// Something the feature cache can pull audio windows from.
pub trait AudioSource {
    /// Produce the window starting at `start_ms`, `duration_ms` long.
    ///
    /// The returned slice is shorter than a full window only when too little
    /// audio arrived; the caller decides whether that is an error.
    fn read_window(&mut self, start_ms: i32, duration_ms: u32) -> Result<&[i16]>;
}

/// Polled view of how much audio has been captured.
pub trait AudioClock {
    /// Milliseconds of audio captured so far. Must not block.
    fn latest_timestamp(&self) -> i32;
}

/// [`DelayNs`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

/// Consumer side of the capture pipeline with its history tail.
pub struct AudioProvider {
    settings: ModelSettings,
    capture: CaptureSettings,
    reader: CaptureReader,
    clock: TimestampReader,
    worker: Option<CaptureHandle>,
    history: Vec<i16>,
    output: Vec<i16>,
    scratch: Vec<u8>,
}

impl AudioProvider {
    /// Start audio recording: allocate the capture buffer, launch the capture
    /// worker and wait until it has produced its first batch.
    pub fn start<M: Microphone>(
        mic: M,
        settings: ModelSettings,
        capture: CaptureSettings,
    ) -> Result<Self> {
        Self::start_with_delay(mic, settings, capture, StdDelay)
    }

    /// Like [`start()`](Self::start), polling the timestamp with `delay`.
    pub fn start_with_delay<M: Microphone, D: DelayNs>(
        mic: M,
        settings: ModelSettings,
        capture: CaptureSettings,
        mut delay: D,
    ) -> Result<Self> {
        settings.validate()?;
        capture.validate()?;

        let (writer, reader) = capture_buffer(capture.capacity)?;
        let timestamp = AudioTimestamp::new();
        let clock = timestamp.reader();
        let worker =
            CaptureWorker::new(mic, writer, timestamp, capture, settings.sample_rate).spawn()?;

        // Hold the caller until audio is flowing, so the first feature pull
        // doesn't race an empty buffer.
        let started = Instant::now();
        while clock.get() == 0 {
            if let Some(limit) = capture.startup_timeout {
                if started.elapsed() >= limit {
                    worker.stop();
                    return Err(Error::CaptureStartTimeout {
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            }
            delay.delay_ms(1);
        }
        info!(timestamp_ms = clock.get(), "Audio Recording started");

        let mut provider = Self::from_parts(settings, capture, reader, clock)?;
        provider.worker = Some(worker);
        Ok(provider)
    }

    /// Build a provider over an existing capture buffer and timestamp,
    /// without owning a worker.
    pub fn from_parts(
        settings: ModelSettings,
        capture: CaptureSettings,
        reader: CaptureReader,
        clock: TimestampReader,
    ) -> Result<Self> {
        settings.validate()?;
        capture.validate()?;
        Ok(AudioProvider {
            settings,
            capture,
            reader,
            clock,
            worker: None,
            history: vec![0; settings.history_samples()],
            output: vec![0; settings.window_samples()],
            scratch: vec![0; settings.stride_samples() * 2],
        })
    }

    /// Latest audio timestamp in milliseconds. Never blocks.
    pub fn latest_timestamp(&self) -> i32 {
        self.clock.get()
    }

    /// The history tail that will prefix the next window.
    pub fn history(&self) -> &[i16] {
        &self.history
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Bytes waiting in the capture buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.reader.filled()
    }

    /// Stop the capture worker, if this provider owns one.
    ///
    /// Production code never calls this; recording runs until process exit.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }

    /// Produce the next feature window: history tail followed by one stride
    /// of fresh audio.
    ///
    /// Windows are handed out in capture order; `start_ms` is informational.
    pub fn read_window(&mut self, start_ms: i32, duration_ms: u32) -> Result<&[i16]> {
        if duration_ms != self.settings.duration_ms {
            return Err(Error::WindowMismatch {
                requested_ms: duration_ms,
                expected_ms: self.settings.duration_ms,
            });
        }

        let keep = self.history.len();
        let stride = self.settings.stride_samples();
        let wanted = stride * 2;

        self.output[..keep].copy_from_slice(&self.history);

        let bytes_read = self
            .reader
            .read(&mut self.scratch[..wanted], self.capture.window_read_timeout);
        let fresh = bytes_read / 2;
        for (dst, b) in self.output[keep..keep + fresh]
            .iter_mut()
            .zip(self.scratch.chunks_exact(2))
        {
            *dst = i16::from_le_bytes([b[0], b[1]]);
        }

        let len = if fresh < stride {
            if fresh == 0 {
                warn!(start_ms, "Model could not read data from ring buffer");
            } else {
                debug!(filled = self.reader.filled(), "Ring buffer fill level");
                warn!(
                    bytes_read,
                    required = wanted,
                    policy = ?self.capture.partial_read_policy,
                    "Partial read of data by model"
                );
            }
            match self.capture.partial_read_policy {
                PartialReadPolicy::ZeroFill => {
                    self.output[keep + fresh..keep + stride].fill(0);
                    keep + stride
                }
                // Nothing new: hand out the history alone and keep it for
                // the next window.
                PartialReadPolicy::Reject if fresh == 0 => return Ok(&self.output[..keep]),
                PartialReadPolicy::Reject => keep + fresh,
            }
        } else {
            keep + stride
        };

        // Carry the tail of this window into the next one.
        self.history
            .copy_from_slice(&self.output[len - keep..len]);

        trace!(start_ms, fresh, len, "audio window");
        Ok(&self.output[..len])
    }
}

impl AudioSource for AudioProvider {
    fn read_window(&mut self, start_ms: i32, duration_ms: u32) -> Result<&[i16]> {
        AudioProvider::read_window(self, start_ms, duration_ms)
    }
}

impl AudioClock for AudioProvider {
    fn latest_timestamp(&self) -> i32 {
        AudioProvider::latest_timestamp(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureWriter;

    /// 16 kHz, 20 ms stride, 30 ms window: 160 history + 320 fresh.
    const SETTINGS: ModelSettings = ModelSettings::MICRO_SPEECH;

    fn fast_capture() -> CaptureSettings {
        CaptureSettings {
            window_read_timeout: Duration::from_millis(5),
            ..CaptureSettings::DEFAULT
        }
    }

    fn provider(capture: CaptureSettings) -> (AudioProvider, CaptureWriter) {
        let (writer, reader) = capture_buffer(capture.capacity).unwrap();
        let clock = AudioTimestamp::new().reader();
        (AudioProvider::from_parts(SETTINGS, capture, reader, clock).unwrap(), writer)
    }

    fn push_ramp(writer: &mut CaptureWriter, start: i16, count: usize) {
        let bytes: Vec<u8> = (0..count)
            .flat_map(|i| (start + i as i16).to_le_bytes())
            .collect();
        assert_eq!(writer.write(&bytes, Duration::ZERO), bytes.len());
    }

    #[test]
    fn first_window_has_zero_history() {
        let (mut p, mut w) = provider(fast_capture());
        push_ramp(&mut w, 1, 320);

        let window = p.read_window(0, 30).unwrap().to_vec();
        assert_eq!(window.len(), 480);
        assert!(window[..160].iter().all(|&s| s == 0));
        assert_eq!(window[160], 1);
        assert_eq!(window[479], 320);
    }

    #[test]
    fn history_tail_carries_into_next_window() {
        let (mut p, mut w) = provider(fast_capture());
        push_ramp(&mut w, 1, 640);

        let first = p.read_window(0, 30).unwrap().to_vec();
        assert_eq!(p.history(), &first[320..480]);

        let second = p.read_window(20, 30).unwrap().to_vec();
        // Head of the second window is the tail of the first.
        assert_eq!(&second[..160], &first[320..]);
        assert_eq!(second[160], 321);
        assert_eq!(second[479], 640);
        // Consecutive windows overlap by exactly the history length.
        assert_eq!(second[0], 161);
    }

    #[test]
    fn partial_read_zero_fills_the_stride() {
        let (mut p, mut w) = provider(fast_capture());
        push_ramp(&mut w, 100, 100);

        let window = p.read_window(0, 30).unwrap().to_vec();
        assert_eq!(window.len(), 480);
        assert_eq!(window[160], 100);
        assert_eq!(window[259], 199);
        assert!(window[260..].iter().all(|&s| s == 0));
        assert!(p.history().iter().all(|&s| s == 0));
    }

    #[test]
    fn partial_read_rejected_truncates_window() {
        let (mut p, mut w) = provider(CaptureSettings {
            partial_read_policy: PartialReadPolicy::Reject,
            ..fast_capture()
        });
        push_ramp(&mut w, 1, 200);

        let window = p.read_window(0, 30).unwrap().to_vec();
        assert_eq!(window.len(), 360);
        assert_eq!(window[359], 200);
        assert_eq!(p.history(), &window[200..360]);
    }

    #[test]
    fn empty_buffer_zero_fills_a_full_window() {
        let (mut p, mut w) = provider(fast_capture());
        push_ramp(&mut w, 1, 320);
        let first = p.read_window(0, 30).unwrap().to_vec();

        let window = p.read_window(20, 30).unwrap().to_vec();
        assert_eq!(window.len(), 480);
        assert_eq!(&window[..160], &first[320..]);
        assert!(window[160..].iter().all(|&s| s == 0));
        assert!(p.history().iter().all(|&s| s == 0));
    }

    #[test]
    fn empty_buffer_rejected_returns_history_only_and_keeps_it() {
        let (mut p, mut w) = provider(CaptureSettings {
            partial_read_policy: PartialReadPolicy::Reject,
            ..fast_capture()
        });
        push_ramp(&mut w, 1, 320);
        p.read_window(0, 30).unwrap();
        let before = p.history().to_vec();

        let window = p.read_window(20, 30).unwrap().to_vec();
        assert_eq!(window, before);
        assert_eq!(p.history(), &before[..]);
    }

    #[test]
    fn wrong_duration_is_rejected() {
        let (mut p, _w) = provider(fast_capture());
        assert!(matches!(
            p.read_window(0, 25),
            Err(Error::WindowMismatch {
                requested_ms: 25,
                expected_ms: 30
            })
        ));
    }

    /// Microphone producing a steady ramp, paced like real hardware.
    struct RampMic {
        next: i16,
    }

    impl Microphone for RampMic {
        type Error = core::convert::Infallible;

        fn read_chunk(&mut self, buf: &mut [u8], _timeout: Duration) -> core::result::Result<usize, Self::Error> {
            std::thread::sleep(Duration::from_millis(2));
            for pair in buf.chunks_exact_mut(2) {
                pair.copy_from_slice(&self.next.to_le_bytes());
                self.next = self.next.wrapping_add(1);
            }
            Ok(buf.len())
        }
    }

    /// Microphone that never delivers anything.
    struct DeadMic;

    impl Microphone for DeadMic {
        type Error = core::convert::Infallible;

        fn read_chunk(&mut self, _buf: &mut [u8], timeout: Duration) -> core::result::Result<usize, Self::Error> {
            std::thread::sleep(timeout.min(Duration::from_millis(2)));
            Ok(0)
        }
    }

    #[test]
    fn start_waits_for_first_batch() {
        let p = AudioProvider::start(RampMic { next: 0 }, SETTINGS, CaptureSettings::DEFAULT).unwrap();
        assert!(p.latest_timestamp() >= 100);
        p.shutdown();
    }

    #[test]
    fn started_provider_streams_contiguous_audio() {
        let mut p =
            AudioProvider::start(RampMic { next: 0 }, SETTINGS, CaptureSettings::DEFAULT).unwrap();

        let first = p.read_window(0, 30).unwrap().to_vec();
        let second = p.read_window(20, 30).unwrap().to_vec();
        assert_eq!(first[160], 0);
        assert_eq!(first[479], 319);
        assert_eq!(&second[..160], &first[320..]);
        assert_eq!(second[160], 320);
        p.shutdown();
    }

    #[test]
    fn start_times_out_on_silent_microphone() {
        let capture = CaptureSettings {
            startup_timeout: Some(Duration::from_millis(20)),
            ..CaptureSettings::DEFAULT
        };
        match AudioProvider::start(DeadMic, SETTINGS, capture) {
            Err(Error::CaptureStartTimeout { timeout_ms }) => assert_eq!(timeout_ms, 20),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("started without audio"),
        }
    }

    #[test]
    fn from_parts_rejects_invalid_settings() {
        let (_w, reader) = capture_buffer(CaptureSettings::DEFAULT.capacity).unwrap();
        let bad = ModelSettings {
            duration_ms: 10,
            ..SETTINGS
        };
        assert!(matches!(
            AudioProvider::from_parts(bad, CaptureSettings::DEFAULT, reader, AudioTimestamp::new().reader()),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn start_rejects_invalid_settings() {
        let bad = ModelSettings {
            stride_ms: 0,
            ..SETTINGS
        };
        assert!(matches!(
            AudioProvider::start(DeadMic, bad, CaptureSettings::DEFAULT),
            Err(Error::InvalidSettings(_))
        ));
    }
}
