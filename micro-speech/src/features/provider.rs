//! Sliding-window feature cache.
//!
//! [`FeatureProvider`] keeps the feature matrix for the most recent
//! `feature_count * stride_ms` of audio and recomputes only the slices that
//! expired since the previous call:
//!
//! ```text
//!  last time = 80 ms          current time = 120 ms
//!  +-----------+              +-----------+
//!  | data@20ms |          --> | data@60ms |
//!  +-----------+        --    +-----------+
//!  | data@40ms |      --  --> | data@80ms |
//!  +-----------+    --  --    +-----------+
//!  | data@60ms |  --  --      | data@100ms|  (new)
//!  +-----------+    --        +-----------+
//!  | data@80ms |  --          | data@120ms|  (new)
//!  +-----------+              +-----------+
//! ```
//!
//! New slices are computed into a staging area first. The visible matrix is
//! only shifted and filled once every new slice succeeded, so a failed call
//! leaves it exactly as it was.
//!
//! Slots whose window would start before time 0 are requested at time 0.
//! Right after startup this fills several slots from the earliest audio
//! available rather than signaling missing history.

use tracing::{debug, info};

use super::extractor::FeatureExtractor;
use crate::audio_provider::AudioSource;
use crate::error::{Error, Result};
use crate::settings::ModelSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    /// No matrix computed yet; the next call recomputes every slice.
    Uninitialized,
    /// The matrix holds valid slices; calls recompute only expired ones.
    Warm,
}

/// Incrementally maintained feature matrix.
pub struct FeatureProvider<E: FeatureExtractor> {
    settings: ModelSettings,
    extractor: E,
    engine_ready: bool,
    state: CacheState,
    feature_data: Vec<i8>,
    staging: Vec<i8>,
}

impl<E: FeatureExtractor> FeatureProvider<E> {
    /// Create a provider for a feature buffer of `feature_size` values.
    ///
    /// The buffer is zero-initialized. Its size is checked against the
    /// model geometry on every [`populate_feature_data()`](Self::populate_feature_data).
    /// Fails with [`Error::InvalidSettings`] if `settings` doesn't validate.
    pub fn new(settings: ModelSettings, feature_size: usize, extractor: E) -> Result<Self> {
        settings.validate()?;
        Ok(FeatureProvider {
            settings,
            extractor,
            engine_ready: false,
            state: CacheState::Uninitialized,
            feature_data: vec![0; feature_size],
            staging: vec![0; feature_size],
        })
    }

    /// Update the feature matrix to cover the audio up to `time_in_ms`.
    ///
    /// `last_time_in_ms` is the time passed on the previous call. Returns how
    /// many slices were freshly computed (0 means the matrix is unchanged).
    pub fn populate_feature_data<A: AudioSource + ?Sized>(
        &mut self,
        audio: &mut A,
        last_time_in_ms: i32,
        time_in_ms: i32,
    ) -> Result<usize> {
        let expected = self.settings.element_count();
        if self.feature_data.len() != expected {
            return Err(Error::FeatureSizeMismatch {
                requested: self.feature_data.len(),
                expected,
            });
        }

        let count = self.settings.feature_count;
        let size = self.settings.feature_size;
        let stride_ms = self.settings.stride_ms as i32;

        // Quantize the time into steps as long as each window stride.
        let last_step = self.settings.step(last_time_in_ms);
        let current_step = self.settings.step(time_in_ms);

        let slices_needed = match self.state {
            CacheState::Uninitialized => {
                if !self.engine_ready {
                    self.extractor.initialize().map_err(Error::extraction)?;
                    self.engine_ready = true;
                    info!("feature extractor initialized");
                }
                count
            }
            CacheState::Warm => (current_step - last_step).clamp(0, count as i32) as usize,
        };
        if slices_needed == 0 {
            return Ok(0);
        }

        let keep = count - slices_needed;
        let required = self.settings.window_samples();

        for new_slice in keep..count {
            let new_step = (current_step - count as i32 + 1) + new_slice as i32;
            let slice_start_ms = new_step.saturating_mul(stride_ms).max(0);

            let window = audio.read_window(slice_start_ms, self.settings.duration_ms)?;
            if window.len() < required {
                return Err(Error::InsufficientAudio {
                    available: window.len(),
                    required,
                });
            }

            let out = &mut self.staging[new_slice * size..(new_slice + 1) * size];
            self.extractor
                .extract_slice(&window[..required], out)
                .map_err(Error::extraction)?;
        }

        // Every new slice succeeded: slide the survivors left and commit.
        self.feature_data
            .copy_within(slices_needed * size..count * size, 0);
        self.feature_data[keep * size..].copy_from_slice(&self.staging[keep * size..]);

        self.state = CacheState::Warm;
        debug!(slices_needed, current_step, "feature matrix updated");
        Ok(slices_needed)
    }

    /// The whole feature matrix, oldest slice first.
    pub fn features(&self) -> &[i8] {
        &self.feature_data
    }

    /// One slice of the matrix.
    pub fn slice(&self, index: usize) -> Option<&[i8]> {
        let size = self.settings.feature_size;
        self.feature_data.get(index * size..(index + 1) * size)
    }

    /// Whether the matrix has been fully computed at least once.
    pub fn is_warm(&self) -> bool {
        self.state == CacheState::Warm
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FEATURE_ELEMENT_COUNT;

    /// Audio source handing out windows whose every sample is the requested
    /// start time, recording each request.
    #[derive(Default)]
    struct StampedAudio {
        requests: Vec<i32>,
        buf: Vec<i16>,
        short_after: Option<usize>,
    }

    impl AudioSource for StampedAudio {
        fn read_window(&mut self, start_ms: i32, duration_ms: u32) -> Result<&[i16]> {
            self.requests.push(start_ms);
            let full = (duration_ms * 16) as usize;
            let len = match self.short_after {
                Some(n) if self.requests.len() > n => full / 2,
                _ => full,
            };
            self.buf.clear();
            self.buf.resize(len, start_ms as i16);
            Ok(&self.buf)
        }
    }

    /// Encodes the window's start time (in strides) into the slice and counts
    /// initializations; can be told to fail after some number of slices.
    #[derive(Default)]
    struct StepEncoder {
        inits: usize,
        extracted: usize,
        fail_after: Option<usize>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("engine invoke failed")]
    struct InvokeFailed;

    impl FeatureExtractor for StepEncoder {
        type Error = InvokeFailed;

        fn initialize(&mut self) -> core::result::Result<(), Self::Error> {
            self.inits += 1;
            Ok(())
        }

        fn extract_slice(&mut self, window: &[i16], out: &mut [i8]) -> core::result::Result<(), Self::Error> {
            if self.fail_after == Some(self.extracted) {
                return Err(InvokeFailed);
            }
            self.extracted += 1;
            let step = window[0] / 20;
            out.fill(step as i8);
            out[0] = (step >> 8) as i8;
            Ok(())
        }
    }

    const S: ModelSettings = ModelSettings::MICRO_SPEECH;

    fn provider() -> FeatureProvider<StepEncoder> {
        FeatureProvider::new(S, FEATURE_ELEMENT_COUNT, StepEncoder::default()).unwrap()
    }

    fn step_of(p: &FeatureProvider<StepEncoder>, i: usize) -> i8 {
        p.slice(i).unwrap()[1]
    }

    #[test]
    fn first_run_computes_every_slice() {
        let mut p = provider();
        let mut audio = StampedAudio::default();

        let n = p.populate_feature_data(&mut audio, 0, 1000).unwrap();
        assert_eq!(n, 49);
        assert!(p.is_warm());
        assert_eq!(p.extractor().inits, 1);
        assert_eq!(audio.requests.len(), 49);
        // current_step = 50 → slots cover steps 2..=50
        assert_eq!(audio.requests[0], 40);
        assert_eq!(audio.requests[48], 1000);
        for i in 0..49 {
            assert_eq!(step_of(&p, i), (i + 2) as i8);
        }
    }

    #[test]
    fn one_stride_later_shifts_by_one() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        p.populate_feature_data(&mut audio, 0, 1000).unwrap();
        let before = p.features().to_vec();
        audio.requests.clear();

        let n = p.populate_feature_data(&mut audio, 1000, 1020).unwrap();
        assert_eq!(n, 1);
        assert_eq!(audio.requests, [1020]);
        assert_eq!(p.extractor().inits, 1);

        let size = S.feature_size;
        assert_eq!(&p.features()[..48 * size], &before[size..]);
        assert_eq!(step_of(&p, 48), 51);
    }

    #[test]
    fn slices_are_reused_byte_identical() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        p.populate_feature_data(&mut audio, 0, 1000).unwrap();

        for k in [2usize, 7, 48] {
            let before = p.features().to_vec();
            let t0 = 2000 + 100 * k as i32;
            p.populate_feature_data(&mut audio, t0 - 20 * k as i32, t0)
                .unwrap();
            let size = S.feature_size;
            assert_eq!(&p.features()[..(49 - k) * size], &before[k * size..]);
        }
    }

    #[test]
    fn windows_stay_contiguous_and_stride_aligned() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        let mut last = 0;
        for now in [1000, 1020, 1075, 1080, 1300, 1310, 3000] {
            p.populate_feature_data(&mut audio, last, now).unwrap();
            let current_step = now / 20;
            for i in 0..49 {
                assert_eq!(
                    step_of(&p, i),
                    (current_step - 48 + i as i32) as i8,
                    "slot {i} at time {now}"
                );
            }
            last = now;
        }
    }

    #[test]
    fn same_step_is_a_no_op() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        p.populate_feature_data(&mut audio, 0, 1000).unwrap();
        let before = p.features().to_vec();
        audio.requests.clear();

        assert_eq!(p.populate_feature_data(&mut audio, 1000, 1019).unwrap(), 0);
        assert_eq!(p.populate_feature_data(&mut audio, 1000, 1019).unwrap(), 0);
        assert!(audio.requests.is_empty());
        assert_eq!(p.features(), &before[..]);
    }

    #[test]
    fn time_going_backwards_computes_nothing() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        p.populate_feature_data(&mut audio, 0, 1000).unwrap();
        assert_eq!(p.populate_feature_data(&mut audio, 1000, 900).unwrap(), 0);
    }

    #[test]
    fn long_gap_is_clamped_to_full_recompute() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        p.populate_feature_data(&mut audio, 0, 1000).unwrap();
        audio.requests.clear();

        let n = p.populate_feature_data(&mut audio, 1000, 10_000).unwrap();
        assert_eq!(n, 49);
        assert_eq!(audio.requests.len(), 49);
        assert_eq!(step_of(&p, 0), (500 - 48) as i8);
    }

    #[test]
    fn startup_window_starts_clamp_to_zero() {
        let mut p = provider();
        let mut audio = StampedAudio::default();

        // current_step = 5: slots 0..=43 map to negative steps
        p.populate_feature_data(&mut audio, 0, 100).unwrap();
        assert!(audio.requests[..44].iter().all(|&t| t == 0));
        assert_eq!(&audio.requests[44..], [20, 40, 60, 80, 100]);
    }

    #[test]
    fn invalid_settings_are_rejected_up_front() {
        for bad in [
            ModelSettings { stride_ms: 0, ..S },
            ModelSettings { duration_ms: 10, ..S },
        ] {
            assert!(matches!(
                FeatureProvider::new(bad, FEATURE_ELEMENT_COUNT, StepEncoder::default()),
                Err(Error::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn wrapped_timestamp_does_not_overflow_window_starts() {
        let mut p = provider();
        let mut audio = StampedAudio::default();

        let n = p.populate_feature_data(&mut audio, 0, i32::MIN + 10).unwrap();
        assert_eq!(n, 49);
        assert!(audio.requests.iter().all(|&t| t == 0));
    }

    #[test]
    fn size_mismatch_is_reported_every_call() {
        let mut p = FeatureProvider::new(S, 100, StepEncoder::default()).unwrap();
        let mut audio = StampedAudio::default();
        for _ in 0..2 {
            assert!(matches!(
                p.populate_feature_data(&mut audio, 0, 1000),
                Err(Error::FeatureSizeMismatch {
                    requested: 100,
                    expected: 1960
                })
            ));
        }
        assert!(audio.requests.is_empty());
        assert_eq!(p.extractor().inits, 0);
    }

    #[test]
    fn extraction_failure_leaves_matrix_untouched() {
        let mut p = provider();
        let mut audio = StampedAudio::default();
        p.populate_feature_data(&mut audio, 0, 1000).unwrap();
        let before = p.features().to_vec();

        // Fail on the third of five new slices.
        p.extractor.fail_after = Some(p.extractor.extracted + 2);
        let err = p.populate_feature_data(&mut audio, 1000, 1100).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(p.features(), &before[..]);
    }

    #[test]
    fn failed_first_run_stays_uninitialized() {
        let mut p = provider();
        p.extractor.fail_after = Some(3);
        let mut audio = StampedAudio::default();

        assert!(p.populate_feature_data(&mut audio, 0, 1000).is_err());
        assert!(!p.is_warm());
        assert!(p.features().iter().all(|&v| v == 0));

        // Next call recomputes the whole window without re-initializing.
        p.extractor.fail_after = None;
        assert_eq!(p.populate_feature_data(&mut audio, 1000, 1020).unwrap(), 49);
        assert_eq!(p.extractor().inits, 1);
    }

    #[test]
    fn short_window_is_insufficient_audio() {
        let mut p = provider();
        let mut audio = StampedAudio {
            short_after: Some(10),
            ..Default::default()
        };

        let err = p.populate_feature_data(&mut audio, 0, 1000).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientAudio {
                available: 240,
                required: 480
            }
        ));
        assert!(p.features().iter().all(|&v| v == 0));
    }
}
