//! The recognition loop as one owned context.
//!
//! [`SpeechPipeline`] ties an audio source, the feature cache and a
//! classifier together. Each [`run_cycle()`](SpeechPipeline::run_cycle) does
//! what the main loop of the firmware does:
//!
//! ```text
//! latest_timestamp() ──► populate_feature_data(previous, now) ──► classify()
//!                                   │
//!                                   └─ 0 new slices: nothing to do
//! ```

use tracing::{debug, info};

use crate::audio_provider::{AudioClock, AudioSource};
use crate::constants::CATEGORY_COUNT;
use crate::error::{Error, Result};
use crate::features::{FeatureExtractor, FeatureProvider};
use crate::recognize::{CategoryScores, Classifier, Detection, Quantization};
use crate::settings::ModelSettings;

/// Outcome of one cycle that ran the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceResult {
    /// Audio time the features were brought up to.
    pub timestamp_ms: i32,
    /// Slices recomputed in this cycle.
    pub new_slices: usize,
    pub scores: CategoryScores,
}

impl InferenceResult {
    pub fn detection(&self) -> Detection {
        self.scores.top()
    }
}

/// Audio source, feature cache and classifier with the time of the previous
/// cycle.
pub struct SpeechPipeline<A, E: FeatureExtractor, C: Classifier> {
    audio: A,
    features: FeatureProvider<E>,
    classifier: C,
    quantization: Quantization,
    previous_time: i32,
}

impl<A, E, C> SpeechPipeline<A, E, C>
where
    A: AudioSource + AudioClock,
    E: FeatureExtractor,
    C: Classifier,
{
    pub fn new(settings: ModelSettings, audio: A, extractor: E, classifier: C) -> Result<Self> {
        Ok(SpeechPipeline {
            audio,
            features: FeatureProvider::new(settings, settings.element_count(), extractor)?,
            classifier,
            quantization: Quantization::SOFTMAX,
            previous_time: 0,
        })
    }

    /// Use a model output quantization other than the softmax default.
    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = quantization;
        self
    }

    /// Bring the features up to the latest audio and classify them if
    /// anything changed.
    ///
    /// Returns `Ok(None)` when no stride boundary was crossed since the
    /// previous cycle. If feature population fails the previous time is kept,
    /// so the next cycle retries the same span; a classifier failure comes
    /// after the matrix was committed and does not.
    pub fn run_cycle(&mut self) -> Result<Option<InferenceResult>> {
        let now = self.audio.latest_timestamp();
        let new_slices = self
            .features
            .populate_feature_data(&mut self.audio, self.previous_time, now)?;
        self.previous_time = now;

        if new_slices == 0 {
            return Ok(None);
        }

        let mut raw = [0i8; CATEGORY_COUNT];
        self.classifier
            .classify(self.features.features(), &mut raw)
            .map_err(Error::classification)?;

        let result = InferenceResult {
            timestamp_ms: now,
            new_slices,
            scores: CategoryScores::new(raw, self.quantization),
        };
        let top = result.detection();
        debug!(timestamp_ms = now, new_slices, ?raw, "inference");
        info!(
            timestamp_ms = now,
            label = top.label,
            score = top.score,
            "top category"
        );
        Ok(Some(result))
    }

    /// Time passed to the feature cache on the last successful cycle.
    pub fn previous_time(&self) -> i32 {
        self.previous_time
    }

    pub fn features(&self) -> &FeatureProvider<E> {
        &self.features
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Give back the audio source, e.g. to shut its capture worker down.
    pub fn into_audio(self) -> A {
        self.audio
    }
}
