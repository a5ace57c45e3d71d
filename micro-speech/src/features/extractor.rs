//! Boundary to the feature-extraction engine.

use crate::error::{Error, Result};
use crate::settings::ModelSettings;

/// Turns one audio window into one feature slice.
///
/// Implemented by the external preprocessing engine (or by
/// [`MelFrontend`](super::MelFrontend) when the `frontend` feature is on).
pub trait FeatureExtractor {
    /// Engine error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// One-time engine setup. Called before the first slice is extracted.
    fn initialize(&mut self) -> core::result::Result<(), Self::Error>;

    /// Compute the features of `window` (exactly one window of samples) into
    /// `out` (exactly one slice of values).
    fn extract_slice(&mut self, window: &[i16], out: &mut [i8]) -> core::result::Result<(), Self::Error>;
}

impl<E: FeatureExtractor + ?Sized> FeatureExtractor for &mut E {
    type Error = E::Error;

    fn initialize(&mut self) -> core::result::Result<(), Self::Error> {
        (**self).initialize()
    }

    fn extract_slice(&mut self, window: &[i16], out: &mut [i8]) -> core::result::Result<(), Self::Error> {
        (**self).extract_slice(window, out)
    }
}

/// Featurize a whole clip in one pass.
///
/// Walks `audio` one stride at a time while a full window remains, writing up
/// to `feature_count` slices into `out`. Returns the number of slices
/// written; slices past that are left untouched. The extractor must already
/// be initialized.
pub fn generate_features<E: FeatureExtractor>(
    extractor: &mut E,
    settings: &ModelSettings,
    audio: &[i16],
    out: &mut [i8],
) -> Result<usize> {
    if out.len() != settings.element_count() {
        return Err(Error::FeatureSizeMismatch {
            requested: out.len(),
            expected: settings.element_count(),
        });
    }

    let window = settings.window_samples();
    let stride = settings.stride_samples();

    let mut produced = 0;
    let mut offset = 0;
    for slice in out.chunks_exact_mut(settings.feature_size) {
        if audio.len() - offset < window {
            break;
        }
        extractor
            .extract_slice(&audio[offset..offset + window], slice)
            .map_err(Error::extraction)?;
        produced += 1;
        offset += stride;
    }
    Ok(produced)
}
