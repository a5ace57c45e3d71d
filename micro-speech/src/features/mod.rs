//! Feature extraction: the engine boundary and the sliding-window cache.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`FeatureExtractor`] | One audio window → one feature slice (external engine) |
//! | [`FeatureProvider`] | Feature matrix, recomputing only expired slices |
//! | [`generate_features`] | Featurize a whole clip in one pass |
//! | [`MelFrontend`] | Reference log-mel extractor (`frontend` feature) |

pub mod extractor;
pub mod provider;

#[cfg(feature = "frontend")]
pub mod frontend;

pub use extractor::{generate_features, FeatureExtractor};
pub use provider::FeatureProvider;

#[cfg(feature = "frontend")]
pub use frontend::{FrontendError, MelFrontend};
