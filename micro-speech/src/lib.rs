//! # micro-speech
//!
//! Streaming audio front end for the micro_speech keyword spotter. A capture
//! worker pulls raw PCM from the microphone into a bounded ring buffer; the
//! feature cache pulls overlapping windows back out and keeps a matrix of
//! per-window spectral features current, recomputing only the slices that
//! expired since the previous call.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Config | [`constants`] / [`settings`] | Model geometry and capture tuning |
//! | Capture | [`capture`] | SPSC byte ring, audio timestamp, capture worker |
//! | Windows | [`audio_provider`] | History tail + one stride per window |
//! | Features | [`features`] | Extractor boundary, sliding-window cache, mel front end |
//! | Model | [`recognize`] | Classifier boundary and score decoding |
//! | Loop | [`pipeline`] | [`SpeechPipeline`]: timestamp → features → scores |
//!
//! ## Quick start
//!
//! ```ignore
//! use micro_speech::{AudioProvider, CaptureSettings, ModelSettings, SpeechPipeline};
//! use micro_speech::features::MelFrontend;
//!
//! let settings = ModelSettings::MICRO_SPEECH;
//! let audio = AudioProvider::start(mic, settings, CaptureSettings::DEFAULT)?;
//! let mut pipeline = SpeechPipeline::new(settings, audio, MelFrontend::new(settings), model)?;
//!
//! loop {
//!     if let Some(result) = pipeline.run_cycle()? {
//!         let top = result.detection();
//!         println!("{} {:.2}", top.label, top.score);
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `frontend` | yes | [`features::MelFrontend`], a log-mel extractor built on `libm` |
//!
//! ## Audio parameters
//!
//! - **Sample rate:** 16 000 Hz ([`constants::AUDIO_SAMPLE_FREQUENCY`])
//! - **Window:** 30 ms, stepping 20 ms ([`constants::FEATURE_DURATION_MS`], [`constants::FEATURE_STRIDE_MS`])
//! - **Features:** 49 slices × 40 values of `i8`
//! - **Capture buffer:** 40 000 bytes (~1.25 s of 16-bit mono)

pub mod constants;
pub mod error;
pub mod settings;
pub mod capture;
pub mod audio_provider;
pub mod features;
pub mod recognize;
pub mod pipeline;


pub use audio_provider::{AudioClock, AudioProvider, AudioSource, StdDelay};
pub use capture::Microphone;
pub use error::{Error, Result};
pub use features::{FeatureExtractor, FeatureProvider};
pub use pipeline::{InferenceResult, SpeechPipeline};
pub use recognize::{CategoryScores, Classifier, Detection, Quantization};
pub use settings::{CaptureSettings, I2sSampleWidth, ModelSettings, PartialReadPolicy};
