//! Error type shared by the capture and feature pipeline.

use thiserror::Error;

/// Boxed error coming out of an external engine or peripheral.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the capture and feature pipeline.
///
/// Partial reads and writes are not errors; they are logged and processing
/// continues with whatever data arrived.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),

    #[error("requested feature buffer size {requested} doesn't match {expected}")]
    FeatureSizeMismatch { requested: usize, expected: usize },

    #[error("requested window of {requested_ms} ms doesn't match the configured {expected_ms} ms")]
    WindowMismatch { requested_ms: u32, expected_ms: u32 },

    #[error("audio data size {available} too small, want {required}")]
    InsufficientAudio { available: usize, required: usize },

    #[error("could not allocate {bytes} byte capture buffer")]
    BufferAllocation { bytes: usize },

    #[error("could not spawn capture worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("no audio captured within {timeout_ms} ms of starting")]
    CaptureStartTimeout { timeout_ms: u64 },

    #[error("feature extraction failed: {0}")]
    Extraction(#[source] BoxError),

    #[error("classification failed: {0}")]
    Classification(#[source] BoxError),
}

impl Error {
    /// Wrap an extraction engine error.
    pub fn extraction<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Extraction(Box::new(err))
    }

    /// Wrap a classification engine error.
    pub fn classification<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Classification(Box::new(err))
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
