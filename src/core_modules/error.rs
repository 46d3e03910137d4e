// THEORY:
// Every failure the scoring engine can report is a caller programming error: a
// buffer with the wrong shape, two buffers that do not describe the same scene, or
// a configuration that cannot work. These are deterministic, so nothing here is
// retryable. Numeric degeneracy (zero variance) is deliberately NOT an error; it
// surfaces as a NaN score and is resolved by the caller or by `ChangeDetector`.

use thiserror::Error;

/// Errors returned by buffer construction, scoring and configuration validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    /// The sample count is not a whole number of RGB triples.
    #[error("RGB buffer length {len} is not a multiple of 3")]
    NotRgb { len: usize },

    /// The sample count is not a whole number of RGBA quadruples.
    #[error("RGBA buffer length {len} is not a multiple of 4")]
    NotRgba { len: usize },

    /// A buffer holds no pixels at all, so its mean is undefined.
    #[error("pixel buffer is empty")]
    Empty,

    /// Reference and candidate do not hold the same number of samples.
    #[error("buffer length mismatch: reference has {reference} samples, candidate has {candidate}")]
    LengthMismatch { reference: usize, candidate: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build scoring thread pool: {0}")]
    ThreadPool(String),
}

impl ScoreError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
