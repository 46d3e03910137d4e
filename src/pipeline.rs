// THEORY:
// The `pipeline` module is the top-level API for change detection on a fixed camera.
// The scorer alone only compares two frames; a real capture loop also needs to know
// which frame is the reference, when a score counts as a change, and what to do when
// the score is undefined. `ChangeDetector` packages that calling convention:
//
// 1.  **Baseline ownership**: the detector owns the last known stable frame. The very
//     first frame has nothing to compare against and is always reported as a change
//     (`Report::NoBaseline`), then becomes the reference.
// 2.  **Thresholding**: a score strictly above `DetectorConfig::threshold` is a change.
// 3.  **Degenerate frames**: a flat frame makes the score NaN. Rather than letting
//     `NaN > threshold` silently evaluate to false, the detector applies
//     `DegeneratePolicy` and reports `Report::Indeterminate`.
// 4.  **Promotion**: a frame reported as a change replaces the reference, so the
//     detector follows the scene instead of re-triggering on every later frame.

use crate::core_modules::difference_scorer::{DifferenceScorer, ScorerConfig};
use crate::core_modules::error::ScoreError;
use crate::core_modules::pixel_buffer::PixelBuffer;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::difference_scorer::{Comparison, NO_BASELINE_SCORE};

/// Score above which a scene is considered changed, unless configured otherwise.
pub const DEFAULT_THRESHOLD: f64 = 0.18;

/// What to conclude when the score is NaN because a frame has zero variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DegeneratePolicy {
    /// Fail safe: treat the frame as a change.
    #[default]
    AssumeChanged,
    /// Treat the frame as unchanged.
    AssumeUnchanged,
}

/// Configuration for the ChangeDetector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectorConfig {
    /// Scores strictly above this value report a change.
    pub threshold: f64,
    pub degenerate_policy: DegeneratePolicy,
    /// Whether a frame reported as a change becomes the new reference.
    pub promote_on_change: bool,
    pub scorer: ScorerConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            degenerate_policy: DegeneratePolicy::default(),
            promote_on_change: true,
            scorer: ScorerConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ScoreError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ScoreError::invalid_config(format!(
                "threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        self.scorer.validate()
    }
}

/// The outcome of feeding one frame to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Report {
    /// There was no reference frame yet.
    NoBaseline,
    Stable { score: f64 },
    Changed { score: f64 },
    /// The score was NaN; the policy decided how to count it.
    Indeterminate { treated_as_change: bool },
}

impl Report {
    pub fn is_change(&self) -> bool {
        match self {
            Report::NoBaseline | Report::Changed { .. } => true,
            Report::Stable { .. } => false,
            Report::Indeterminate { treated_as_change } => *treated_as_change,
        }
    }

    /// The raw score, where one exists.
    pub fn score(&self) -> Option<f64> {
        match self {
            Report::NoBaseline => Some(NO_BASELINE_SCORE),
            Report::Stable { score } | Report::Changed { score } => Some(*score),
            Report::Indeterminate { .. } => None,
        }
    }
}

/// Tracks a reference frame and classifies each new frame against it.
pub struct ChangeDetector {
    scorer: DifferenceScorer,
    config: DetectorConfig,
    reference: Option<PixelBuffer>,
    frames_processed: u64,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, ScoreError> {
        config.validate()?;
        Ok(Self {
            scorer: DifferenceScorer::new(config.scorer)?,
            config,
            reference: None,
            frames_processed: 0,
        })
    }

    /// Shorthand for `process_frame(frame)?.is_change()`.
    pub fn change_detected(&mut self, frame: PixelBuffer) -> Result<bool, ScoreError> {
        Ok(self.process_frame(frame)?.is_change())
    }

    /// Scores `frame` against the reference and updates the reference on change.
    /// On error the reference is left untouched.
    pub fn process_frame(&mut self, frame: PixelBuffer) -> Result<Report, ScoreError> {
        let report = match &self.reference {
            None => {
                // Validates the frame even though there is nothing to compare.
                self.scorer.score(None, &frame)?;
                Report::NoBaseline
            }
            Some(reference) => {
                let score = self.scorer.score(Some(reference), &frame)?;
                self.classify(score)
            }
        };
        self.frames_processed += 1;

        match report {
            Report::NoBaseline => {
                info!(frame = self.frames_processed, "no reference frame yet, adopting first frame");
                self.reference = Some(frame);
            }
            Report::Changed { score } => {
                info!(frame = self.frames_processed, score, "scene changed");
                self.promote(frame);
            }
            Report::Indeterminate { treated_as_change } => {
                warn!(
                    frame = self.frames_processed,
                    treated_as_change, "zero-variance frame, score is undefined"
                );
                if treated_as_change {
                    self.promote(frame);
                }
            }
            Report::Stable { score } => {
                debug!(frame = self.frames_processed, score, "scene stable");
            }
        }

        Ok(report)
    }

    fn classify(&self, score: f64) -> Report {
        if score.is_nan() {
            Report::Indeterminate {
                treated_as_change: self.config.degenerate_policy == DegeneratePolicy::AssumeChanged,
            }
        } else if score > self.config.threshold {
            Report::Changed { score }
        } else {
            Report::Stable { score }
        }
    }

    fn promote(&mut self, frame: PixelBuffer) {
        if self.config.promote_on_change {
            self.reference = Some(frame);
        }
    }

    pub fn reference(&self) -> Option<&PixelBuffer> {
        self.reference.as_ref()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Drops the reference; the next frame is reported as `NoBaseline`.
    pub fn reset(&mut self) {
        self.reference = None;
    }
}
