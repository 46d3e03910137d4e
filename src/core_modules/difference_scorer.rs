// THEORY:
// The `DifferenceScorer` is the analytical heart of the engine. Given a reference
// frame and a candidate frame from the same fixed camera, it answers one question:
// how likely is it that the scene changed? The answer is a single number where 0
// means identical and 1 means maximally different.
//
// How the number is built:
// 1.  **Correlation**: the per-pixel intensities of both frames are treated as paired
//     samples and their Pearson correlation rho is computed. Global lighting changes
//     (a cloud, auto-exposure) shift and scale intensities but barely move rho, while
//     a new object in the scene breaks the pairing and drops it.
// 2.  **Raw difference**: (1 - rho) / 2 maps rho from [-1, 1] onto [1, 0].
// 3.  **Contrast damping**: rho computed on a nearly black or nearly white frame is
//     dominated by sensor noise. The contrast factor 2 * min(m1, m2, 1 - m1, 1 - m2)
//     is 1 for mid-gray scenes and falls to 0 at the extremes, and the raw difference
//     is scaled by (1 + contrast) / 2 so dark scenes produce calmer scores.
//
// The exact arithmetic order matters: detection thresholds (0.18 is a good start)
// are calibrated against it.
//
// Two outcomes are not ordinary scores:
// - No reference yet: the dedicated branch returns `NO_BASELINE_SCORE` (f64::MAX) so
//   any threshold trips on the very first frame.
// - Zero variance (a flat frame): rho is 0/0 and the score is NaN. It is returned
//   unchanged. `NaN > threshold` is false, so callers comparing raw scores treat a
//   degenerate pair as "unchanged" unless they check `is_nan()`; `ChangeDetector`
//   resolves it through an explicit policy instead.

use crate::core_modules::error::ScoreError;
use crate::core_modules::intensity::{DEFAULT_BLOCK_PIXELS, Reduction};
use crate::core_modules::pixel_buffer::{PixelBuffer, RGB_CHANNELS, Sample, validate_rgb};
use rayon::ThreadPoolBuilder;
use std::sync::Arc;
use tracing::trace;

/// Score returned when there is no reference frame to compare against.
pub const NO_BASELINE_SCORE: f64 = f64::MAX;

/// Tuning for the parallel reduction behind the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScorerConfig {
    /// Pixels per reduction block. Scores are bit-identical for a given block size,
    /// whatever the thread count.
    pub block_pixels: usize,
    /// Size of a dedicated rayon pool for this scorer. `None` shares rayon's global
    /// pool, one thread per logical CPU.
    pub worker_threads: Option<usize>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            block_pixels: DEFAULT_BLOCK_PIXELS,
            worker_threads: None,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.block_pixels == 0 {
            return Err(ScoreError::invalid_config("block_pixels must be at least 1"));
        }
        if self.worker_threads == Some(0) {
            return Err(ScoreError::invalid_config("worker_threads must be at least 1"));
        }
        Ok(())
    }
}

/// The full breakdown of one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Mean intensity of the reference frame, in [0, 1].
    pub mean_reference: f64,
    /// Mean intensity of the candidate frame, in [0, 1].
    pub mean_candidate: f64,
    /// Pearson correlation of the paired intensities. NaN for flat frames.
    pub correlation: f64,
    /// Damping factor in [0, 1]; 1 for mid-gray scenes.
    pub contrast: f64,
    /// The final score.
    pub level: f64,
}

impl Comparison {
    /// True when the score is undefined because a frame has zero variance.
    pub fn is_degenerate(&self) -> bool {
        self.level.is_nan()
    }
}

/// Stateless scorer. Cheap to clone (clones share the thread pool) and safe to
/// share between threads.
#[derive(Debug, Clone)]
pub struct DifferenceScorer {
    reduction: Reduction,
}

impl Default for DifferenceScorer {
    fn default() -> Self {
        Self {
            reduction: Reduction::new(DEFAULT_BLOCK_PIXELS, None),
        }
    }
}

impl DifferenceScorer {
    pub fn new(config: ScorerConfig) -> Result<Self, ScoreError> {
        config.validate()?;

        let pool = match config.worker_threads {
            Some(threads) => Some(Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("scene-delta-{index}"))
                    .build()
                    .map_err(|e| ScoreError::ThreadPool(e.to_string()))?,
            )),
            None => None,
        };

        Ok(Self {
            reduction: Reduction::new(config.block_pixels, pool),
        })
    }

    /// Scores `candidate` against `reference`; see the module notes for the
    /// no-baseline and NaN cases.
    pub fn score(
        &self,
        reference: Option<&PixelBuffer>,
        candidate: &PixelBuffer,
    ) -> Result<f64, ScoreError> {
        self.score_rgb(reference.map(PixelBuffer::as_bytes), candidate.as_bytes())
    }

    /// Same as [`score`](Self::score) on raw interleaved RGB slices.
    pub fn score_rgb(
        &self,
        reference: Option<&[Sample]>,
        candidate: &[Sample],
    ) -> Result<f64, ScoreError> {
        match reference {
            None => {
                validate_rgb(candidate)?;
                Ok(NO_BASELINE_SCORE)
            }
            Some(reference) => Ok(self.compare_rgb(reference, candidate)?.level),
        }
    }

    pub fn compare(
        &self,
        reference: &PixelBuffer,
        candidate: &PixelBuffer,
    ) -> Result<Comparison, ScoreError> {
        self.compare_rgb(reference.as_bytes(), candidate.as_bytes())
    }

    /// Runs the full algorithm over two raw RGB slices of equal length.
    pub fn compare_rgb(
        &self,
        reference: &[Sample],
        candidate: &[Sample],
    ) -> Result<Comparison, ScoreError> {
        validate_rgb(reference)?;
        validate_rgb(candidate)?;
        if reference.len() != candidate.len() {
            return Err(ScoreError::LengthMismatch {
                reference: reference.len(),
                candidate: candidate.len(),
            });
        }

        let mean_reference = self.reduction.mean_intensity(reference);
        let mean_candidate = self.reduction.mean_intensity(candidate);

        let moments = self
            .reduction
            .co_moments(reference, candidate, mean_reference, mean_candidate);

        let contrast = contrast_factor(mean_reference, mean_candidate);
        let correlation = moments.correlation();
        let level = difference_level(contrast, correlation);

        trace!(
            mean_reference,
            mean_candidate,
            correlation,
            contrast,
            level,
            pixels = reference.len() / RGB_CHANNELS,
            "compared frames"
        );

        Ok(Comparison {
            mean_reference,
            mean_candidate,
            correlation,
            contrast,
            level,
        })
    }
}

/// `2 * min(m_ref, m_cand, 1 - m_ref, 1 - m_cand)`.
pub fn contrast_factor(mean_reference: f64, mean_candidate: f64) -> f64 {
    2.0 * [mean_reference, mean_candidate, 1.0 - mean_reference, 1.0 - mean_candidate]
        .into_iter()
        .fold(f64::INFINITY, f64::min)
}

/// `(1 + contrast) / 2 * (1 - correlation) / 2`, evaluated left to right.
pub fn difference_level(contrast: f64, correlation: f64) -> f64 {
    (1.0 + contrast) / 2.0 * (1.0 - correlation) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(pixels: &[[u8; 3]]) -> PixelBuffer {
        PixelBuffer::from_rgb(pixels.concat()).unwrap()
    }

    fn gray_series(values: &[u8]) -> PixelBuffer {
        buffer(&values.iter().map(|&v| [v, v, v]).collect::<Vec<_>>())
    }

    fn textured(pixel_count: usize, seed: u32) -> PixelBuffer {
        let samples = (0..pixel_count * 3)
            .map(|i| ((i as u32 ^ seed).wrapping_mul(2_246_822_519) >> 24) as u8)
            .collect();
        PixelBuffer::from_rgb(samples).unwrap()
    }

    #[test]
    fn flat_frames_score_nan() {
        let flat = buffer(&[[128, 128, 128], [128, 128, 128]]);
        let comparison = DifferenceScorer::default().compare(&flat, &flat).unwrap();

        assert!((comparison.mean_reference - 128.0 / 255.0).abs() < 1e-12);
        assert!(comparison.correlation.is_nan());
        assert!(comparison.level.is_nan());
        assert!(comparison.is_degenerate());
    }

    #[test]
    fn nan_never_exceeds_a_threshold() {
        let flat = buffer(&[[128, 128, 128], [128, 128, 128]]);
        let score = DifferenceScorer::default().score(Some(&flat), &flat).unwrap();
        assert!(!(score > 0.18));
        assert!(!(score <= 0.18));
    }

    #[test]
    fn black_and_white_against_itself_scores_zero() {
        let frame = buffer(&[[0, 0, 0], [255, 255, 255]]);
        let comparison = DifferenceScorer::default().compare(&frame, &frame).unwrap();

        assert_eq!(comparison.correlation, 1.0);
        assert_eq!(comparison.contrast, 1.0);
        assert_eq!(comparison.level, 0.0);
    }

    #[test]
    fn swapped_black_and_white_scores_one() {
        let reference = buffer(&[[0, 0, 0], [255, 255, 255]]);
        let candidate = buffer(&[[255, 255, 255], [0, 0, 0]]);
        let comparison = DifferenceScorer::default().compare(&reference, &candidate).unwrap();

        assert_eq!(comparison.correlation, -1.0);
        assert_eq!(comparison.level, 1.0);
    }

    #[test]
    fn missing_reference_returns_sentinel() {
        let candidate = textured(16, 3);
        let score = DifferenceScorer::default().score(None, &candidate).unwrap();
        assert_eq!(score, f64::MAX);
        assert_eq!(score, NO_BASELINE_SCORE);
    }

    #[test]
    fn missing_reference_still_validates_candidate() {
        let scorer = DifferenceScorer::default();
        assert_eq!(scorer.score_rgb(None, &[1, 2]), Err(ScoreError::NotRgb { len: 2 }));
        assert_eq!(scorer.score_rgb(None, &[]), Err(ScoreError::Empty));
    }

    #[test]
    fn identical_textured_frames_score_zero() {
        let frame = textured(1_000, 7);
        let score = DifferenceScorer::default().score(Some(&frame), &frame).unwrap();
        assert!(score.abs() < 1e-9, "score = {score}");
    }

    #[test]
    fn score_is_symmetric() {
        let a = textured(777, 1);
        let b = textured(777, 99);
        let scorer = DifferenceScorer::default();
        assert_eq!(
            scorer.score(Some(&a), &b).unwrap(),
            scorer.score(Some(&b), &a).unwrap()
        );
    }

    #[test]
    fn well_conditioned_scores_stay_in_unit_range() {
        let scorer = DifferenceScorer::default();
        let reference = textured(500, 5);
        for seed in [6, 60, 600, 6_000] {
            let score = scorer.score(Some(&reference), &textured(500, seed)).unwrap();
            assert!((0.0..=1.0).contains(&score), "seed {seed}: {score}");
        }
    }

    #[test]
    fn dark_scenes_are_damped_by_contrast() {
        let dark_reference = gray_series(&[0, 10, 0, 10, 0, 10, 0, 10]);
        let dark_candidate = gray_series(&[0, 10, 10, 0, 0, 10, 10, 0]);
        let mid_reference = gray_series(&[123, 133, 123, 133, 123, 133, 123, 133]);
        let mid_candidate = gray_series(&[123, 133, 133, 123, 123, 133, 133, 123]);

        let scorer = DifferenceScorer::default();
        let dark = scorer.compare(&dark_reference, &dark_candidate).unwrap();
        let mid = scorer.compare(&mid_reference, &mid_candidate).unwrap();

        assert!((dark.mean_reference - 5.0 / 255.0).abs() < 1e-12);
        assert!((dark.contrast - 10.0 / 255.0).abs() < 1e-12);
        assert!((dark.correlation - mid.correlation).abs() < 1e-9);
        assert!(dark.level < mid.level);
        assert!((dark.level - (1.0 + dark.contrast) / 2.0 * (1.0 - dark.correlation) / 2.0).abs() < 1e-15);
    }

    #[test]
    fn contrast_factor_peaks_at_mid_gray() {
        assert_eq!(contrast_factor(0.5, 0.5), 1.0);
        assert!((contrast_factor(0.02, 0.02) - 0.04).abs() < 1e-12);
        assert!((contrast_factor(0.98, 0.5) - 0.04).abs() < 1e-12);
        assert_eq!(contrast_factor(0.0, 0.7), 0.0);
    }

    #[test]
    fn rejects_length_mismatch() {
        let reference = textured(4, 1);
        let candidate = textured(5, 1);
        assert_eq!(
            DifferenceScorer::default().score(Some(&reference), &candidate),
            Err(ScoreError::LengthMismatch { reference: 12, candidate: 15 })
        );
    }

    #[test]
    fn rejects_partial_pixels_in_raw_slices() {
        let scorer = DifferenceScorer::default();
        assert_eq!(
            scorer.score_rgb(Some(&[0u8, 0, 0, 0][..]), &[0, 0, 0, 0]),
            Err(ScoreError::NotRgb { len: 4 })
        );
    }

    #[test]
    fn block_size_and_threads_do_not_change_the_score() {
        let reference = textured(40_001, 11);
        let candidate = textured(40_001, 12);

        let inline = DifferenceScorer::new(ScorerConfig {
            block_pixels: 4_096,
            worker_threads: Some(1),
        })
        .unwrap();
        let threaded = DifferenceScorer::new(ScorerConfig {
            block_pixels: 4_096,
            worker_threads: Some(6),
        })
        .unwrap();
        let single_block = DifferenceScorer::new(ScorerConfig {
            block_pixels: usize::MAX,
            worker_threads: Some(6),
        })
        .unwrap();

        let expected = inline.score(Some(&reference), &candidate).unwrap();
        assert_eq!(threaded.score(Some(&reference), &candidate).unwrap(), expected);
        let other_order = single_block.score(Some(&reference), &candidate).unwrap();
        assert!((other_order - expected).abs() < 1e-9);
    }

    #[test]
    fn rejects_zero_sized_configuration() {
        assert!(matches!(
            DifferenceScorer::new(ScorerConfig { block_pixels: 0, worker_threads: None }),
            Err(ScoreError::InvalidConfig(_))
        ));
        assert!(matches!(
            DifferenceScorer::new(ScorerConfig { block_pixels: 16, worker_threads: Some(0) }),
            Err(ScoreError::InvalidConfig(_))
        ));
    }
}
