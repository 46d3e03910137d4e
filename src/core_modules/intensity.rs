// THEORY:
// The `intensity` module owns the two global statistics the scorer is built on:
//
// 1.  **Mean intensity**: the per-pixel intensity is (R+G+B)/(3*255). Its mean over
//     the image equals the mean over all channel samples, so we sum every sample into
//     an exact `u64` and divide once at the end. No running mean of narrow floats,
//     so tens of millions of samples lose nothing.
// 2.  **Co-moments**: with both means known, a single pass accumulates the
//     covariance sum and the two variance sums over the centered intensities.
//
// Both passes are rayon map-reduces over fixed-size blocks of pixels. Each block is
// reduced sequentially, the indexed `collect` keeps the partials in block order, and
// they are folded front to back. The block layout does not depend on how many threads
// run, so the floating point result is bit-identical for any pool size. Calls that
// share a pool (the global one by default) share its threads, including calls made
// from many `spawn_blocking` tasks at once.

use crate::core_modules::pixel_buffer::{RGB_CHANNELS, Sample};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::Arc;

/// Pixels per reduction block unless configured otherwise.
pub const DEFAULT_BLOCK_PIXELS: usize = 65_536;

const MAX_SAMPLE: f64 = 255.0;
const INTENSITY_SCALE: f64 = RGB_CHANNELS as f64 * MAX_SAMPLE;

/// The three second-order sums over centered intensities.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoMoments {
    /// Σ d_ref · d_cand
    pub covariance_sum: f64,
    /// Σ d_ref²
    pub reference_variance_sum: f64,
    /// Σ d_cand²
    pub candidate_variance_sum: f64,
}

impl CoMoments {
    /// Associative combine step for block partials.
    pub fn combine(self, other: CoMoments) -> CoMoments {
        CoMoments {
            covariance_sum: self.covariance_sum + other.covariance_sum,
            reference_variance_sum: self.reference_variance_sum + other.reference_variance_sum,
            candidate_variance_sum: self.candidate_variance_sum + other.candidate_variance_sum,
        }
    }

    /// Pearson correlation of the two intensity series. NaN when either variance is zero.
    pub fn correlation(&self) -> f64 {
        self.covariance_sum / (self.reference_variance_sum * self.candidate_variance_sum).sqrt()
    }
}

/// Intensity of one RGB pixel, in [0, 1].
#[inline]
pub fn pixel_intensity(pixel: &[Sample; RGB_CHANNELS]) -> f64 {
    let [red, green, blue] = *pixel;
    (red as u32 + green as u32 + blue as u32) as f64 / INTENSITY_SCALE
}

/// Block-partitioned parallel reducer over RGB sample slices.
#[derive(Debug, Clone)]
pub struct Reduction {
    /// Pixels per block. Fixes the floating point summation order.
    block_pixels: usize,
    /// Dedicated pool; `None` runs on rayon's global pool.
    pool: Option<Arc<ThreadPool>>,
}

impl Reduction {
    /// `block_pixels` is clamped to at least one.
    pub fn new(block_pixels: usize, pool: Option<Arc<ThreadPool>>) -> Self {
        Self {
            block_pixels: block_pixels.max(1),
            pool,
        }
    }

    fn block_samples(&self) -> usize {
        self.block_pixels.saturating_mul(RGB_CHANNELS)
    }

    fn install<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Exact sum of every channel sample.
    pub fn sample_sum(&self, samples: &[Sample]) -> u64 {
        self.install(|| {
            samples
                .par_chunks(self.block_samples())
                .map(|block| block.iter().map(|&sample| sample as u64).sum::<u64>())
                .sum()
        })
    }

    /// Mean per-pixel intensity in [0, 1]. NaN for an empty slice.
    pub fn mean_intensity(&self, samples: &[Sample]) -> f64 {
        self.sample_sum(samples) as f64 / MAX_SAMPLE / samples.len() as f64
    }

    /// Accumulates the covariance and variance sums of the centered intensities.
    /// Both slices must have the same length, a multiple of 3.
    pub fn co_moments(
        &self,
        reference: &[Sample],
        candidate: &[Sample],
        mean_reference: f64,
        mean_candidate: f64,
    ) -> CoMoments {
        debug_assert_eq!(reference.len(), candidate.len());

        let partials: Vec<CoMoments> = self.install(|| {
            reference
                .par_chunks(self.block_samples())
                .zip(candidate.par_chunks(self.block_samples()))
                .map(|(ref_block, cand_block)| {
                    block_co_moments(ref_block, cand_block, mean_reference, mean_candidate)
                })
                .collect()
        });

        partials.into_iter().fold(CoMoments::default(), CoMoments::combine)
    }
}

fn block_co_moments(
    reference: &[Sample],
    candidate: &[Sample],
    mean_reference: f64,
    mean_candidate: f64,
) -> CoMoments {
    let (ref_pixels, _) = reference.as_chunks::<RGB_CHANNELS>();
    let (cand_pixels, _) = candidate.as_chunks::<RGB_CHANNELS>();

    let mut moments = CoMoments::default();
    for (ref_pixel, cand_pixel) in ref_pixels.iter().zip(cand_pixels) {
        let diff_reference = pixel_intensity(ref_pixel) - mean_reference;
        let diff_candidate = pixel_intensity(cand_pixel) - mean_candidate;

        moments.covariance_sum += diff_reference * diff_candidate;
        moments.reference_variance_sum += diff_reference * diff_reference;
        moments.candidate_variance_sum += diff_candidate * diff_candidate;
    }
    moments
}
