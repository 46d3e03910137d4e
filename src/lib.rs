// THEORY:
// This file is the entry point for the `scene_delta` library crate. The crate answers
// a single question for a fixed camera: did the scene change between two frames?
//
// - `core_modules` holds the engine: the validated `PixelBuffer` container, the
//   parallel intensity statistics, and the `DifferenceScorer` that turns them into a
//   lighting-adjusted score.
// - `pipeline` wraps the scorer in a `ChangeDetector` that owns the reference frame,
//   applies a threshold, and resolves undefined scores by policy.
// - `parallel_pipeline` scores many independent frame pairs concurrently on tokio.
//
// Capturing, decoding and resizing frames are left to the caller.

pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::difference_scorer::{
    Comparison, DifferenceScorer, NO_BASELINE_SCORE, ScorerConfig,
};
pub use core_modules::error::ScoreError;
pub use core_modules::pixel_buffer::PixelBuffer;
pub use parallel_pipeline::{PoolError, ScoringPool};
pub use pipeline::{ChangeDetector, DEFAULT_THRESHOLD, DegeneratePolicy, DetectorConfig, Report};
