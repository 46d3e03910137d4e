// THEORY:
// The `PixelBuffer` is the "dumb" data container of the scoring engine. It holds
// the raw, interleaved RGB samples of one decoded frame and nothing else: no width,
// no height, no color interpretation. The only knowledge it carries is the shape
// invariant (a non-zero whole number of RGB triples), which it checks once at
// construction so every consumer downstream can rely on it.
//
// Frames arrive from different producers, so the container offers a few bridges:
// - raw RGB bytes (validated),
// - raw RGBA bytes as produced by capture pipelines (alpha is dropped),
// - decoded images from the `image` crate.
//
// Comparing two buffers is not this module's job; that lives in `DifferenceScorer`.

use crate::core_modules::error::ScoreError;
use image::{DynamicImage, RgbImage};

pub type Sample = u8;

/// Number of interleaved channels per pixel (red, green, blue).
pub const RGB_CHANNELS: usize = 3;
/// Channel count of the RGBA frames accepted by [`PixelBuffer::from_rgba`].
pub const RGBA_CHANNELS: usize = 4;

/// An owned, validated, row-major buffer of interleaved RGB samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// The raw samples, `[r, g, b, r, g, b, ...]`.
    samples: Vec<Sample>,
}

impl PixelBuffer {
    /// Wraps raw RGB samples, rejecting empty buffers and partial pixels.
    pub fn from_rgb(samples: Vec<Sample>) -> Result<Self, ScoreError> {
        validate_rgb(&samples)?;
        Ok(Self { samples })
    }

    /// Builds an RGB buffer from RGBA samples by dropping every alpha channel.
    pub fn from_rgba(samples: &[Sample]) -> Result<Self, ScoreError> {
        if samples.is_empty() {
            return Err(ScoreError::Empty);
        }
        if samples.len() % RGBA_CHANNELS != 0 {
            return Err(ScoreError::NotRgba { len: samples.len() });
        }

        let mut rgb = Vec::with_capacity(samples.len() / RGBA_CHANNELS * RGB_CHANNELS);
        for pixel in samples.chunks_exact(RGBA_CHANNELS) {
            rgb.extend_from_slice(&pixel[..RGB_CHANNELS]);
        }
        Ok(Self { samples: rgb })
    }

    pub fn as_bytes(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of channel samples (three per pixel).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Never true for a constructed buffer; kept alongside `len`.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn pixel_count(&self) -> usize {
        self.samples.len() / RGB_CHANNELS
    }

    pub fn into_inner(self) -> Vec<Sample> {
        self.samples
    }
}

impl TryFrom<Vec<Sample>> for PixelBuffer {
    type Error = ScoreError;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        Self::from_rgb(samples)
    }
}

impl AsRef<[Sample]> for PixelBuffer {
    fn as_ref(&self) -> &[Sample] {
        &self.samples
    }
}

// `RgbImage` already guarantees the triple layout; only a zero-sized image is refused.
impl TryFrom<RgbImage> for PixelBuffer {
    type Error = ScoreError;

    fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
        Self::from_rgb(image.into_raw())
    }
}

impl TryFrom<&DynamicImage> for PixelBuffer {
    type Error = ScoreError;

    fn try_from(image: &DynamicImage) -> Result<Self, Self::Error> {
        Self::try_from(image.to_rgb8())
    }
}

/// Checks the shape invariant on a borrowed slice of RGB samples.
pub(crate) fn validate_rgb(samples: &[Sample]) -> Result<(), ScoreError> {
    if samples.is_empty() {
        return Err(ScoreError::Empty);
    }
    if samples.len() % RGB_CHANNELS != 0 {
        return Err(ScoreError::NotRgb { len: samples.len() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn accepts_whole_rgb_pixels() {
        let buffer = PixelBuffer::from_rgb(vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.pixel_count(), 2);
        assert_eq!(buffer.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn rejects_partial_pixels() {
        assert_eq!(
            PixelBuffer::from_rgb(vec![0; 7]),
            Err(ScoreError::NotRgb { len: 7 })
        );
        assert_eq!(PixelBuffer::try_from(vec![0; 4]), Err(ScoreError::NotRgb { len: 4 }));
    }

    #[test]
    fn rejects_empty_buffers() {
        assert_eq!(PixelBuffer::from_rgb(Vec::new()), Err(ScoreError::Empty));
        assert_eq!(PixelBuffer::from_rgba(&[]), Err(ScoreError::Empty));
    }

    #[test]
    fn rgba_frames_drop_alpha() {
        let rgba = [10, 20, 30, 255, 40, 50, 60, 0];
        let buffer = PixelBuffer::from_rgba(&rgba).unwrap();
        assert_eq!(buffer.into_inner(), vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn rgba_frames_must_hold_whole_pixels() {
        assert_eq!(
            PixelBuffer::from_rgba(&[0; 6]),
            Err(ScoreError::NotRgba { len: 6 })
        );
    }

    #[test]
    fn decoded_images_keep_row_major_order() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([1, 2, 3]));
        image.put_pixel(1, 0, Rgb([4, 5, 6]));

        let from_rgb = PixelBuffer::try_from(image.clone()).unwrap();
        let from_dynamic = PixelBuffer::try_from(&DynamicImage::ImageRgb8(image)).unwrap();

        assert_eq!(from_rgb.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(from_rgb, from_dynamic);
        assert!(!from_rgb.is_empty());
    }

    #[test]
    fn zero_sized_images_are_rejected() {
        assert_eq!(PixelBuffer::try_from(RgbImage::new(0, 0)), Err(ScoreError::Empty));
        assert_eq!(
            PixelBuffer::try_from(&DynamicImage::new_rgb8(4, 0)),
            Err(ScoreError::Empty)
        );
    }
}
