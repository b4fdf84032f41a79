//! Frame buffers.
//!
//! A `Frame` is an owned RGB pixel buffer plus where it came from in its
//! source. Channel order is RGB everywhere in this crate; ingestion converts
//! at capture time.
//!
//! The session holds at most one "current" frame. Sources hand frames over by
//! value, the annotator draws on a copy, and nothing retains a writable
//! reference across ticks.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Owned RGB frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,

    /// Zero-based position in the source stream (always 0 for still images).
    pub index: u64,

    /// Source presentation time in milliseconds, when the source knows it.
    pub timestamp_ms: Option<u64>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            timestamp_ms: None,
        }
    }

    /// Build a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, index))
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Packed RGB24 pixel bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 0).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 0).is_err());
    }

    #[test]
    fn frame_exposes_dimensions_and_pixels() -> Result<()> {
        let frame = Frame::from_rgb(vec![7u8; 2 * 3 * 3], 2, 3, 4)?.with_timestamp(160);
        assert_eq!(frame.dimensions(), (2, 3));
        assert_eq!(frame.pixels().len(), 18);
        assert_eq!(frame.index, 4);
        assert_eq!(frame.timestamp_ms, Some(160));
        assert!(frame.pixels().iter().all(|&p| p == 7));
        Ok(())
    }
}
