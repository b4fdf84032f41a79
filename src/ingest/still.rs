use std::path::Path;

use anyhow::{Context, Result};
use image::ImageReader;

use crate::frame::Frame;

/// Extensions accepted for still images and image-sequence members.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Decode a still image into an RGB frame with index 0.
///
/// The format is sniffed from the content, so a mislabelled extension still loads.
pub fn load_image(path: &Path) -> Result<Frame> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("read image header {}", path.display()))?;
    let decoded = reader
        .decode()
        .with_context(|| format!("decode image {}", path.display()))?;
    Ok(Frame::new(decoded.to_rgb8(), 0))
}

pub(crate) fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}
