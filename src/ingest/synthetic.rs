//! `stub://name?frames=N&width=W&height=H` streams.
//!
//! Finite, deterministic frames for tests and demos. Defaults to 30 frames of
//! 320x240; `frames=0` opens a stream that ends immediately.

use anyhow::{anyhow, bail, Result};

use super::video::{timestamp_for, SourceStats, DEFAULT_FPS};
use crate::frame::Frame;

const DEFAULT_FRAMES: u64 = 30;
const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const MAX_SIDE: u32 = 8192;

pub(super) struct SyntheticSource {
    path: String,
    total_frames: u64,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticSource {
    pub(super) fn new(path: &str) -> Result<Self> {
        let rest = path
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub:// path: {}", path))?;
        let mut source = Self {
            path: path.to_string(),
            total_frames: DEFAULT_FRAMES,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_count: 0,
        };
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(source);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            match key {
                "frames" => source.total_frames = parse_param(key, value)?,
                "width" => source.width = parse_side(key, value)?,
                "height" => source.height = parse_side(key, value)?,
                other => bail!("unknown stub parameter '{}'", other),
            }
        }
        Ok(source)
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        log::info!(
            "VideoSource: connected to {} (synthetic, {} frames of {}x{})",
            self.path,
            self.total_frames,
            self.width,
            self.height
        );
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.total_frames {
            return Ok(None);
        }
        let index = self.frame_count;
        self.frame_count += 1;
        let pixels = self.generate_pixels(index);
        let frame = Frame::from_rgb(pixels, self.width, self.height, index)?
            .with_timestamp(timestamp_for(index, DEFAULT_FPS));
        Ok(Some(frame))
    }

    /// Diagonal gradient that shifts one step per frame.
    fn generate_pixels(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.width as u64, self.height as u64);
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let base = x + y + index;
                pixels.push((base % 256) as u8);
                pixels.push(((base * 3) % 256) as u8);
                pixels.push(((y * 255) / h.max(1)) as u8);
            }
        }
        pixels
    }

    pub(super) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.path.clone(),
        }
    }
}

fn parse_param(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|e| anyhow!("stub parameter {}='{}': {}", key, value, e))
}

fn parse_side(key: &str, value: &str) -> Result<u32> {
    let side = parse_param(key, value)?;
    if side == 0 || side > MAX_SIDE as u64 {
        bail!("stub parameter {} must be in 1..={}, got {}", key, MAX_SIDE, side);
    }
    Ok(side as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_query() -> Result<()> {
        let mut source = SyntheticSource::new("stub://pond")?;
        let frame = source.next_frame()?.ok_or_else(|| anyhow!("no frame"))?;
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(frame.index, 0);
        assert_eq!(frame.timestamp_ms, Some(0));
        Ok(())
    }

    #[test]
    fn stream_ends_after_requested_frames() -> Result<()> {
        let mut source = SyntheticSource::new("stub://pond?frames=2&width=8&height=6")?;
        let first = source.next_frame()?.ok_or_else(|| anyhow!("no frame"))?;
        let second = source.next_frame()?.ok_or_else(|| anyhow!("no frame"))?;
        assert_eq!(first.dimensions(), (8, 6));
        assert_eq!(second.index, 1);
        assert_eq!(second.timestamp_ms, Some(40));
        assert_ne!(first.pixels(), second.pixels());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(SyntheticSource::new("stub://pond?frames=abc").is_err());
        assert!(SyntheticSource::new("stub://pond?width=0").is_err());
        assert!(SyntheticSource::new("stub://pond?fps=10").is_err());
        assert!(SyntheticSource::new("stub://pond?frames").is_err());
    }
}
