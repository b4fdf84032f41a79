//! Motion-JPEG stream files: concatenated baseline JPEG images.
//!
//! Frames are split on SOI/EOI markers. Entropy-coded data stuffs every 0xFF
//! with a zero byte, so an EOI marker can only end an image; embedded EXIF
//! thumbnails are not supported.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use image::ImageFormat;

use super::video::{timestamp_for, SourceStats, DEFAULT_FPS};
use crate::frame::Frame;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;

pub(super) struct MjpegFileSource {
    path: String,
    reader: BufReader<File>,
    frame_count: u64,
}

impl MjpegFileSource {
    pub(super) fn new(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open MJPEG stream {}", path.display()))?;
        Ok(Self {
            path: path.display().to_string(),
            reader: BufReader::new(file),
            frame_count: 0,
        })
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        log::info!("VideoSource: connected to {} (mjpeg)", self.path);
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(jpeg) = read_next_jpeg(&mut self.reader)
            .with_context(|| format!("read frame {} of {}", self.frame_count, self.path))?
        else {
            return Ok(None);
        };
        let index = self.frame_count;
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .with_context(|| format!("decode frame {} of {}", index, self.path))?;
        self.frame_count += 1;
        Ok(Some(
            Frame::new(decoded.to_rgb8(), index).with_timestamp(timestamp_for(index, DEFAULT_FPS)),
        ))
    }

    pub(super) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.path.clone(),
        }
    }
}

/// Next complete JPEG image in the stream, skipping bytes before its SOI.
///
/// `Ok(None)` at a clean end of stream; a stream that ends inside an image is
/// an `UnexpectedEof` error.
pub(super) fn read_next_jpeg<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut image = Vec::new();
    let mut in_image = false;
    let mut prev: Option<u8> = None;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            if in_image {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a JPEG frame",
                ));
            }
            return Ok(None);
        }

        let mut consumed = 0;
        let mut complete = false;
        for &byte in buf {
            consumed += 1;
            if in_image {
                image.push(byte);
                if prev == Some(0xFF) && byte == EOI {
                    complete = true;
                    break;
                }
            } else if prev == Some(0xFF) && byte == SOI {
                in_image = true;
                image.extend_from_slice(&[0xFF, SOI]);
            }
            prev = Some(byte);
        }
        reader.consume(consumed);
        if complete {
            return Ok(Some(image));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_on_markers_and_skips_padding() -> io::Result<()> {
        let stream = [
            0x00, 0xFF, 0xD8, 0x01, 0xFF, 0x00, 0xFF, 0xD9, 0x42, 0xFF, 0xD8, 0x02, 0xFF, 0xD9,
        ];
        // A tiny buffer forces markers to straddle refills.
        let mut reader = BufReader::with_capacity(3, Cursor::new(stream.to_vec()));

        let first = read_next_jpeg(&mut reader)?;
        assert_eq!(first, Some(vec![0xFF, 0xD8, 0x01, 0xFF, 0x00, 0xFF, 0xD9]));
        let second = read_next_jpeg(&mut reader)?;
        assert_eq!(second, Some(vec![0xFF, 0xD8, 0x02, 0xFF, 0xD9]));
        assert_eq!(read_next_jpeg(&mut reader)?, None);
        Ok(())
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut reader = Cursor::new(vec![0xFF, 0xD8, 0x10, 0x20]);
        let err = read_next_jpeg(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
