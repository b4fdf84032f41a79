//! Recording of annotated frames.
//!
//! Output is a Motion-JPEG stream: every frame is a complete JPEG appended to
//! `result_<YYYYmmdd_HHMMSS>.mjpeg`. The file is playable by ffmpeg/VLC and by
//! this crate's own MJPEG source.
//!
//! A raw MJPEG stream has no header, so the frame rate is not stored anywhere.
//! Players (and `ingest::mjpeg`) assume 25 fps, which is why `RECORDING_FPS`
//! is fixed.
//!
//! The controller's lifecycle is independent of any capture handle. A failed
//! write finalizes the sink and disables further writes; playback is the
//! caller's business.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::Frame;

pub const RECORDING_FPS: u32 = 25;
pub const RECORDING_EXTENSION: &str = "mjpeg";
const JPEG_QUALITY: u8 = 90;
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started(PathBuf),
    AlreadyActive(PathBuf),
}

impl StartOutcome {
    pub fn path(&self) -> &Path {
        match self {
            StartOutcome::Started(path) | StartOutcome::AlreadyActive(path) => path,
        }
    }
}

/// What a finalized sink produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames_written: u64,
}

/// Byte destination of a recording.
pub(crate) trait RecordingSink: Write + Send {
    /// Make everything written so far durable.
    fn sync(&mut self) -> io::Result<()>;
}

impl RecordingSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

struct MjpegWriter {
    path: PathBuf,
    out: Box<dyn RecordingSink>,
    size: Option<(u32, u32)>,
    /// Reused per frame; each JPEG reaches the sink in one `write_all`.
    encoded: Vec<u8>,
    frames_written: u64,
}

impl MjpegWriter {
    fn create(path: PathBuf, size: Option<(u32, u32)>) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self::with_sink(path, Box::new(file), size))
    }

    fn with_sink(path: PathBuf, out: Box<dyn RecordingSink>, size: Option<(u32, u32)>) -> Self {
        Self {
            path,
            out,
            size,
            encoded: Vec::new(),
            frames_written: 0,
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let (width, height) = *self.size.get_or_insert(frame.dimensions());
        let image: Cow<'_, RgbImage> = if frame.dimensions() == (width, height) {
            Cow::Borrowed(frame.image())
        } else {
            Cow::Owned(imageops::resize(frame.image(), width, height, FilterType::Triangle))
        };
        self.encoded.clear();
        JpegEncoder::new_with_quality(&mut self.encoded, JPEG_QUALITY)
            .encode_image(image.as_ref())
            .with_context(|| format!("encode frame {}", frame.index))?;
        self.out
            .write_all(&self.encoded)
            .with_context(|| format!("write frame {} to {}", frame.index, self.path.display()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<RecordingSummary> {
        self.out
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        self.out
            .sync()
            .with_context(|| format!("sync {}", self.path.display()))?;
        Ok(RecordingSummary {
            path: self.path,
            frames_written: self.frames_written,
        })
    }
}

/// Owns at most one open recording sink.
#[derive(Default)]
pub struct RecordingController {
    writer: Option<MjpegWriter>,
    output_path: Option<PathBuf>,
    has_written_any_frame: bool,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    /// Path of the current or most recent recording.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn has_written_any_frame(&self) -> bool {
        self.has_written_any_frame
    }

    /// Open a new sink in `dir`. A `None` frame size is taken from the first frame written.
    ///
    /// If a sink is already open this does nothing and reports its path.
    pub fn start(&mut self, dir: &Path, frame_size: Option<(u32, u32)>, fps: u32) -> Result<StartOutcome> {
        if let Some(writer) = &self.writer {
            return Ok(StartOutcome::AlreadyActive(writer.path.clone()));
        }
        if !dir.is_dir() {
            bail!("recording directory {} does not exist", dir.display());
        }
        if fps != RECORDING_FPS {
            log::warn!("mjpeg recordings play back at {} fps, not {}", RECORDING_FPS, fps);
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let writer = create_unique(dir, &stamp, frame_size)?;
        log::info!(
            "recording to {}{}",
            writer.path.display(),
            match frame_size {
                Some((w, h)) => format!(" at {}x{}", w, h),
                None => String::new(),
            }
        );
        Ok(self.adopt(writer))
    }

    /// Record into an already opened sink, as `start` does for a fresh file.
    pub(crate) fn start_with_sink(
        &mut self,
        path: PathBuf,
        sink: Box<dyn RecordingSink>,
        frame_size: Option<(u32, u32)>,
    ) -> StartOutcome {
        if let Some(writer) = &self.writer {
            return StartOutcome::AlreadyActive(writer.path.clone());
        }
        self.adopt(MjpegWriter::with_sink(path, sink, frame_size))
    }

    fn adopt(&mut self, writer: MjpegWriter) -> StartOutcome {
        let path = writer.path.clone();
        self.output_path = Some(path.clone());
        self.has_written_any_frame = false;
        self.writer = Some(writer);
        StartOutcome::Started(path)
    }

    /// Append one frame. Returns whether a frame was written (false with no sink).
    ///
    /// On failure the sink is finalized and later writes are no-ops.
    pub fn write(&mut self, frame: &Frame) -> Result<bool> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(false);
        };
        if let Err(e) = writer.write_frame(frame) {
            log::warn!("recording write failed, closing sink: {:#}", e);
            self.finalize();
            return Err(e);
        }
        self.has_written_any_frame = true;
        Ok(true)
    }

    /// Push buffered frames to disk without closing the sink.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .out
                .flush()
                .with_context(|| format!("flush {}", writer.path.display()))?;
        }
        Ok(())
    }

    /// Flush and close the sink if one is open. Idempotent.
    pub fn finalize(&mut self) -> Option<RecordingSummary> {
        let writer = self.writer.take()?;
        let path = writer.path.clone();
        match writer.finish() {
            Ok(summary) => {
                log::info!(
                    "recording finalized: {} ({} frames)",
                    summary.path.display(),
                    summary.frames_written
                );
                Some(summary)
            }
            Err(e) => {
                log::warn!("failed to finalize recording {}: {:#}", path.display(), e);
                None
            }
        }
    }

    /// Forget the last recording's path and written flag. Closes any open sink first.
    pub fn reset(&mut self) {
        self.finalize();
        self.output_path = None;
        self.has_written_any_frame = false;
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// `result_<stamp>.mjpeg`, or `result_<stamp>_N.mjpeg` when that name is taken.
fn create_unique(dir: &Path, stamp: &str, frame_size: Option<(u32, u32)>) -> Result<MjpegWriter> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("result_{}.{}", stamp, RECORDING_EXTENSION)
        } else {
            format!("result_{}_{}.{}", stamp, attempt, RECORDING_EXTENSION)
        };
        let path = dir.join(name);
        match MjpegWriter::create(path.clone(), frame_size) {
            Ok(writer) => return Ok(writer),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("create recording {}", path.display()));
            }
        }
    }
    bail!(
        "no free recording name for {} in {}",
        stamp,
        dir.display()
    )
}
