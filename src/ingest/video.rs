use std::path::Path;

use anyhow::{anyhow, bail, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::mjpeg::MjpegFileSource;
use super::sequence::ImageSequenceSource;
use super::synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Source;
use crate::frame::Frame;

/// Nominal rate for sources that carry no timing of their own.
pub const DEFAULT_FPS: u32 = 25;

/// An open, pull-based video stream.
///
/// Dropping the source releases its capture handle.
pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticSource),
    Mjpeg(MjpegFileSource),
    Sequence(ImageSequenceSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

/// Statistics for a video source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub path: String,
}

impl VideoSource {
    /// Open and connect the source named by `path`.
    ///
    /// Fails if the stream cannot be opened; nothing is retained on failure.
    pub fn open(path: &str) -> Result<Self> {
        let backend = select_backend(path)?;
        let mut source = Self { backend };
        source.connect()?;
        Ok(source)
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => source.connect(),
            VideoBackend::Mjpeg(source) => source.connect(),
            VideoBackend::Sequence(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            VideoBackend::V4l2(source) => source.connect(),
        }
    }

    /// Capture the next frame, or `None` once the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => source.next_frame(),
            VideoBackend::Mjpeg(source) => source.next_frame(),
            VideoBackend::Sequence(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            VideoBackend::V4l2(source) => source.next_frame(),
        }
    }

    /// Frame rate to play and record at.
    pub fn fps(&self) -> f64 {
        match &self.backend {
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.fps().unwrap_or(DEFAULT_FPS as f64),
            #[cfg(feature = "ingest-v4l2")]
            VideoBackend::V4l2(source) => source.fps(),
            _ => DEFAULT_FPS as f64,
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            VideoBackend::Synthetic(source) => source.stats(),
            VideoBackend::Mjpeg(source) => source.stats(),
            VideoBackend::Sequence(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            VideoBackend::V4l2(source) => source.stats(),
        }
    }
}

fn select_backend(path: &str) -> Result<VideoBackend> {
    if path.trim().is_empty() {
        bail!("no video path given");
    }
    if path.starts_with("stub://") {
        return Ok(VideoBackend::Synthetic(SyntheticSource::new(path)?));
    }
    if path.contains("://") {
        bail!("network streams are not supported: {}", path);
    }
    if path.starts_with("/dev/video") {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(VideoBackend::V4l2(V4l2Source::new(path)));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            bail!("camera capture requires the ingest-v4l2 feature");
        }
    }

    let fs_path = Path::new(path);
    if fs_path.is_dir() {
        return Ok(VideoBackend::Sequence(ImageSequenceSource::new(fs_path)?));
    }
    if !fs_path.is_file() {
        return Err(anyhow!("no such file: {}", path));
    }
    let is_mjpeg = fs_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mjpeg") || ext.eq_ignore_ascii_case("mjpg"));
    if is_mjpeg {
        return Ok(VideoBackend::Mjpeg(MjpegFileSource::new(fs_path)?));
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(VideoBackend::Ffmpeg(FfmpegFileSource::new(path)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        bail!(
            "{} is not a Motion-JPEG stream; other containers require the ingest-file-ffmpeg feature",
            path
        )
    }
}

/// Presentation time of frame `index` at a fixed rate.
pub(super) fn timestamp_for(index: u64, fps: u32) -> u64 {
    index * 1000 / fps.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_source_opens_and_ends() -> Result<()> {
        let mut source = VideoSource::open("stub://tank?frames=1&width=4&height=4")?;
        assert_eq!(source.fps(), 25.0);
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(
            source.stats(),
            SourceStats {
                frames_captured: 1,
                path: "stub://tank?frames=1&width=4&height=4".to_string(),
            }
        );
        Ok(())
    }

    #[test]
    fn refuses_remote_and_missing_paths() {
        assert!(VideoSource::open("rtsp://camera/stream").is_err());
        assert!(VideoSource::open("/no/such/video.mjpeg").is_err());
        assert!(VideoSource::open("  ").is_err());
    }

    #[test]
    fn timestamps_follow_fixed_rate() {
        assert_eq!(timestamp_for(0, 25), 0);
        assert_eq!(timestamp_for(3, 25), 120);
        assert_eq!(timestamp_for(3, 0), 3000);
    }
}
