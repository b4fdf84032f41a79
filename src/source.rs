//! Input source state machine.
//!
//! Tracks which kind of input is active and owns the video capture handle.
//! Opening and decoding happen before the controller is touched, so a path
//! that fails to open never disturbs the current source.

use std::fmt;

use crate::error::SessionError;
use crate::frame::Frame;
use crate::ingest::VideoSource;

/// What the session is currently showing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionMode {
    #[default]
    Idle,
    ImageLoaded,
    VideoPlaying,
    VideoPaused,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Idle => "idle",
            SessionMode::ImageLoaded => "image loaded",
            SessionMode::VideoPlaying => "video playing",
            SessionMode::VideoPaused => "video paused",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, SessionMode::VideoPlaying | SessionMode::VideoPaused)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking for the next frame.
#[derive(Debug)]
pub enum Fetch {
    Frame(Frame),
    /// The stream is exhausted (or failed to decode); the mode is now Idle.
    EndOfStream,
    /// Not in `VideoPlaying`; nothing was read.
    NotPlaying,
}

#[derive(Default)]
pub struct SourceController {
    mode: SessionMode,
    video: Option<VideoSource>,
}

impl SourceController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Whether a capture handle is held, including an exhausted one not yet released.
    pub fn has_capture(&self) -> bool {
        self.video.is_some()
    }

    pub fn video_fps(&self) -> Option<f64> {
        self.video.as_ref().map(VideoSource::fps)
    }

    /// Enter `ImageLoaded` for an image decoded by the caller, releasing any video.
    pub fn show_image(&mut self) {
        self.release_capture();
        self.mode = SessionMode::ImageLoaded;
    }

    /// Adopt an already opened video, replacing any prior source.
    pub fn play(&mut self, video: VideoSource) {
        self.release_capture();
        self.video = Some(video);
        self.mode = SessionMode::VideoPlaying;
    }

    /// Pull the next frame while playing.
    ///
    /// At the end of the stream the mode drops to Idle but the exhausted
    /// handle is kept until `clear()` or the next load, so the owner can
    /// close its outputs first.
    pub fn next_frame(&mut self) -> Fetch {
        if self.mode != SessionMode::VideoPlaying {
            return Fetch::NotPlaying;
        }
        let Some(video) = self.video.as_mut() else {
            self.mode = SessionMode::Idle;
            return Fetch::EndOfStream;
        };
        match video.next_frame() {
            Ok(Some(frame)) => Fetch::Frame(frame),
            Ok(None) => {
                let stats = video.stats();
                log::info!(
                    "end of stream {} after {} frames",
                    stats.path,
                    stats.frames_captured
                );
                self.mode = SessionMode::Idle;
                Fetch::EndOfStream
            }
            Err(e) => {
                log::warn!("ending stream after decode failure: {:#}", e);
                self.mode = SessionMode::Idle;
                Fetch::EndOfStream
            }
        }
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.transition("pause", SessionMode::VideoPlaying, SessionMode::VideoPaused)
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.transition("resume", SessionMode::VideoPaused, SessionMode::VideoPlaying)
    }

    /// Back to Idle, releasing the capture handle if one is held. Idempotent.
    pub fn clear(&mut self) {
        self.release_capture();
        self.mode = SessionMode::Idle;
    }

    fn transition(
        &mut self,
        operation: &'static str,
        from: SessionMode,
        to: SessionMode,
    ) -> Result<(), SessionError> {
        if self.mode != from {
            return Err(SessionError::InvalidState {
                operation,
                mode: self.mode.as_str(),
            });
        }
        self.mode = to;
        Ok(())
    }

    fn release_capture(&mut self) {
        if let Some(video) = self.video.take() {
            let stats = video.stats();
            log::debug!(
                "released capture {} ({} frames read)",
                stats.path,
                stats.frames_captured
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    use crate::error::ErrorKind;

    fn playing(path: &str) -> Result<SourceController> {
        let mut source = SourceController::new();
        source.play(VideoSource::open(path)?);
        Ok(source)
    }

    fn expect_frame(fetch: Fetch) -> Frame {
        match fetch {
            Fetch::Frame(frame) => frame,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn plays_to_end_of_stream() -> Result<()> {
        let mut source = playing("stub://tank?frames=2&width=4&height=4")?;
        assert_eq!(source.mode(), SessionMode::VideoPlaying);

        assert_eq!(expect_frame(source.next_frame()).index, 0);
        assert_eq!(expect_frame(source.next_frame()).index, 1);
        assert!(matches!(source.next_frame(), Fetch::EndOfStream));
        assert_eq!(source.mode(), SessionMode::Idle);
        assert!(source.has_capture());

        source.clear();
        assert!(!source.has_capture());
        assert!(matches!(source.next_frame(), Fetch::NotPlaying));
        Ok(())
    }

    #[test]
    fn pause_holds_position() -> Result<()> {
        let mut source = playing("stub://tank?frames=5&width=4&height=4")?;
        expect_frame(source.next_frame());
        source.pause()?;
        assert!(matches!(source.next_frame(), Fetch::NotPlaying));
        source.resume()?;
        assert_eq!(expect_frame(source.next_frame()).index, 1);
        Ok(())
    }

    #[test]
    fn pause_and_resume_rejected_outside_video() {
        let mut source = SourceController::new();
        let err = source.pause().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), "pause is not valid while idle");
        assert!(source.resume().is_err());
    }

    #[test]
    fn showing_an_image_releases_the_video() -> Result<()> {
        let mut source = playing("stub://tank?frames=3&width=4&height=4")?;
        source.show_image();
        assert_eq!(source.mode(), SessionMode::ImageLoaded);
        assert!(!source.has_capture());
        assert!(source.pause().is_err());
        assert!(matches!(source.next_frame(), Fetch::NotPlaying));
        Ok(())
    }

    #[test]
    fn clear_is_idempotent() -> Result<()> {
        let mut source = playing("stub://tank?frames=3&width=4&height=4")?;
        source.clear();
        source.clear();
        assert_eq!(source.mode(), SessionMode::Idle);
        assert!(!source.has_capture());
        Ok(())
    }
}
