//! The frame-processing and recording state machine.
//!
//! A `Session` composes the detector, annotator, source and recording
//! controllers. Nothing runs on its own: callers drive playback one `tick()`
//! at a time from whatever scheduler they have (a timer, a loop, a test).
//!
//! Resource discipline:
//! - the recording sink is always finalized before the capture handle is released;
//! - every release is idempotent, so `clear()` can be called from anywhere;
//! - a failed load leaves the session exactly as it was.

use std::path::{Path, PathBuf};

use crate::annotate::{annotate, CountSummary};
use crate::config::{AppConfig, RenderConfig};
use crate::detect::{DetectionAdapter, DetectorStatus};
use crate::error::SessionError;
use crate::frame::Frame;
use crate::ingest::{self, VideoSource};
use crate::record::{RecordingController, StartOutcome, RECORDING_FPS};
use crate::source::{Fetch, SessionMode, SourceController};

/// Receives every published frame. Must not block for long; ticks wait on it.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame, counts: &CountSummary);

    /// Drop whatever is on screen.
    fn clear(&mut self) {}
}

/// Asked for an output directory when recording could start.
///
/// Returning `None` declines recording.
pub trait DestinationChooser {
    fn choose_directory(&mut self) -> Option<PathBuf>;
}

impl<F> DestinationChooser for F
where
    F: FnMut() -> Option<PathBuf>,
{
    fn choose_directory(&mut self) -> Option<PathBuf> {
        self()
    }
}

/// What one `tick()` did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Not playing; nothing was read.
    NotPlaying,
    Processed {
        index: u64,
        /// Whether the annotated frame went to the recording sink.
        recorded: bool,
        /// Set when recording failed on this frame; playback continues.
        warning: Option<SessionError>,
    },
    /// The stream ended; the session is Idle and the recording finalized.
    EndOfStream { has_saved_output: bool },
}

/// Result of `resume()`.
#[derive(Debug, Default)]
pub struct ResumeReport {
    /// Set when a recording is now active.
    pub recording: Option<StartOutcome>,
    /// Set when a destination was chosen but recording could not start.
    pub warning: Option<SessionError>,
}

/// `result_<YYYYmmdd_HHMMSS>.png`, the suggested name for single-frame saves.
pub fn default_image_name() -> String {
    format!("result_{}.png", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

pub struct Session<D: DisplaySink> {
    detector: DetectionAdapter,
    render: RenderConfig,
    source: SourceController,
    recording: RecordingController,
    display: D,
    current: Option<Frame>,
    counts: CountSummary,
}

impl<D: DisplaySink> Session<D> {
    /// Build a session, loading the detector named in `config`.
    ///
    /// An unavailable detector is logged here and reported by `detector_warning()`;
    /// the session still runs with empty detections.
    pub fn new(config: &AppConfig, display: D) -> Self {
        let detector = DetectionAdapter::load(&config.model_path);
        if let DetectorStatus::Unavailable { reason } = detector.status() {
            log::warn!("running without detections: {}", reason);
        }
        Self::with_detector(detector, config.render, display)
    }

    pub fn with_detector(detector: DetectionAdapter, render: RenderConfig, display: D) -> Self {
        Self {
            detector,
            render,
            source: SourceController::new(),
            recording: RecordingController::new(),
            display,
            current: None,
            counts: CountSummary::new(),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.source.mode()
    }

    pub fn counts(&self) -> &CountSummary {
        &self.counts
    }

    /// The last published (annotated) frame.
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render
    }

    /// Applies from the next processed frame; already published frames keep their overlays.
    pub fn set_render_config(&mut self, render: RenderConfig) {
        self.render = render;
    }

    pub fn detector_status(&self) -> &DetectorStatus {
        self.detector.status()
    }

    pub fn detector_warning(&self) -> Option<SessionError> {
        match self.detector.status() {
            DetectorStatus::Unavailable { reason } => Some(SessionError::DetectorUnavailable(reason.clone())),
            DetectorStatus::Loaded { .. } => None,
        }
    }

    /// Swap in the detector at `model_path`. On failure the current detector stays.
    pub fn reload_model(&mut self, model_path: &str) -> Result<(), SessionError> {
        let detector = DetectionAdapter::load(model_path);
        if let DetectorStatus::Unavailable { reason } = detector.status() {
            return Err(SessionError::DetectorUnavailable(reason.clone()));
        }
        self.detector = detector;
        Ok(())
    }

    /// Whether the current or last recording has at least one frame in it.
    pub fn has_saved_output(&self) -> bool {
        self.recording.has_written_any_frame()
    }

    pub fn recording_path(&self) -> Option<&Path> {
        self.recording.output_path()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_active()
    }

    /// Rate to drive ticks at while a video is open.
    pub fn playback_fps(&self) -> f64 {
        self.source
            .video_fps()
            .unwrap_or(ingest::DEFAULT_FPS as f64)
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Fetch, detect, annotate, record, publish. Does nothing unless playing.
    pub fn tick(&mut self) -> TickOutcome {
        let frame = match self.source.next_frame() {
            Fetch::NotPlaying => return TickOutcome::NotPlaying,
            Fetch::EndOfStream => return self.end_of_stream(),
            Fetch::Frame(frame) => frame,
        };

        let detections = self
            .detector
            .detect(&frame, self.render.confidence_threshold());
        let (annotated, counts) = annotate(&frame, &detections, &self.render);

        let (recorded, warning) = match self.recording.write(&annotated) {
            Ok(recorded) => (recorded, None),
            Err(e) => (false, Some(SessionError::recording(&e))),
        };

        self.display.show(&annotated, &counts);
        let index = annotated.index;
        self.current = Some(annotated);
        self.counts = counts;
        TickOutcome::Processed {
            index,
            recorded,
            warning,
        }
    }

    fn end_of_stream(&mut self) -> TickOutcome {
        self.recording.finalize();
        self.source.clear();
        let has_saved_output = self.has_saved_output();
        log::info!(
            "stream finished{}",
            if has_saved_output { ", recording saved" } else { "" }
        );
        TickOutcome::EndOfStream { has_saved_output }
    }

    /// Decode and annotate a still image, replacing whatever was loaded.
    pub fn load_image(&mut self, path: &Path) -> Result<(), SessionError> {
        let frame = ingest::load_image(path).map_err(|e| {
            log::warn!("failed to load image {}: {:#}", path.display(), e);
            SessionError::source_open(path, &e)
        })?;
        self.recording.reset();
        self.source.show_image();

        let detections = self
            .detector
            .detect(&frame, self.render.confidence_threshold());
        let (annotated, counts) = annotate(&frame, &detections, &self.render);
        log::info!(
            "{}: {}x{}, counts {}",
            path.display(),
            annotated.width(),
            annotated.height(),
            counts
        );
        self.display.show(&annotated, &counts);
        self.current = Some(annotated);
        self.counts = counts;
        Ok(())
    }

    /// Open a video source and start playing it from its first frame.
    pub fn load_video(&mut self, path: &str) -> Result<(), SessionError> {
        let video = VideoSource::open(path).map_err(|e| {
            log::warn!("failed to open video {}: {:#}", path, e);
            SessionError::source_open(path, &e)
        })?;
        self.recording.reset();
        self.source.play(video);
        self.current = None;
        self.counts = CountSummary::new();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.source.pause()
    }

    /// Resume a paused video, first offering to start recording if none is open.
    ///
    /// Declining a destination, or a destination that cannot be recorded to,
    /// still resumes playback.
    pub fn resume(&mut self, chooser: &mut dyn DestinationChooser) -> Result<ResumeReport, SessionError> {
        if self.source.mode() != SessionMode::VideoPaused {
            return Err(SessionError::InvalidState {
                operation: "resume",
                mode: self.source.mode().as_str(),
            });
        }

        let mut report = ResumeReport::default();
        if self.recording.is_active() {
            log::debug!("recording already active");
        } else if let Some(dir) = chooser.choose_directory() {
            let frame_size = self.current.as_ref().map(Frame::dimensions);
            match self.recording.start(&dir, frame_size, RECORDING_FPS) {
                Ok(outcome) => report.recording = Some(outcome),
                Err(e) => {
                    log::warn!("recording not started in {}: {:#}", dir.display(), e);
                    report.warning = Some(SessionError::recording(&e));
                }
            }
        } else {
            log::info!("no recording destination chosen, resuming without recording");
        }

        self.source.resume()?;
        Ok(report)
    }

    /// Finalize recording, release the source, drop the current frame. Idempotent.
    pub fn clear(&mut self) {
        self.recording.reset();
        self.source.clear();
        self.current = None;
        self.counts = CountSummary::new();
        self.display.clear();
    }

    /// Persist output for the current mode.
    ///
    /// With an image loaded, writes the annotated frame to `target` (or a
    /// timestamped PNG in the working directory) in the format its extension
    /// names. Otherwise reports the recording path if it holds any data.
    pub fn save_current(&mut self, target: Option<&Path>) -> Result<PathBuf, SessionError> {
        if self.mode() == SessionMode::ImageLoaded {
            let frame = self.current.as_ref().ok_or(SessionError::NothingToSave)?;
            let path = target
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(default_image_name()));
            frame
                .image()
                .save(&path)
                .map_err(|e| SessionError::Save(format!("{}: {}", path.display(), e)))?;
            log::info!("saved {}", path.display());
            return Ok(path);
        }

        if let Err(e) = self.recording.flush() {
            return Err(SessionError::Save(format!("{:#}", e)));
        }
        let path = self
            .recording
            .output_path()
            .ok_or(SessionError::NothingToSave)?;
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Ok(path.to_path_buf()),
            _ => Err(SessionError::NothingToSave),
        }
    }
}

impl<D: DisplaySink> Drop for Session<D> {
    fn drop(&mut self) {
        self.recording.finalize();
        self.source.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{RawDetection, ScriptedBackend};
    use crate::error::ErrorKind;
    use crate::record::tests::FillingSink;

    #[derive(Default)]
    struct Screen {
        shown: Vec<(u64, String)>,
        cleared: usize,
    }

    impl DisplaySink for Screen {
        fn show(&mut self, frame: &Frame, counts: &CountSummary) {
            self.shown.push((frame.index, counts.render()));
        }

        fn clear(&mut self) {
            self.cleared += 1;
        }
    }

    fn session(backend: ScriptedBackend) -> Session<Screen> {
        let detector = DetectionAdapter::with_backend(Box::new(backend), "scripted");
        Session::with_detector(detector, RenderConfig::default(), Screen::default())
    }

    fn no_destination() -> Option<PathBuf> {
        None
    }

    #[test]
    fn tick_does_nothing_when_idle() {
        let mut s = session(ScriptedBackend::new(["carp"]));
        assert!(matches!(s.tick(), TickOutcome::NotPlaying));
        assert!(s.display().shown.is_empty());
    }

    #[test]
    fn counts_reset_every_frame() -> Result<(), SessionError> {
        let carp = RawDetection {
            xyxy: [2.0, 2.0, 10.0, 10.0],
            class_id: 0,
            confidence: 0.9,
        };
        let backend = ScriptedBackend::new(["carp"]).then(vec![carp.clone(), carp]);
        let mut s = session(backend);
        s.load_video("stub://pond?frames=2&width=16&height=16")?;

        s.tick();
        assert_eq!(s.counts().get("carp"), 2);
        s.tick();
        assert!(s.counts().is_empty());
        assert_eq!(s.display().shown[1], (1, "0".to_string()));
        Ok(())
    }

    #[test]
    fn resume_requires_pause() -> Result<(), SessionError> {
        let mut s = session(ScriptedBackend::new(["carp"]));
        s.load_video("stub://pond?frames=2&width=8&height=8")?;
        let err = s.resume(&mut no_destination).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        Ok(())
    }

    #[test]
    fn full_disk_stops_recording_but_not_playback() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("partial.mjpeg");
        let sink = FillingSink {
            file: std::fs::File::create(&path)?,
            frames_left: 2,
        };
        let mut s = session(ScriptedBackend::new(["carp"]));
        s.load_video("stub://pond?frames=5&width=16&height=16")?;
        s.recording.start_with_sink(path.clone(), Box::new(sink), None);

        for expected in 0..2 {
            match s.tick() {
                TickOutcome::Processed {
                    index,
                    recorded: true,
                    warning: None,
                } => assert_eq!(index, expected),
                other => panic!("expected a recorded frame, got {other:?}"),
            }
        }
        match s.tick() {
            TickOutcome::Processed {
                index: 2,
                recorded: false,
                warning: Some(warning),
            } => assert_eq!(warning.kind(), ErrorKind::RecordingOpen),
            other => panic!("expected a recording warning, got {other:?}"),
        }
        assert!(!s.is_recording());
        assert!(matches!(
            s.tick(),
            TickOutcome::Processed {
                index: 3,
                recorded: false,
                warning: None
            }
        ));
        assert_eq!(s.display().shown.len(), 4);
        assert_eq!(s.save_current(None)?, path);

        let mut replay = VideoSource::open(&path.to_string_lossy())?;
        let mut replayed = 0;
        while replay.next_frame()?.is_some() {
            replayed += 1;
        }
        assert_eq!(replayed, 2);
        Ok(())
    }

    #[test]
    fn save_without_output_is_nothing_to_save() {
        let mut s = session(ScriptedBackend::new(["carp"]));
        let err = s.save_current(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NothingToSave);
    }

    #[test]
    fn reload_failure_keeps_detector() {
        let mut s = session(ScriptedBackend::new(["carp"]));
        let err = s.reload_model("/no/such/model.onnx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DetectorUnavailable);
        assert!(s.detector_status().is_loaded());
        assert!(s.detector_warning().is_none());
    }

    #[test]
    fn default_image_name_is_timestamped_png() {
        let name = default_image_name();
        assert!(name.starts_with("result_") && name.ends_with(".png"), "{name}");
        assert_eq!(name.len(), "result_20260101_120000.png".len());
    }
}
