//! fishscope
//!
//! Object detection over still images and video streams, with per-frame
//! overlays, per-class counts and on-demand recording of the annotated stream.
//!
//! # Architecture
//!
//! The core is a single-threaded state machine driven one tick at a time:
//!
//! 1. **Detection**: `detect::DetectionAdapter` wraps a `DetectorBackend` and
//!    filters by confidence. A missing detector yields empty results, never errors.
//! 2. **Annotation**: `annotate::annotate` draws markers, boxes and labels on a
//!    copy of the frame and returns a fresh `CountSummary`.
//! 3. **Sources**: `source::SourceController` owns the capture handle and the
//!    `SessionMode`; `ingest` provides the concrete inputs.
//! 4. **Recording**: `record::RecordingController` owns the output sink, with
//!    a lifecycle independent of the source.
//! 5. **Session**: `session::Session` composes the above and exposes
//!    load/pause/resume/clear/save.
//!
//! # Module Structure
//!
//! - `frame`: owned RGB frame buffers
//! - `config`: validated render settings and the JSON config store
//! - `error`: `SessionError`, the structured error reported at the session boundary

pub mod annotate;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod record;
pub mod session;
pub mod source;

pub use annotate::{annotate, CountSummary};
pub use config::{
    AppConfig, ConfigStore, LoadedConfig, RenderConfig, CONFIG_ENV, CONF_THRESHOLD_ENV,
    MODEL_PATH_ENV,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{
    BoundingBox, Detection, DetectionAdapter, DetectorBackend, DetectorStatus, RawDetection,
    ScriptedBackend, StubBackend,
};
pub use error::{ErrorKind, SessionError};
pub use frame::Frame;
pub use ingest::{load_image, SourceStats, VideoSource};
pub use record::{RecordingController, RecordingSummary, StartOutcome, RECORDING_FPS};
pub use session::{
    default_image_name, DestinationChooser, DisplaySink, ResumeReport, Session, TickOutcome,
};
pub use source::{Fetch, SessionMode, SourceController};
