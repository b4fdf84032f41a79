//! Frame ingestion sources.
//!
//! - still images (PNG, JPEG, BMP)
//! - `stub://` synthetic streams (testing, demos)
//! - Motion-JPEG stream files, the format recordings are written in
//! - image-sequence directories
//! - video containers (feature: ingest-file-ffmpeg)
//! - V4L2 cameras (feature: ingest-v4l2)
//!
//! Every source yields owned RGB `Frame`s with zero-based indices. A video
//! source reports the end of its stream as `Ok(None)`; errors are left to the
//! caller, which treats a mid-stream decode failure as the end of the stream.

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
mod mjpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod sequence;
mod still;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;
mod video;

pub use still::{load_image, IMAGE_EXTENSIONS};
pub use video::{SourceStats, VideoSource, DEFAULT_FPS};
