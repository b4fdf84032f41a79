mod adapter;
mod backend;
mod backends;
mod result;

pub use adapter::{DetectionAdapter, DetectorStatus};
pub use backend::DetectorBackend;
pub use backends::{ScriptedBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection, RawDetection};
