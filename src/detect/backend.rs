use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// Backends see packed RGB24 pixels for exactly one frame. They must treat the
/// slice as read-only and must not keep it past the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Human-readable name for a class id, if the backend knows it.
    fn class_name(&self, class_id: u32) -> Option<&str>;

    /// Run detection on a frame.
    ///
    /// Boxes are reported in the frame's own pixel space. Backends may apply
    /// a low internal score floor; the caller applies the user threshold.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
