use std::fmt;
use std::path::Path;

use anyhow::{bail, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const UNKNOWN_CLASS: &str = "unknown";

/// Whether a detector is ready, and the status line to show for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorStatus {
    Loaded { backend: &'static str, model: String },
    Unavailable { reason: String },
}

impl DetectorStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, DetectorStatus::Loaded { .. })
    }
}

impl fmt::Display for DetectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorStatus::Loaded { model, .. } => write!(f, "model loaded: {}", model),
            DetectorStatus::Unavailable { reason } => write!(f, "model unavailable: {}", reason),
        }
    }
}

/// Best-effort detection over whichever backend is loaded.
///
/// With no backend, every frame yields zero detections. Backend errors are
/// logged and also yield zero detections; they never stop the frame loop.
pub struct DetectionAdapter {
    backend: Option<Box<dyn DetectorBackend>>,
    status: DetectorStatus,
}

impl DetectionAdapter {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: None,
            status: DetectorStatus::Unavailable {
                reason: reason.into(),
            },
        }
    }

    /// Wrap an already constructed backend, running its warm-up hook.
    pub fn with_backend(mut backend: Box<dyn DetectorBackend>, model: impl Into<String>) -> Self {
        if let Err(e) = backend.warm_up() {
            log::warn!("detector {} failed warm-up: {:#}", backend.name(), e);
            return Self::unavailable(format!("warm-up failed: {:#}", e));
        }
        let status = DetectorStatus::Loaded {
            backend: backend.name(),
            model: model.into(),
        };
        log::info!("{}", status);
        Self {
            backend: Some(backend),
            status,
        }
    }

    /// Load a detector from a weights path.
    ///
    /// `stub://...` selects the no-op backend; `.onnx` files need the
    /// `backend-tract` feature. Anything else leaves the adapter unavailable.
    pub fn load(model_path: &str) -> Self {
        match open_backend(model_path) {
            Ok(backend) => Self::with_backend(backend, display_name(model_path)),
            Err(e) => {
                log::warn!("failed to load detector {}: {:#}", model_path, e);
                Self::unavailable(format!("{:#}", e))
            }
        }
    }

    pub fn status(&self) -> &DetectorStatus {
        &self.status
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    /// Detections on `frame` with confidence >= `threshold`, in backend order.
    ///
    /// Boxes are clamped to the frame, whatever the backend reported.
    pub fn detect(&mut self, frame: &Frame, threshold: f32) -> Vec<Detection> {
        let Some(backend) = self.backend.as_mut() else {
            return Vec::new();
        };
        let raw = match backend.detect(frame.pixels(), frame.width(), frame.height()) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!(
                    "detector {} failed on frame {}: {:#}",
                    backend.name(),
                    frame.index,
                    e
                );
                return Vec::new();
            }
        };
        raw.into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= threshold)
            .map(|d| {
                let class_name = backend.class_name(d.class_id).unwrap_or(UNKNOWN_CLASS);
                Detection::new(
                    BoundingBox::from_xyxy(d.xyxy).clamped(frame.width(), frame.height()),
                    d.class_id,
                    class_name,
                    d.confidence,
                )
            })
            .collect()
    }
}

fn open_backend(model_path: &str) -> Result<Box<dyn DetectorBackend>> {
    if model_path.trim().is_empty() {
        bail!("no model path configured");
    }
    if model_path.starts_with("stub://") {
        return Ok(Box::new(StubBackend::new()));
    }
    let path = Path::new(model_path);
    if !path.is_file() {
        bail!("model file {} does not exist", path.display());
    }
    let is_onnx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
    if !is_onnx {
        bail!("unsupported model format {} (expected .onnx)", path.display());
    }
    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(crate::detect::backends::TractBackend::new(path)?))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        bail!("ONNX models require the backend-tract feature")
    }
}

fn display_name(model_path: &str) -> String {
    Path::new(model_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| model_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;
    use crate::detect::result::RawDetection;

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 4 * 4 * 3], 4, 4, 0).unwrap()
    }

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            xyxy: [0.4, 0.6, 3.2, 2.5],
            class_id,
            confidence,
        }
    }

    #[test]
    fn filters_below_threshold_and_names_classes() {
        let backend = ScriptedBackend::new(["carp"]).then(vec![
            raw(0, 0.9),
            raw(0, 0.69),
            raw(7, 0.7),
            raw(0, f32::NAN),
        ]);
        let mut adapter = DetectionAdapter::with_backend(Box::new(backend), "carp.onnx");
        let detections = adapter.detect(&frame(), 0.7);

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_name, "carp");
        assert_eq!(detections[0].bbox, BoundingBox::new(0, 1, 3, 3));
        assert_eq!(detections[1].class_name, "unknown");
        assert!(detections.iter().all(|d| d.confidence >= 0.7));
    }

    #[test]
    fn boxes_are_clamped_to_the_frame() {
        let backend = ScriptedBackend::new(["carp"]).then(vec![RawDetection {
            xyxy: [-5.0, -5.0, 1e6, 40.0],
            class_id: 0,
            confidence: 0.9,
        }]);
        let mut adapter = DetectionAdapter::with_backend(Box::new(backend), "carp.onnx");
        let detections = adapter.detect(&frame(), 0.5);
        assert_eq!(detections[0].bbox, BoundingBox::new(0, 0, 3, 3));
    }

    #[test]
    fn backend_errors_degrade_to_empty() {
        let backend = ScriptedBackend::new(["carp"])
            .then_fail("inference exploded")
            .then(vec![raw(0, 0.9)]);
        let mut adapter = DetectionAdapter::with_backend(Box::new(backend), "carp.onnx");

        assert!(adapter.detect(&frame(), 0.5).is_empty());
        assert_eq!(adapter.detect(&frame(), 0.5).len(), 1);
    }

    #[test]
    fn missing_model_is_unavailable() {
        let mut adapter = DetectionAdapter::load("/definitely/not/here.onnx");
        assert!(!adapter.is_loaded());
        assert!(!adapter.status().is_loaded());
        assert!(adapter.detect(&frame(), 0.0).is_empty());
    }

    #[test]
    fn stub_model_loads() {
        let adapter = DetectionAdapter::load("stub://fish");
        assert!(adapter.status().is_loaded());
        assert_eq!(adapter.status().to_string(), "model loaded: fish");
    }
}
