#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

const DEFAULT_INPUT_SIZE: u32 = 640;
const SCORE_FLOOR: f32 = 0.05;
const NMS_IOU: f32 = 0.45;
const LETTERBOX_FILL: u8 = 114;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single `[1, 3, S, S]` float input and a `[1, 4 + classes, anchors]`
/// output (center x, center y, width, height, then one score per class).
/// Frames are letterboxed to `S x S`; boxes are mapped back to frame pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    class_names: Vec<String>,
}

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// Class names come from a `<model>.names` sidecar (one per line) if present.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Self::with_input_size(model_path, DEFAULT_INPUT_SIZE)
    }

    pub fn with_input_size<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let class_names = read_class_names(model_path);
        log::info!(
            "TractBackend: loaded {} ({} class names, input {}x{})",
            model_path.display(),
            class_names.len(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            class_names,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<(Tensor, Letterbox)> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }
        let frame = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("failed to wrap frame pixels"))?;

        let side = self.input_size;
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, side);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, side);
        let resized = imageops::resize(&frame, new_w, new_h, imageops::FilterType::Triangle);
        let pad_x = (side - new_w) / 2;
        let pad_y = (side - new_h) / 2;
        let mut canvas = RgbImage::from_pixel(side, side, Rgb([LETTERBOX_FILL; 3]));
        imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, side as usize, side as usize),
            |(_, channel, y, x)| canvas.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        Ok((
            input.into_tensor(),
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        ))
    }

    fn decode(
        &self,
        outputs: &TVec<TValue>,
        letterbox: &Letterbox,
        width: u32,
        height: u32,
    ) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not rank 3")?;
        let shape = view.shape();
        if shape[0] != 1 {
            return Err(anyhow!("unexpected output shape {:?}", shape));
        }
        // Some exports emit [1, anchors, attrs] instead of [1, attrs, anchors].
        let transposed = shape[1] > shape[2];
        let (attrs, anchors) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if attrs < 5 {
            return Err(anyhow!("output has {} attributes, need at least 5", attrs));
        }
        let at = |attr: usize, anchor: usize| {
            if transposed {
                view[[0, anchor, attr]]
            } else {
                view[[0, attr, anchor]]
            }
        };

        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..attrs)
                .map(|attr| (attr - 4, at(attr, anchor)))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < SCORE_FLOOR {
                continue;
            }
            let (cx, cy, w, h) = (
                at(0, anchor),
                at(1, anchor),
                at(2, anchor),
                at(3, anchor),
            );
            let unmap_x = |v: f32| ((v - letterbox.pad_x) / letterbox.scale).clamp(0.0, max_x);
            let unmap_y = |v: f32| ((v - letterbox.pad_y) / letterbox.scale).clamp(0.0, max_y);
            candidates.push(RawDetection {
                xyxy: [
                    unmap_x(cx - w / 2.0),
                    unmap_y(cy - h / 2.0),
                    unmap_x(cx + w / 2.0),
                    unmap_y(cy + h / 2.0),
                ],
                class_id: class_id as u32,
                confidence: score.min(1.0),
            });
        }

        Ok(non_max_suppression(candidates, NMS_IOU))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_name(&self, class_id: u32) -> Option<&str> {
        self.class_names.get(class_id as usize).map(String::as_str)
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let (input, letterbox) = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(&outputs, &letterbox, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        let blank = vec![0u8; (side as usize) * (side as usize) * 3];
        self.detect(&blank, side, side).map(|_| ())
    }
}

fn read_class_names(model_path: &Path) -> Vec<String> {
    let names_path = model_path.with_extension("names");
    match std::fs::read_to_string(&names_path) {
        Ok(raw) => raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => {
            log::warn!(
                "TractBackend: no class names at {}, labels will read 'unknown'",
                names_path.display()
            );
            Vec::new()
        }
    }
}

/// Greedy per-class NMS; output sorted by descending confidence.
fn non_max_suppression(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.xyxy, &candidate.xyxy) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
