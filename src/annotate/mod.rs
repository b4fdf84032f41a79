//! Overlay rendering and per-frame class counts.
//!
//! `annotate` never touches the caller's frame: it draws onto a clone and
//! returns it with the counts for exactly the detections it was handed.

mod font;

use std::fmt;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::config::RenderConfig;
use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

const MARKER_RADIUS: i32 = 5;
const LABEL_GAP: i32 = 10;

/// Class name to count for one frame, in detector emission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountSummary {
    counts: Vec<(String, usize)>,
}

impl CountSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, class_name: &str) {
        match self.counts.iter_mut().find(|(name, _)| name == class_name) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((class_name.to_string(), 1)),
        }
    }

    pub fn get(&self, class_name: &str) -> usize {
        self.counts
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// `carp: 2, bream: 1`, or `0` when nothing was detected.
    pub fn render(&self) -> String {
        if self.counts.is_empty() {
            return "0".to_string();
        }
        self.counts
            .iter()
            .map(|(name, count)| format!("{}: {}", name, count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for CountSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Draw markers, boxes and labels for `detections` on a copy of `frame`.
pub fn annotate(frame: &Frame, detections: &[Detection], config: &RenderConfig) -> (Frame, CountSummary) {
    let mut counts = CountSummary::new();
    let mut annotated = frame.clone();
    if detections.is_empty() {
        return (annotated, counts);
    }

    let color = Rgb(config.box_color());
    let text_scale = glyph_scale(config.font_scale());
    let img = annotated.image_mut();
    for detection in detections {
        counts.increment(&detection.class_name);

        draw_filled_circle_mut(img, detection.bbox.midpoint(), MARKER_RADIUS, color);
        let bbox = detection.bbox.clamped(frame.width(), frame.height());
        draw_box(img, bbox, color, config.box_thickness());

        let baseline = bbox.y1 - LABEL_GAP;
        let top = baseline - font::GLYPH_HEIGHT * text_scale;
        font::draw_text(img, &detection.label(), bbox.x1, top, text_scale, color);
    }
    (annotated, counts)
}

/// Pixel multiplier for the 5x7 font; 1.0 maps to a 14 px tall label.
fn glyph_scale(font_scale: f32) -> i32 {
    ((font_scale * 2.0).round() as i32).max(1)
}

/// Outline grown outward one pixel per unit of thickness; imageproc clips to the image.
///
/// `bbox` must already be clamped to the image.
fn draw_box(img: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>, thickness: u32) {
    if bbox.width() < 0 || bbox.height() < 0 {
        return;
    }
    for offset in 0..thickness.max(1) as i32 {
        let grow = 1 + 2 * i64::from(offset);
        let rect = Rect::at(bbox.x1 - offset, bbox.y1 - offset).of_size(
            (bbox.width() + grow) as u32,
            (bbox.height() + grow) as u32,
        );
        draw_hollow_rect_mut(img, rect, color);
    }
}
