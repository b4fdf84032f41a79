/// Integer pixel box, corners inclusive: `(x1, y1)` top-left, `(x2, y2)` bottom-right.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Round a floating-point `[x1, y1, x2, y2]` box to pixel coordinates.
    pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
        Self {
            x1: xyxy[0].round() as i32,
            y1: xyxy[1].round() as i32,
            x2: xyxy[2].round() as i32,
            y2: xyxy[3].round() as i32,
        }
    }

    /// Box midpoint, rounded toward the top-left.
    pub fn midpoint(&self) -> (i32, i32) {
        let mid = |a: i32, b: i32| (i64::from(a) + i64::from(b)).div_euclid(2) as i32;
        (mid(self.x1, self.x2), mid(self.y1, self.y2))
    }

    /// `x2 - x1`; negative for an inverted box.
    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    /// Corners clamped into `[0, width-1] x [0, height-1]`. Inverted boxes stay inverted.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_y = height.saturating_sub(1).min(i32::MAX as u32) as i32;
        Self {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        }
    }
}

/// What a backend reports before class names and thresholds are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    /// `[x1, y1, x2, y2]` in frame pixel space.
    pub xyxy: [f32; 4],
    pub class_id: u32,
    pub confidence: f32,
}

/// One detector output, ready for annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub class_name: String,
    /// Always within 0..=1.
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: u32, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Overlay label, e.g. `carp : 0.90`.
    pub fn label(&self) -> String {
        format!("{} : {:.2}", self.class_name, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_and_label() {
        let det = Detection::new(BoundingBox::new(10, 20, 31, 41), 0, "carp", 0.9);
        assert_eq!(det.bbox.midpoint(), (20, 30));
        assert_eq!(det.label(), "carp : 0.90");
        assert_eq!(BoundingBox::from_xyxy([1.4, 1.6, 9.5, 3.0]), BoundingBox::new(1, 2, 10, 3));
    }

    #[test]
    fn extreme_boxes_do_not_overflow() {
        let wide = BoundingBox::from_xyxy([-3e9, 0.0, 3e9, 10.0]);
        assert_eq!(wide.x1, i32::MIN);
        assert_eq!(wide.x2, i32::MAX);
        assert_eq!(wide.width(), u32::MAX as i64);
        assert_eq!(wide.midpoint(), (-1, 5));
        assert_eq!(wide.clamped(16, 16), BoundingBox::new(0, 0, 15, 10));
    }

    #[test]
    fn clamped_keeps_inverted_boxes_inverted() {
        let inverted = BoundingBox::new(40, 12, -8, 3).clamped(32, 10);
        assert_eq!(inverted, BoundingBox::new(31, 9, 0, 3));
        assert!(inverted.width() < 0);
    }

    #[test]
    fn confidence_is_clamped() {
        let det = Detection::new(BoundingBox::new(0, 0, 1, 1), 3, "bream", 1.7);
        assert_eq!(det.confidence, 1.0);
    }
}
