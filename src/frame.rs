//! Frame data model.
//!
//! - `Frame`: one decoded RGB picture from one view, tagged with its index.
//! - `View`: which of the two synchronized cameras a frame came from.
//! - `BoundingBox`: pixel-space box in `(x1, y1, x2, y2)` corner form.
//!
//! Frames are immutable once read and owned by the segmentation loop only for
//! the duration of one iteration.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Camera angle of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    /// Frontal ("AP") camera.
    Front,
    /// Side ("LAT") camera.
    Lateral,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Front => "front",
            View::Lateral => "lateral",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" | "ap" => Ok(View::Front),
            "lateral" | "lat" | "side" => Ok(View::Lateral),
            other => Err(format!("unknown view '{}' (expected front or lateral)", other)),
        }
    }
}

/// A decoded RGB24 frame.
pub struct Frame {
    /// Zero-based position in its source stream.
    pub index: u64,
    pub view: View,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, view: View, image: RgbImage) -> Self {
        Self { index, view, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Box covering the whole frame.
    pub fn full_box(&self) -> BoundingBox {
        BoundingBox::new(0.0, 0.0, self.width() as f32, self.height() as f32)
    }
}

/// Axis-aligned box in pixel coordinates. `x2`/`y2` are exclusive edges.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from center form, as emitted by YOLO-style heads.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer pixel region `(x, y, w, h)` after widening both horizontal
    /// edges by `bias` and clamping to a `width × height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn pixel_region(&self, bias: u32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let bias = bias as f32;
        let x1 = (self.x1 - bias).floor().clamp(0.0, width as f32) as u32;
        let x2 = (self.x2 + bias).ceil().clamp(0.0, width as f32) as u32;
        let y1 = self.y1.floor().clamp(0.0, height as f32) as u32;
        let y2 = self.y2.ceil().clamp(0.0, height as f32) as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_size() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(b.width(), 20.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!(b.center_x(), 20.0);
        assert_eq!(b.center_y(), 40.0);
        assert_eq!(BoundingBox::from_center(20.0, 40.0, 20.0, 40.0), b);
    }

    #[test]
    fn pixel_region_applies_bias_and_clamps() {
        let b = BoundingBox::new(5.0, 2.0, 20.5, 18.0);
        assert_eq!(b.pixel_region(10, 100, 100), Some((0, 2, 31, 16)));
        assert_eq!(b.pixel_region(10, 25, 10), Some((0, 2, 25, 8)));
    }

    #[test]
    fn pixel_region_outside_frame_is_none() {
        let b = BoundingBox::new(200.0, 0.0, 260.0, 50.0);
        assert_eq!(b.pixel_region(0, 100, 100), None);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn view_parses_aliases() {
        assert_eq!("ap".parse::<View>().unwrap(), View::Front);
        assert_eq!("LAT".parse::<View>().unwrap(), View::Lateral);
        assert!("top".parse::<View>().is_err());
    }
}
