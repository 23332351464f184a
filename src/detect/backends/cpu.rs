use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::{BoundingBox, Frame};

const DEFAULT_LUMA_THRESHOLD: u8 = 128;
const DEFAULT_MIN_PIXELS: usize = 4;
const FOREGROUND_CONFIDENCE: f32 = 0.9;

/// CPU backend that reports the bounding box of bright foreground pixels as a
/// single person.
///
/// Meant for synthetic `stub://walker` input (a bright figure on a black
/// background) and for smoke runs without a model file.
pub struct CpuBackend {
    luma_threshold: u8,
    min_pixels: usize,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            min_pixels: DEFAULT_MIN_PIXELS,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut count = 0usize;

        for (x, y, pixel) in frame.image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
            if luma > self.luma_threshold as u32 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                count += 1;
            }
        }

        if count < self.min_pixels {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as f32,
            min_y as f32,
            (max_x + 1) as f32,
            (max_y + 1) as f32,
        );
        Ok(vec![Detection::person(bbox, FOREGROUND_CONFIDENCE)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::View;
    use image::{Rgb, RgbImage};

    #[test]
    fn cpu_backend_boxes_bright_region() {
        let mut image = RgbImage::new(32, 24);
        for y in 5..15 {
            for x in 8..12 {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let frame = Frame::new(0, View::Front, image);
        let mut backend = CpuBackend::new();

        let dets = backend.detect(&frame).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(8.0, 5.0, 12.0, 15.0));
        assert_eq!(dets[0].confidence, FOREGROUND_CONFIDENCE);
    }

    #[test]
    fn cpu_backend_ignores_dark_frames() {
        let frame = Frame::new(0, View::Lateral, RgbImage::new(16, 16));
        let mut backend = CpuBackend::new();
        assert!(backend.detect(&frame).unwrap().is_empty());
    }
}
