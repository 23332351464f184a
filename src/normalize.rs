//! Crop + letterbox normalization.
//!
//! Both views are cut down to the tracked subject and fitted into a square
//! canvas, aspect ratio preserved, content centered, borders black.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::BoundingBox;

/// Where scaled content landed on a letterboxed canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Map a box from canvas coordinates back to the source image, clamped to
    /// `width × height`.
    pub fn to_source(&self, bbox: &BoundingBox, width: u32, height: u32) -> BoundingBox {
        let unmap = |v: f32, pad: u32, max: u32| {
            ((v - pad as f32) / self.scale).clamp(0.0, max as f32)
        };
        BoundingBox::new(
            unmap(bbox.x1, self.pad_x, width),
            unmap(bbox.y1, self.pad_y, height),
            unmap(bbox.x2, self.pad_x, width),
            unmap(bbox.y2, self.pad_y, height),
        )
    }
}

/// Fit `image` into a black `target × target` canvas.
///
/// Content that already has the scaled size is copied as-is rather than
/// resampled.
pub fn letterbox(image: &RgbImage, target: u32) -> (RgbImage, Letterbox) {
    let (w, h) = image.dimensions();
    let mut canvas = RgbImage::new(target, target);
    if w == 0 || h == 0 || target == 0 {
        return (
            canvas,
            Letterbox {
                scale: 1.0,
                pad_x: 0,
                pad_y: 0,
            },
        );
    }

    let scale = (target as f64 / w as f64).min(target as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, target);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, target);
    let pad_x = (target - new_w) / 2;
    let pad_y = (target - new_h) / 2;

    if (new_w, new_h) == (w, h) {
        imageops::replace(&mut canvas, image, pad_x as i64, pad_y as i64);
    } else {
        let scaled = imageops::resize(image, new_w, new_h, FilterType::Triangle);
        imageops::replace(&mut canvas, &scaled, pad_x as i64, pad_y as i64);
    }

    (
        canvas,
        Letterbox {
            scale: scale as f32,
            pad_x,
            pad_y,
        },
    )
}

/// Crop `image` to `bbox` (widened horizontally by `crop_bias` pixels and
/// clamped to the frame) and letterbox the crop to `target × target`.
///
/// A box with no overlap with the frame produces an all-black canvas.
pub fn normalize(image: &RgbImage, bbox: &BoundingBox, target: u32, crop_bias: u32) -> RgbImage {
    let Some((x, y, w, h)) = bbox.pixel_region(crop_bias, image.width(), image.height()) else {
        return RgbImage::new(target, target);
    };
    if (x, y, w, h) == (0, 0, image.width(), image.height()) {
        return letterbox(image, target).0;
    }
    let crop = imageops::crop_imm(image, x, y, w, h).to_image();
    letterbox(&crop, target).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn output_is_always_square_target() {
        let image = gradient(640, 360);
        let boxes = [
            BoundingBox::new(100.0, 20.0, 160.0, 340.0),
            BoundingBox::new(0.0, 100.0, 640.0, 120.0),
            BoundingBox::new(630.0, 0.0, 700.0, 10.0),
            BoundingBox::new(-50.0, -50.0, 5000.0, 5000.0),
            BoundingBox::new(900.0, 900.0, 950.0, 950.0),
        ];
        for bbox in &boxes {
            for target in [64, 224, 512] {
                let out = normalize(&image, bbox, target, 10);
                assert_eq!(out.dimensions(), (target, target), "bbox {:?}", bbox);
            }
        }
    }

    #[test]
    fn tall_crop_is_centered_horizontally_with_black_bars() {
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let bbox = BoundingBox::new(50.0, 0.0, 100.0, 200.0);
        let out = normalize(&image, &bbox, 100, 0);

        // 50×200 scales to 25×100, padded 37 px on the left.
        assert_eq!(*out.get_pixel(0, 50), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(99, 50), Rgb([0, 0, 0]));
        assert!(out.get_pixel(50, 0)[0] > 200);
        assert!(out.get_pixel(50, 99)[0] > 200);
    }

    #[test]
    fn normalize_is_idempotent_on_normalized_frames() {
        let image = gradient(640, 480);
        let bbox = BoundingBox::new(200.0, 40.0, 320.0, 460.0);
        let once = normalize(&image, &bbox, 512, 10);
        let full = BoundingBox::new(0.0, 0.0, 512.0, 512.0);
        let twice = normalize(&once, &full, 512, 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_overlap_is_black() {
        let image = gradient(64, 64);
        let out = normalize(&image, &BoundingBox::new(100.0, 100.0, 120.0, 120.0), 32, 10);
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn letterbox_maps_back_to_source() {
        let image = gradient(640, 320);
        let (canvas, placement) = letterbox(&image, 320);
        assert_eq!(canvas.dimensions(), (320, 320));
        assert_eq!(placement.pad_x, 0);
        assert_eq!(placement.pad_y, 80);

        let on_canvas = BoundingBox::new(50.0, 90.0, 100.0, 200.0);
        let source = placement.to_source(&on_canvas, 640, 320);
        assert_eq!(source, BoundingBox::new(100.0, 20.0, 200.0, 240.0));
    }
}
