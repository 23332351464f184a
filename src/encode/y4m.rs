use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::VideoSink;

const FRAME_MARKER: &[u8] = b"FRAME\n";

/// YUV4MPEG2 writer with full-resolution chroma (`C444`).
///
/// Pixels are converted from RGB with BT.601 limited-range coefficients.
pub struct Y4mWriter {
    out: BufWriter<File>,
    width: u32,
    height: u32,
    frames: u64,
    planes: Vec<u8>,
}

impl Y4mWriter {
    pub fn create(path: &Path, fps: f64, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("y4m frame dimensions must be non-zero"));
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        let (num, den) = frame_rate_ratio(fps);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C444",
            width, height, num, den
        )
        .with_context(|| format!("failed to write y4m header to {}", path.display()))?;

        Ok(Self {
            out,
            width,
            height,
            frames: 0,
            planes: vec![0u8; width as usize * height as usize * 3],
        })
    }

    /// Bytes per frame on disk, marker included.
    pub fn frame_len(width: u32, height: u32) -> usize {
        FRAME_MARKER.len() + width as usize * height as usize * 3
    }
}

impl VideoSink for Y4mWriter {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()> {
        if image.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame size {}x{} does not match y4m stream {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }
        rgb_to_yuv444(image, &mut self.planes);
        self.out.write_all(FRAME_MARKER)?;
        self.out.write_all(&self.planes)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.out.flush().context("failed to flush y4m output")?;
        Ok(self.frames)
    }
}

/// Frame rate as the rational Y4M expects: integral rates are `n:1`,
/// NTSC-style rates are `n*1001:1001`.
pub fn frame_rate_ratio(fps: f64) -> (u32, u32) {
    if !(fps > 0.0) {
        return (30, 1);
    }
    if (fps - fps.round()).abs() < 1e-3 {
        (fps.round() as u32, 1)
    } else {
        ((fps * 1001.0).round() as u32, 1001)
    }
}

fn rgb_to_yuv444(image: &RgbImage, planes: &mut [u8]) {
    let plane = image.width() as usize * image.height() as usize;
    let (y_plane, chroma) = planes.split_at_mut(plane);
    let (u_plane, v_plane) = chroma.split_at_mut(plane);
    for (i, pixel) in image.pixels().enumerate() {
        let r = pixel[0] as f32;
        let g = pixel[1] as f32;
        let b = pixel[2] as f32;
        y_plane[i] = clamp_to_u8(16.0 + (65.481 * r + 128.553 * g + 24.966 * b) / 255.0);
        u_plane[i] = clamp_to_u8(128.0 + (-37.797 * r - 74.203 * g + 112.0 * b) / 255.0);
        v_plane[i] = clamp_to_u8(128.0 + (112.0 * r - 93.786 * g - 18.214 * b) / 255.0);
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn writes_header_and_frames() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.y4m");
        let mut sink: Box<dyn VideoSink> = Box::new(Y4mWriter::create(&path, 30.0, 4, 2)?);
        sink.write_frame(&RgbImage::new(4, 2))?;
        sink.write_frame(&RgbImage::from_pixel(4, 2, Rgb([255, 255, 255])))?;
        assert_eq!(sink.finish()?, 2);

        let bytes = std::fs::read(&path)?;
        let header = b"YUV4MPEG2 W4 H2 F30:1 Ip A1:1 C444\n";
        assert!(bytes.starts_with(header));
        assert_eq!(bytes.len(), header.len() + 2 * Y4mWriter::frame_len(4, 2));

        let first = &bytes[header.len() + FRAME_MARKER.len()..];
        assert_eq!(&first[..8], &[16; 8]);
        assert_eq!(&first[8..24], &[128; 16]);
        let second = &bytes[header.len() + Y4mWriter::frame_len(4, 2) + FRAME_MARKER.len()..];
        assert_eq!(&second[..8], &[235; 8]);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = Y4mWriter::create(&dir.path().join("x.y4m"), 25.0, 8, 8)?;
        assert!(writer.write_frame(&RgbImage::new(4, 4)).is_err());
        Ok(())
    }

    #[test]
    fn frame_rate_ratios() {
        assert_eq!(frame_rate_ratio(30.0), (30, 1));
        assert_eq!(frame_rate_ratio(29.97), (30000, 1001));
        assert_eq!(frame_rate_ratio(0.0), (30, 1));
    }
}
