//! YUV4MPEG2 file source.
//!
//! Reads the `C444` streams written by `encode::Y4mWriter`, so segment
//! outputs can be fed back in without FFmpeg. Subsampled chroma is rejected.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use crate::frame::{Frame, View};

const SIGNATURE: &str = "YUV4MPEG2";

pub(crate) struct Y4mFileSource {
    path: String,
    view: View,
    reader: BufReader<File>,
    width: u32,
    height: u32,
    frame_rate: f64,
    frame_count: u64,
    planes: Vec<u8>,
}

impl Y4mFileSource {
    pub(crate) fn open(path: &str, view: View) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
        let mut reader = BufReader::new(file);
        let mut header = String::new();
        reader
            .read_line(&mut header)
            .with_context(|| format!("failed to read y4m header from {}", path))?;
        let header = header.trim_end();
        let mut params = header.split(' ');
        if params.next() != Some(SIGNATURE) {
            return Err(anyhow!("{} is not a YUV4MPEG2 file", path));
        }

        let (mut width, mut height, mut frame_rate) = (0u32, 0u32, 30.0);
        let mut colorspace = "420jpeg";
        for param in params.filter(|p| p.is_char_boundary(1)) {
            let (tag, value) = param.split_at(1);
            match tag {
                "W" => width = value.parse().map_err(|_| anyhow!("bad y4m width '{}'", value))?,
                "H" => height = value.parse().map_err(|_| anyhow!("bad y4m height '{}'", value))?,
                "F" => frame_rate = parse_rate(value)?,
                "C" => colorspace = value,
                _ => {}
            }
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("{}: y4m header has no frame size", path));
        }
        if !colorspace.starts_with("444") {
            return Err(anyhow!(
                "{}: y4m colorspace C{} is not supported (only C444)",
                path,
                colorspace
            ));
        }

        log::info!(
            "VideoSource: opened {} ({}x{} @ {:.2} fps, {} view, y4m)",
            path,
            width,
            height,
            frame_rate,
            view
        );
        Ok(Self {
            path: path.to_string(),
            view,
            reader,
            width,
            height,
            frame_rate,
            frame_count: 0,
            planes: vec![0u8; width as usize * height as usize * 3],
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut marker = String::new();
        let read = self
            .reader
            .read_line(&mut marker)
            .with_context(|| format!("failed to read frame marker from {}", self.path))?;
        if read == 0 {
            return Ok(None);
        }
        if !marker.starts_with("FRAME") {
            return Err(anyhow!(
                "{}: expected FRAME marker at frame {}",
                self.path,
                self.frame_count
            ));
        }
        self.reader.read_exact(&mut self.planes).with_context(|| {
            format!("{}: truncated frame {}", self.path, self.frame_count)
        })?;

        let image = yuv444_to_rgb(&self.planes, self.width, self.height);
        let index = self.frame_count;
        self.frame_count += 1;
        Ok(Some(Frame::new(index, self.view, image)))
    }

    pub(crate) fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn frames_decoded(&self) -> u64 {
        self.frame_count
    }
}

pub(crate) fn is_y4m(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".y4m")
}

fn parse_rate(value: &str) -> Result<f64> {
    let (num, den) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("bad y4m frame rate '{}'", value))?;
    let num: f64 = num.parse().map_err(|_| anyhow!("bad y4m frame rate '{}'", value))?;
    let den: f64 = den.parse().map_err(|_| anyhow!("bad y4m frame rate '{}'", value))?;
    if num <= 0.0 || den <= 0.0 {
        return Err(anyhow!("bad y4m frame rate '{}'", value));
    }
    Ok(num / den)
}

// Inverse of the BT.601 limited-range conversion used by the writer.
fn yuv444_to_rgb(planes: &[u8], width: u32, height: u32) -> RgbImage {
    let plane = width as usize * height as usize;
    let (y_plane, chroma) = planes.split_at(plane);
    let (u_plane, v_plane) = chroma.split_at(plane);
    let mut image = RgbImage::new(width, height);
    for (i, pixel) in image.pixels_mut().enumerate() {
        let y = (y_plane[i] as f32 - 16.0) * 255.0 / 219.0;
        let u = (u_plane[i] as f32 - 128.0) * 255.0 / 224.0;
        let v = (v_plane[i] as f32 - 128.0) * 255.0 / 224.0;
        let r = y + 1.402 * v;
        let g = y - 0.344_136 * u - 0.714_136 * v;
        let b = y + 1.772 * u;
        *pixel = Rgb([to_u8(r), to_u8(g), to_u8(b)]);
    }
    image
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{VideoSink, Y4mWriter};

    #[test]
    fn reads_back_writer_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.y4m");
        let mut writer = Box::new(Y4mWriter::create(&path, 25.0, 6, 4)?);
        let grey = RgbImage::from_pixel(6, 4, Rgb([235, 235, 235]));
        let red = RgbImage::from_pixel(6, 4, Rgb([200, 30, 30]));
        writer.write_frame(&grey)?;
        writer.write_frame(&red)?;
        writer.finish()?;

        let path = path.to_string_lossy().to_string();
        let mut source = Y4mFileSource::open(&path, View::Front)?;
        assert_eq!(source.dimensions(), (6, 4));
        assert_eq!(source.frame_rate(), 25.0);

        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.index, 0);
        for channel in first.image.get_pixel(3, 2).0 {
            assert!((channel as i32 - 235).abs() <= 2, "{}", channel);
        }
        let second = source.next_frame()?.expect("second frame");
        let px = second.image.get_pixel(0, 0).0;
        assert!((px[0] as i32 - 200).abs() <= 3 && (px[1] as i32 - 30).abs() <= 3);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.frames_decoded(), 2);
        Ok(())
    }

    #[test]
    fn rejects_subsampled_chroma() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("420.y4m");
        std::fs::write(&path, b"YUV4MPEG2 W4 H4 F30:1 Ip C420jpeg\n")?;
        assert!(Y4mFileSource::open(&path.to_string_lossy(), View::Lateral).is_err());
        Ok(())
    }

    #[test]
    fn parses_ntsc_rate() {
        assert!((parse_rate("30000:1001").unwrap() - 29.97).abs() < 1e-2);
        assert!(parse_rate("0:1").is_err());
    }
}
