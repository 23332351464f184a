//! Segment video writers.
//!
//! - Y4M (`.y4m`): uncompressed YUV4MPEG2, no native dependencies
//! - MP4 (`.mp4`): MPEG-4 Part 2 via FFmpeg (feature: encode-ffmpeg)

#[cfg(feature = "encode-ffmpeg")]
mod ffmpeg;
mod y4m;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use y4m::{frame_rate_ratio, Y4mWriter};

/// A sink accepting fixed-size RGB frames for one output video.
pub trait VideoSink {
    fn write_frame(&mut self, image: &RgbImage) -> Result<()>;

    /// Flush and finalize the file. Returns the number of frames written.
    fn finish(self: Box<Self>) -> Result<u64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Y4m,
    Mp4,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Y4m => "y4m",
            VideoFormat::Mp4 => "mp4",
        }
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        if cfg!(feature = "encode-ffmpeg") {
            VideoFormat::Mp4
        } else {
            VideoFormat::Y4m
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "y4m" | "yuv4mpeg" => Ok(VideoFormat::Y4m),
            "mp4" => Ok(VideoFormat::Mp4),
            other => Err(format!("unknown video format '{}' (expected y4m or mp4)", other)),
        }
    }
}

/// Open a writer for a `size × size` video at `fps`.
pub fn open_sink(
    path: &Path,
    format: VideoFormat,
    fps: f64,
    size: u32,
) -> Result<Box<dyn VideoSink>> {
    match format {
        VideoFormat::Y4m => Ok(Box::new(Y4mWriter::create(path, fps, size, size)?)),
        VideoFormat::Mp4 => open_mp4(path, fps, size),
    }
}

#[cfg(feature = "encode-ffmpeg")]
fn open_mp4(path: &Path, fps: f64, size: u32) -> Result<Box<dyn VideoSink>> {
    Ok(Box::new(ffmpeg::Mp4Writer::create(path, fps, size, size)?))
}

#[cfg(not(feature = "encode-ffmpeg"))]
fn open_mp4(path: &Path, _fps: f64, _size: u32) -> Result<Box<dyn VideoSink>> {
    Err(anyhow::anyhow!(
        "writing {} requires the encode-ffmpeg feature",
        path.display()
    ))
}
