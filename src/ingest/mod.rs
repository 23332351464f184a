//! Frame ingestion sources.
//!
//! This module provides the two input streams of a session:
//! - Local video files decoded with FFmpeg (feature: ingest-file-ffmpeg)
//! - Local YUV4MPEG2 files
//! - Synthetic `stub://` streams (tests, smoke runs)
//!
//! Both views are read in lock-step by the segmenter, one frame from each per
//! iteration, through the `FrameSource` trait.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod synthetic;
mod y4m;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{VideoConfig, VideoSource, VideoStats};
pub use synthetic::{SyntheticConfig, SyntheticKind};

/// A sequential stream of decoded frames from one view.
pub trait FrameSource {
    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Nominal frames per second.
    fn frame_rate(&self) -> f64;

    /// Frame dimensions `(width, height)`.
    fn dimensions(&self) -> (u32, u32);

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}
