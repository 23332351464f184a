//! Local video source.
//!
//! `VideoSource` reads one view of a session from one of:
//! - a local video file decoded in-memory with FFmpeg
//! - a local `.y4m` file (no FFmpeg needed)
//! - a synthetic `stub://` URL (see `synthetic`)
//!
//! Remote URLs are rejected; sessions are always processed from local disk.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{is_synthetic, SyntheticConfig, SyntheticSource};
use super::y4m::{is_y4m, Y4mFileSource};
use super::FrameSource;
use crate::frame::{Frame, View};

/// Configuration for one view's video source.
#[derive(Clone, Debug)]
pub struct VideoConfig {
    /// Local file path or `stub://` URL.
    pub path: String,
    pub view: View,
}

impl VideoConfig {
    pub fn new(path: impl Into<String>, view: View) -> Self {
        Self {
            path: path.into(),
            view,
        }
    }
}

/// Video source for one view.
pub struct VideoSource {
    path: String,
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticSource),
    Y4m(Y4mFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoSource {
    pub fn open(config: VideoConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "video input only supports local paths (no URL schemes): {}",
                config.path
            ));
        }
        let backend = if is_synthetic(&config.path) {
            let synthetic = SyntheticConfig::parse(&config.path)?;
            log::debug!("VideoSource: {} (synthetic, {:?})", config.path, synthetic.kind);
            VideoBackend::Synthetic(SyntheticSource::new(synthetic, config.view))
        } else if is_y4m(&config.path) {
            VideoBackend::Y4m(Y4mFileSource::open(&config.path, config.view)?)
        } else {
            open_file_backend(&config)?
        };
        Ok(Self {
            path: config.path,
            backend,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn stats(&self) -> VideoStats {
        let frames_read = match &self.backend {
            VideoBackend::Synthetic(source) => source.frames_emitted(),
            VideoBackend::Y4m(source) => source.frames_decoded(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.frames_decoded(),
        };
        VideoStats {
            frames_read,
            path: self.path.clone(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_file_backend(config: &VideoConfig) -> Result<VideoBackend> {
    Ok(VideoBackend::Ffmpeg(FfmpegFileSource::open(
        &config.path,
        config.view,
    )?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_file_backend(config: &VideoConfig) -> Result<VideoBackend> {
    Err(anyhow!(
        "decoding {} requires the ingest-file-ffmpeg feature",
        config.path
    ))
}

impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => Ok(source.next_frame()),
            VideoBackend::Y4m(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn frame_rate(&self) -> f64 {
        match &self.backend {
            VideoBackend::Synthetic(source) => source.config().fps,
            VideoBackend::Y4m(source) => source.frame_rate(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.frame_rate(),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            VideoBackend::Synthetic(source) => (source.config().width, source.config().height),
            VideoBackend::Y4m(source) => source.dimensions(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.dimensions(),
        }
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

/// Statistics for a video source.
#[derive(Clone, Debug)]
pub struct VideoStats {
    pub frames_read: u64,
    pub path: String,
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_synthetic(path) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_and_empty_paths() {
        assert!(VideoSource::open(VideoConfig::new("rtsp://camera/stream", View::Front)).is_err());
        assert!(VideoSource::open(VideoConfig::new("  ", View::Front)).is_err());
    }

    #[test]
    fn synthetic_source_reports_rate_and_size() {
        let url = "stub://blank?frames=3&width=8&height=6&fps=25";
        let mut source = VideoSource::open(VideoConfig::new(url, View::Lateral)).unwrap();
        assert_eq!(source.frame_rate(), 25.0);
        assert_eq!(source.dimensions(), (8, 6));

        let mut count = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.view, View::Lateral);
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.stats().frames_read, 3);
    }
}
