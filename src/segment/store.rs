//! Where segment frames go.
//!
//! The segmenter only sees `SegmentStore`/`SegmentWriter`; the directory
//! store stages each segment under `segment{i}.partial/` and renames it to
//! `segment{i}/` on commit, so an interrupted run never leaves a half-written
//! segment that looks complete.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::config::OutputSettings;
use crate::encode::{open_sink, VideoFormat, VideoSink};

use super::Segment;

const STAGING_SUFFIX: &str = ".partial";

/// Final location of a committed segment's two videos.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFiles {
    pub front: PathBuf,
    pub lateral: PathBuf,
}

/// Opens one writer per segment.
pub trait SegmentStore {
    fn begin(&mut self, segment: &Segment) -> Result<Box<dyn SegmentWriter>>;
}

/// Receives the normalized frame pairs of one open segment.
///
/// Exactly one of `commit` or `discard` is called when the segment closes.
pub trait SegmentWriter {
    fn write(&mut self, front: &RgbImage, lateral: &RgbImage) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<SegmentFiles>;

    fn discard(self: Box<Self>) -> Result<()>;
}

/// Segment store writing `segment{i}/{front}_{i}.{ext}` and
/// `segment{i}/{lateral}_{i}.{ext}` under a root directory.
///
/// The root only ever holds segments of the current run: existing
/// `segment{i}` and `segment{i}.partial` directories are removed when the
/// store is created.
pub struct DirectorySegmentStore {
    root: PathBuf,
    format: VideoFormat,
    fps: f64,
    size: u32,
    front_name: String,
    lateral_name: String,
}

impl DirectorySegmentStore {
    pub fn new(root: impl Into<PathBuf>, output: &OutputSettings, fps: f64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create output directory {}", root.display()))?;
        let store = Self {
            root,
            format: output.format,
            fps,
            size: output.target_size,
            front_name: output.front_name.clone(),
            lateral_name: output.lateral_name.clone(),
        };
        let removed = store.clear_segments()?;
        if removed > 0 {
            log::warn!(
                "removed {} segment directories left in {} by an earlier run",
                removed,
                store.root.display()
            );
        }
        Ok(store)
    }

    /// Remove every `segment{i}` and `segment{i}.partial` directory under the
    /// root. Returns how many were removed.
    pub fn clear_segments(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?;
        let mut removed = 0;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list {}", self.root.display()))?;
            let name = entry.file_name();
            let is_segment = name.to_str().is_some_and(is_segment_dir_name);
            if !is_segment || !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final directory of segment `index`.
    pub fn segment_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("segment{}", index))
    }

    fn file_name(&self, prefix: &str, index: u32) -> String {
        format!("{}_{}.{}", prefix, index, self.format.extension())
    }
}

fn is_segment_dir_name(name: &str) -> bool {
    let index = name.strip_prefix("segment").unwrap_or("");
    let index = index.strip_suffix(STAGING_SUFFIX).unwrap_or(index);
    !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
}

impl SegmentStore for DirectorySegmentStore {
    fn begin(&mut self, segment: &Segment) -> Result<Box<dyn SegmentWriter>> {
        let final_dir = self.segment_dir(segment.index);
        let staging = self
            .root
            .join(format!("segment{}{}", segment.index, STAGING_SUFFIX));
        // Leftovers from an earlier run with the same index.
        for dir in [&staging, &final_dir] {
            if dir.exists() {
                fs::remove_dir_all(dir)
                    .with_context(|| format!("failed to clear {}", dir.display()))?;
            }
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;

        let front_file = self.file_name(&self.front_name, segment.index);
        let lateral_file = self.file_name(&self.lateral_name, segment.index);
        let front = open_sink(&staging.join(&front_file), self.format, self.fps, self.size)?;
        let lateral = open_sink(&staging.join(&lateral_file), self.format, self.fps, self.size)?;

        log::debug!("segment {} staged in {}", segment.index, staging.display());
        Ok(Box::new(DirectorySegmentWriter {
            staging,
            final_dir,
            front_file,
            lateral_file,
            front: Some(front),
            lateral: Some(lateral),
            closed: false,
        }))
    }
}

struct DirectorySegmentWriter {
    staging: PathBuf,
    final_dir: PathBuf,
    front_file: String,
    lateral_file: String,
    front: Option<Box<dyn VideoSink>>,
    lateral: Option<Box<dyn VideoSink>>,
    closed: bool,
}

impl DirectorySegmentWriter {
    fn remove_staging(&self) -> Result<()> {
        if self.staging.exists() {
            fs::remove_dir_all(&self.staging)
                .with_context(|| format!("failed to remove {}", self.staging.display()))?;
        }
        Ok(())
    }
}

impl SegmentWriter for DirectorySegmentWriter {
    fn write(&mut self, front: &RgbImage, lateral: &RgbImage) -> Result<()> {
        let (Some(front_sink), Some(lateral_sink)) = (self.front.as_mut(), self.lateral.as_mut())
        else {
            return Err(anyhow!("segment writer is already closed"));
        };
        front_sink.write_frame(front)?;
        lateral_sink.write_frame(lateral)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<SegmentFiles> {
        let (Some(front), Some(lateral)) = (self.front.take(), self.lateral.take()) else {
            return Err(anyhow!("segment writer is already closed"));
        };
        let front_frames = front.finish()?;
        let lateral_frames = lateral.finish()?;
        if front_frames != lateral_frames {
            return Err(anyhow!(
                "segment views out of step: {} front frames, {} lateral frames",
                front_frames,
                lateral_frames
            ));
        }

        fs::rename(&self.staging, &self.final_dir).with_context(|| {
            format!(
                "failed to move {} to {}",
                self.staging.display(),
                self.final_dir.display()
            )
        })?;
        self.closed = true;
        Ok(SegmentFiles {
            front: self.final_dir.join(&self.front_file),
            lateral: self.final_dir.join(&self.lateral_file),
        })
    }

    fn discard(mut self: Box<Self>) -> Result<()> {
        // Finish the encoders first so no handle is open on the files.
        for sink in [self.front.take(), self.lateral.take()].into_iter().flatten() {
            if let Err(err) = sink.finish() {
                log::debug!("finishing discarded segment sink failed: {:#}", err);
            }
        }
        self.closed = true;
        self.remove_staging()
    }
}

impl Drop for DirectorySegmentWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.front.take();
        self.lateral.take();
        if let Err(err) = self.remove_staging() {
            log::warn!("{:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;

    fn settings() -> OutputSettings {
        OutputSettings {
            target_size: 8,
            format: VideoFormat::Y4m,
            ..OutputSettings::default()
        }
    }

    fn segment(index: u32) -> Segment {
        Segment {
            index,
            start_frame: 0,
            frame_count: 0,
            direction: Direction::Right,
        }
    }

    #[test]
    fn commit_moves_staging_into_place() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = DirectorySegmentStore::new(dir.path(), &settings(), 30.0)?;
        let mut writer = store.begin(&segment(3))?;
        assert!(dir.path().join("segment3.partial").is_dir());

        let frame = RgbImage::new(8, 8);
        writer.write(&frame, &frame)?;
        let files = writer.commit()?;

        assert!(!dir.path().join("segment3.partial").exists());
        assert_eq!(files.front, dir.path().join("segment3").join("ap_3.y4m"));
        assert_eq!(files.lateral, dir.path().join("segment3").join("lat_3.y4m"));
        assert!(files.front.is_file());
        assert!(files.lateral.is_file());
        Ok(())
    }

    #[test]
    fn discard_and_drop_leave_nothing_behind() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = DirectorySegmentStore::new(dir.path(), &settings(), 30.0)?;

        let writer = store.begin(&segment(0))?;
        writer.discard()?;
        {
            let mut dropped = store.begin(&segment(1))?;
            let frame = RgbImage::new(8, 8);
            dropped.write(&frame, &frame)?;
        }

        let leftovers: Vec<_> = fs::read_dir(dir.path())?.collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
        Ok(())
    }

    #[test]
    fn new_clears_segments_of_an_earlier_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["segment0", "segment7", "segment2.partial", "segments", "notes"] {
            fs::create_dir_all(dir.path().join(name))?;
        }
        fs::write(dir.path().join("segment9"), b"a file, not a segment")?;

        let store = DirectorySegmentStore::new(dir.path(), &settings(), 30.0)?;
        let mut left: Vec<String> = fs::read_dir(store.root())?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<std::io::Result<_>>()?;
        left.sort();
        assert_eq!(left, vec!["notes", "segment9", "segments"]);
        Ok(())
    }

    #[test]
    fn segment_dir_names() {
        assert!(is_segment_dir_name("segment0"));
        assert!(is_segment_dir_name("segment12.partial"));
        assert!(!is_segment_dir_name("segment"));
        assert!(!is_segment_dir_name("segment.partial"));
        assert!(!is_segment_dir_name("segment1a"));
        assert!(!is_segment_dir_name("xsegment1"));
    }

    #[test]
    fn begin_replaces_stale_segment_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("segment0"))?;
        fs::write(dir.path().join("segment0").join("old.txt"), b"stale")?;

        let mut store = DirectorySegmentStore::new(dir.path(), &settings(), 30.0)?;
        let mut writer = store.begin(&segment(0))?;
        let frame = RgbImage::new(8, 8);
        writer.write(&frame, &frame)?;
        writer.commit()?;

        assert!(!dir.path().join("segment0").join("old.txt").exists());
        Ok(())
    }
}
