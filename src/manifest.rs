//! JSON bookkeeping written next to the segment directories.
//!
//! - `segments.json` per processed pair
//! - `batch_summary.json` at the root of a batch output tree

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::encode::VideoFormat;
use crate::frame::View;
use crate::segment::SegmentationReport;

pub const PAIR_MANIFEST_FILE: &str = "segments.json";
pub const BATCH_SUMMARY_FILE: &str = "batch_summary.json";

/// Everything needed to interpret one pair's output directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairManifest {
    pub front: String,
    pub lateral: String,
    pub frame_rate: f64,
    pub target_size: u32,
    pub format: VideoFormat,
    pub detector: String,
    pub direction_view: View,
    pub min_frames: u64,
    pub report: SegmentationReport,
}

impl PairManifest {
    pub fn write(&self, dir: &Path) -> Result<()> {
        write_json(&dir.join(PAIR_MANIFEST_FILE), self)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        read_json(&dir.join(PAIR_MANIFEST_FILE))
    }

    /// Delete `dir/segments.json` if present.
    pub fn remove(dir: &Path) -> Result<()> {
        let path = dir.join(PAIR_MANIFEST_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow!("failed to remove {}: {}", path.display(), e)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Done,
    Failed,
    /// Listed by a dry run, not processed.
    Planned,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Session directory relative to the input root.
    pub session: String,
    pub status: PairStatus,
    #[serde(default)]
    pub persisted: usize,
    #[serde(default)]
    pub discarded: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub entries: Vec<BatchEntry>,
    #[serde(default)]
    pub interrupted: bool,
}

impl BatchSummary {
    pub fn count(&self, status: PairStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn segments_persisted(&self) -> usize {
        self.entries.iter().map(|e| e.persisted).sum()
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        write_json(&dir.join(BATCH_SUMMARY_FILE), self)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        read_json(&dir.join(BATCH_SUMMARY_FILE))
    }
}

// Written to a sibling temp file first so readers never see a partial file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| anyhow!("failed to encode {}: {}", path.display(), e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).map_err(|e| anyhow!("invalid {}: {}", path.display(), e))
}
