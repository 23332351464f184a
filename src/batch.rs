//! Batch processing of a directory tree of sessions.
//!
//! A session is any directory holding both input files (`full_ap.mp4` and
//! `full_lat.mp4` by default). Output mirrors the input layout: the session
//! `<input>/a/b` is segmented into `<output>/a/b`. Pairs run one after another;
//! a failing pair is logged and recorded, and the batch moves on.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::config::{InputSettings, SegmenterConfig};
use crate::detect::DetectorBackend;
use crate::manifest::{BatchEntry, BatchSummary, PairStatus};
use crate::pipeline::process_pair;
use crate::ui::Ui;

/// One session found under the input root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionPair {
    /// Session directory relative to the input root (empty for the root).
    pub relative: PathBuf,
    pub front: PathBuf,
    pub lateral: PathBuf,
}

impl SessionPair {
    pub fn label(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.relative.to_string_lossy().replace('\\', "/")
        }
    }
}

/// Find every session under `root`, sorted by relative path.
///
/// Directories with only one of the two files are skipped with a warning.
/// Symlinked directories are not followed.
pub fn discover_pairs(root: &Path, input: &InputSettings) -> Result<Vec<SessionPair>> {
    if !root.is_dir() {
        return Err(anyhow::anyhow!(
            "input root {} is not a directory",
            root.display()
        ));
    }
    let mut pairs = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut front = None;
        let mut lateral = None;
        let entries =
            fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            let name = entry.file_name();
            if name == input.front_file.as_str() {
                front = Some(path);
            } else if name == input.lateral_file.as_str() {
                lateral = Some(path);
            }
        }

        match (front, lateral) {
            (Some(front), Some(lateral)) => {
                let relative = dir.strip_prefix(root).unwrap_or(Path::new("")).to_path_buf();
                pairs.push(SessionPair {
                    relative,
                    front,
                    lateral,
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                log::warn!(
                    "{}: only one of {} / {} present, skipping",
                    dir.display(),
                    input.front_file,
                    input.lateral_file
                );
            }
            (None, None) => {}
        }
    }
    pairs.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(pairs)
}

/// List the sessions under `input_root` and where their output would go,
/// without processing anything.
pub fn plan_batch(
    config: &SegmenterConfig,
    input_root: &Path,
    output_root: &Path,
) -> Result<BatchSummary> {
    let pairs = discover_pairs(input_root, &config.input)?;
    let mut summary = BatchSummary::default();
    for pair in &pairs {
        println!(
            "{} -> {}",
            pair.label(),
            output_root.join(&pair.relative).display()
        );
        summary.entries.push(BatchEntry {
            session: pair.label(),
            status: PairStatus::Planned,
            persisted: 0,
            discarded: 0,
            error: None,
        });
    }
    Ok(summary)
}

/// Segment every session under `input_root` into `output_root` and write
/// `output_root/batch_summary.json`.
pub fn run_batch(
    config: &SegmenterConfig,
    detector: &mut dyn DetectorBackend,
    input_root: &Path,
    output_root: &Path,
    ui: &Ui,
    stop: Option<&AtomicBool>,
) -> Result<BatchSummary> {
    let pairs = {
        let mut stage = ui.stage("Discover sessions");
        let pairs = discover_pairs(input_root, &config.input)?;
        stage.finish_with(format!("{} found", pairs.len()));
        pairs
    };

    let mut summary = BatchSummary::default();
    fs::create_dir_all(output_root)
        .with_context(|| format!("failed to create {}", output_root.display()))?;
    for (i, pair) in pairs.iter().enumerate() {
        if stop.is_some_and(|stop| stop.load(Ordering::SeqCst)) {
            log::warn!("stop requested; {} sessions left unprocessed", pairs.len() - i);
            summary.interrupted = true;
            break;
        }

        let label = pair.label();
        let mut stage = ui.stage(&format!("[{}/{}] {}", i + 1, pairs.len(), label));
        let out_dir = output_root.join(&pair.relative);
        let result = process_pair(
            config,
            detector,
            &pair.front.to_string_lossy(),
            &pair.lateral.to_string_lossy(),
            &out_dir,
            stop,
        );
        let entry = match result {
            Ok(manifest) => {
                let persisted = manifest.report.persisted.len();
                stage.finish_with(format!("{} segments", persisted));
                if manifest.report.interrupted {
                    summary.interrupted = true;
                }
                BatchEntry {
                    session: label,
                    status: PairStatus::Done,
                    persisted,
                    discarded: manifest.report.discarded.len(),
                    error: None,
                }
            }
            Err(err) => {
                log::error!("{}: {:#}", label, err);
                stage.fail("failed");
                BatchEntry {
                    session: label,
                    status: PairStatus::Failed,
                    persisted: 0,
                    discarded: 0,
                    error: Some(format!("{:#}", err)),
                }
            }
        };
        summary.entries.push(entry);
    }

    summary.write(output_root)?;
    log::info!(
        "batch finished: {} done, {} failed, {} segments persisted",
        summary.count(PairStatus::Done),
        summary.count(PairStatus::Failed),
        summary.segments_persisted()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn discovers_nested_sessions_in_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        for session in ["walk/b", "walk/a", "other/deep/c"] {
            touch(&root.join(session).join("full_ap.mp4"));
            touch(&root.join(session).join("full_lat.mp4"));
        }
        touch(&root.join("lonely").join("full_ap.mp4"));
        touch(&root.join("walk").join("notes.txt"));

        let pairs = discover_pairs(root, &InputSettings::default())?;
        let labels: Vec<_> = pairs.iter().map(|p| p.label()).collect();
        assert_eq!(labels, vec!["other/deep/c", "walk/a", "walk/b"]);
        assert_eq!(pairs[1].front, root.join("walk/a/full_ap.mp4"));
        assert_eq!(pairs[1].lateral, root.join("walk/a/full_lat.mp4"));
        Ok(())
    }

    #[test]
    fn root_itself_can_be_a_session() -> Result<()> {
        let dir = tempfile::tempdir()?;
        touch(&dir.path().join("full_ap.mp4"));
        touch(&dir.path().join("full_lat.mp4"));
        let pairs = discover_pairs(dir.path(), &InputSettings::default())?;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].label(), ".");
        Ok(())
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(discover_pairs(Path::new("/nonexistent/gait"), &InputSettings::default()).is_err());
    }
}
