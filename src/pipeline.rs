//! One front/lateral pair, end to end.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};

use crate::config::SegmenterConfig;
use crate::detect::DetectorBackend;
use crate::frame::View;
use crate::ingest::{FrameSource, VideoConfig, VideoSource};
use crate::manifest::PairManifest;
use crate::segment::{DirectorySegmentStore, Segmenter};

/// Frame rates closer than this are treated as equal.
const FPS_TOLERANCE: f64 = 0.01;

/// Segment the pair `front`/`lateral` into `out_dir`.
///
/// Inputs are local paths or `stub://` URLs. Persisted segments land in
/// `out_dir/segment{i}/`, and `out_dir/segments.json` describes the run.
/// Output videos use the front view's frame rate.
///
/// Segment directories and the manifest of an earlier run in `out_dir` are
/// replaced. If the run fails partway, the segments it already committed are
/// removed again, so a failed pair leaves no segment output behind.
pub fn process_pair(
    config: &SegmenterConfig,
    detector: &mut dyn DetectorBackend,
    front: &str,
    lateral: &str,
    out_dir: &Path,
    stop: Option<&AtomicBool>,
) -> Result<PairManifest> {
    let mut front_source = VideoSource::open(VideoConfig::new(front, View::Front))
        .with_context(|| format!("failed to open front view {}", front))?;
    let mut lateral_source = VideoSource::open(VideoConfig::new(lateral, View::Lateral))
        .with_context(|| format!("failed to open lateral view {}", lateral))?;

    let frame_rate = front_source.frame_rate();
    if (frame_rate - lateral_source.frame_rate()).abs() > FPS_TOLERANCE {
        log::warn!(
            "front view runs at {:.3} fps but lateral at {:.3} fps; writing both at {:.3}",
            frame_rate,
            lateral_source.frame_rate(),
            frame_rate
        );
    }

    let mut store = DirectorySegmentStore::new(out_dir, &config.output, frame_rate)?;
    PairManifest::remove(store.root())?;
    let detector_name = detector.name().to_string();
    let mut segmenter = Segmenter::new(config, detector);
    if let Some(stop) = stop {
        segmenter = segmenter.with_stop_flag(stop);
    }
    let report = match segmenter.run(&mut front_source, &mut lateral_source, &mut store) {
        Ok(report) => report,
        Err(err) => {
            match store.clear_segments() {
                Ok(removed) if removed > 0 => {
                    log::warn!("removed {} segments of the failed pair", removed)
                }
                Ok(_) => {}
                Err(cleanup) => log::warn!("{:#}", cleanup),
            }
            return Err(err);
        }
    };

    let manifest = PairManifest {
        front: front.to_string(),
        lateral: lateral.to_string(),
        frame_rate,
        target_size: config.output.target_size,
        format: config.output.format,
        detector: detector_name,
        direction_view: config.segmentation.direction_view,
        min_frames: config.segmentation.min_frames,
        report,
    };
    manifest.write(store.root())?;
    Ok(manifest)
}
