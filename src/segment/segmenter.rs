use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::config::{SegmentationConfig, SegmenterConfig};
use crate::detect::{detect_persons, DetectorBackend, SelectionPolicy};
use crate::direction::{Direction, DirectionHistory};
use crate::frame::{BoundingBox, Frame, View};
use crate::ingest::FrameSource;
use crate::normalize::normalize;

use super::store::{SegmentFiles, SegmentStore, SegmentWriter};
use super::Segment;

/// What to do with a frame pair when a view has no usable person.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDetectionPolicy {
    /// Drop the pair from both outputs.
    #[default]
    Skip,
    /// Write the view's full frame, letterboxed.
    PassThrough,
    /// Reuse the view's last selected box; skip if there is none yet.
    CarryForward,
}

impl MissingDetectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingDetectionPolicy::Skip => "skip",
            MissingDetectionPolicy::PassThrough => "pass_through",
            MissingDetectionPolicy::CarryForward => "carry_forward",
        }
    }
}

impl fmt::Display for MissingDetectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingDetectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "skip" => Ok(MissingDetectionPolicy::Skip),
            "pass_through" | "passthrough" => Ok(MissingDetectionPolicy::PassThrough),
            "carry_forward" | "carry" => Ok(MissingDetectionPolicy::CarryForward),
            other => Err(format!(
                "unknown missing-detection policy '{}' (expected skip, pass_through or carry_forward)",
                other
            )),
        }
    }
}

/// A closed segment, persisted or discarded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub index: u32,
    pub direction: Direction,
    pub start_frame: u64,
    /// Source index of the last written frame.
    pub end_frame: u64,
    pub frame_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<SegmentFiles>,
}

/// The two inputs had different lengths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    /// View whose stream ended first.
    pub shorter: View,
    /// Frame pairs read before it ended.
    pub frames_read: u64,
}

/// Outcome of one segmentation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_skipped: u64,
    pub frames_passed_through: u64,
    pub frames_carried_forward: u64,
    /// Usable frames seen before the first segment opened.
    pub frames_unassigned: u64,
    pub persisted: Vec<SegmentRecord>,
    pub discarded: Vec<SegmentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<Truncation>,
    #[serde(default)]
    pub interrupted: bool,
}

/// Drives the segment lifecycle over a pair of synchronized streams.
///
/// Both sources are read in lock-step. For each pair a person box is chosen
/// per view, the direction view's box feeds the direction window, and a
/// change of direction closes the open segment and opens the next one.
/// Every kept pair is normalized and written to the open segment, so the two
/// outputs of a segment always hold the same number of frames.
pub struct Segmenter<'a> {
    config: SegmentationConfig,
    confidence_threshold: f32,
    target_size: u32,
    crop_bias: u32,
    detector: &'a mut dyn DetectorBackend,
    stop: Option<&'a AtomicBool>,
}

impl<'a> Segmenter<'a> {
    pub fn new(config: &SegmenterConfig, detector: &'a mut dyn DetectorBackend) -> Self {
        Self {
            config: config.segmentation.clone(),
            confidence_threshold: config.detection.confidence_threshold,
            target_size: config.output.target_size,
            crop_bias: config.output.crop_bias,
            detector,
            stop: None,
        }
    }

    /// Stop at the next frame boundary once `stop` is set. The open segment
    /// is then closed as if the streams had ended.
    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn run(
        &mut self,
        front: &mut dyn FrameSource,
        lateral: &mut dyn FrameSource,
        store: &mut dyn SegmentStore,
    ) -> Result<SegmentationReport> {
        let mut state = RunState::new(self.config.history_window);

        loop {
            if self.stop.is_some_and(|stop| stop.load(Ordering::SeqCst)) {
                log::warn!(
                    "stop requested after {} frames; closing open segment",
                    state.report.frames_read
                );
                state.report.interrupted = true;
                break;
            }

            let front_frame = front
                .next_frame()
                .with_context(|| format!("failed to read front view {}", front.describe()))?;
            let lateral_frame = lateral
                .next_frame()
                .with_context(|| format!("failed to read lateral view {}", lateral.describe()))?;
            let (front_frame, lateral_frame) = match (front_frame, lateral_frame) {
                (Some(f), Some(l)) => (f, l),
                (None, None) => break,
                (front_frame, _) => {
                    let shorter = if front_frame.is_none() {
                        View::Front
                    } else {
                        View::Lateral
                    };
                    log::warn!(
                        "{} view ended after {} frames while the other view continues; \
                         stopping at the shorter stream",
                        shorter,
                        state.report.frames_read
                    );
                    state.report.truncated = Some(Truncation {
                        shorter,
                        frames_read: state.report.frames_read,
                    });
                    break;
                }
            };

            state.report.frames_read += 1;
            self.step(&mut state, &front_frame, &lateral_frame, store)?;
        }

        state.close_open(self.config.min_frames)?;
        let report = state.report;
        log::info!(
            "{} frame pairs read, {} written, {} skipped; {} segments persisted, {} discarded",
            report.frames_read,
            report.frames_written,
            report.frames_skipped,
            report.persisted.len(),
            report.discarded.len()
        );
        Ok(report)
    }

    fn step(
        &mut self,
        state: &mut RunState,
        front: &Frame,
        lateral: &Frame,
        store: &mut dyn SegmentStore,
    ) -> Result<()> {
        let (front_policy, lateral_policy) =
            (self.config.front_selection, self.config.lateral_selection);
        let front_pick = self.pick(front, front_policy, state.last_front.as_ref())?;
        let lateral_pick = self.pick(lateral, lateral_policy, state.last_lateral.as_ref())?;

        let missing = self.config.missing;
        let placements = (
            Placement::resolve(front_pick, state.last_front, missing),
            Placement::resolve(lateral_pick, state.last_lateral, missing),
        );
        let (Some(front_place), Some(lateral_place)) = placements else {
            log::trace!(
                "frame {}: no person (front: {}, lateral: {}), skipped",
                front.index,
                front_pick.is_some(),
                lateral_pick.is_some()
            );
            state.report.frames_skipped += 1;
            return Ok(());
        };

        if front_pick.is_some() {
            state.last_front = front_pick;
        }
        if lateral_pick.is_some() {
            state.last_lateral = lateral_pick;
        }
        match (front_place, lateral_place) {
            (Placement::FullFrame, _) | (_, Placement::FullFrame) => {
                state.report.frames_passed_through += 1
            }
            (Placement::Carried(_), _) | (_, Placement::Carried(_)) => {
                state.report.frames_carried_forward += 1
            }
            _ => {}
        }

        if state.open.is_none() && self.config.open_at_start {
            state.open_segment(store, front.index, Direction::Unknown)?;
        }

        let tracked = match self.config.direction_view {
            View::Front => front_pick,
            View::Lateral => lateral_pick,
        };
        if let Some(bbox) = tracked {
            state
                .history
                .push(self.config.direction_metric.measure(&bbox));
            if let Some(direction) = state.history.direction() {
                if direction != state.current {
                    self.on_direction_change(state, direction, front.index, store)?;
                }
            }
        }

        let front_image = self.render(front, &front_place);
        let lateral_image = self.render(lateral, &lateral_place);
        let Some(open) = state.open.as_mut() else {
            state.report.frames_unassigned += 1;
            return Ok(());
        };
        open.writer
            .write(&front_image, &lateral_image)
            .with_context(|| {
                format!(
                    "failed to write frame {} to segment {}",
                    front.index, open.segment.index
                )
            })?;
        open.segment.frame_count += 1;
        open.last_frame = front.index;
        state.report.frames_written += 1;
        Ok(())
    }

    fn pick(
        &mut self,
        frame: &Frame,
        policy: SelectionPolicy,
        previous: Option<&BoundingBox>,
    ) -> Result<Option<BoundingBox>> {
        let persons = detect_persons(&mut *self.detector, frame, self.confidence_threshold)
            .with_context(|| format!("detection failed on {} frame {}", frame.view, frame.index))?;
        Ok(policy.select(&persons, previous).map(|d| d.bbox))
    }

    fn on_direction_change(
        &self,
        state: &mut RunState,
        direction: Direction,
        frame_index: u64,
        store: &mut dyn SegmentStore,
    ) -> Result<()> {
        let open = state
            .open
            .as_ref()
            .map(|o| (o.segment.index, o.segment.direction, o.segment.frame_count));
        match open {
            None => {
                log::info!("frame {}: walking {}", frame_index, direction);
                state.open_segment(store, frame_index, direction)?;
            }
            Some((index, Direction::Unknown, _)) => {
                log::info!("frame {}: segment {} walking {}", frame_index, index, direction);
                if let Some(open) = state.open.as_mut() {
                    open.segment.direction = direction;
                }
            }
            Some((index, _, frame_count)) => {
                if let Some(min) = self.config.debounce_frames {
                    if frame_count < min {
                        log::debug!(
                            "frame {}: {} -> {} ignored, segment {} has {} of {} frames",
                            frame_index,
                            state.current,
                            direction,
                            index,
                            frame_count,
                            min
                        );
                        return Ok(());
                    }
                }
                log::info!(
                    "frame {}: direction changed {} -> {}",
                    frame_index,
                    state.current,
                    direction
                );
                state.close_open(self.config.min_frames)?;
                state.open_segment(store, frame_index, direction)?;
            }
        }
        state.current = direction;
        Ok(())
    }

    fn render(&self, frame: &Frame, placement: &Placement) -> RgbImage {
        let bbox = match placement {
            Placement::Detected(bbox) | Placement::Carried(bbox) => *bbox,
            Placement::FullFrame => frame.full_box(),
        };
        normalize(&frame.image, &bbox, self.target_size, self.crop_bias)
    }
}

#[derive(Clone, Copy, Debug)]
enum Placement {
    Detected(BoundingBox),
    Carried(BoundingBox),
    FullFrame,
}

impl Placement {
    fn resolve(
        pick: Option<BoundingBox>,
        last: Option<BoundingBox>,
        missing: MissingDetectionPolicy,
    ) -> Option<Placement> {
        match (pick, missing) {
            (Some(bbox), _) => Some(Placement::Detected(bbox)),
            (None, MissingDetectionPolicy::Skip) => None,
            (None, MissingDetectionPolicy::PassThrough) => Some(Placement::FullFrame),
            (None, MissingDetectionPolicy::CarryForward) => last.map(Placement::Carried),
        }
    }
}

struct OpenSegment {
    segment: Segment,
    writer: Box<dyn SegmentWriter>,
    last_frame: u64,
}

struct RunState {
    history: DirectionHistory,
    current: Direction,
    open: Option<OpenSegment>,
    next_index: u32,
    last_front: Option<BoundingBox>,
    last_lateral: Option<BoundingBox>,
    report: SegmentationReport,
}

impl RunState {
    fn new(history_window: usize) -> Self {
        Self {
            history: DirectionHistory::new(history_window),
            current: Direction::Unknown,
            open: None,
            next_index: 0,
            last_front: None,
            last_lateral: None,
            report: SegmentationReport::default(),
        }
    }

    fn open_segment(
        &mut self,
        store: &mut dyn SegmentStore,
        start_frame: u64,
        direction: Direction,
    ) -> Result<()> {
        let segment = Segment::new(self.next_index, start_frame, direction);
        self.next_index += 1;
        let writer = store
            .begin(&segment)
            .with_context(|| format!("failed to open segment {}", segment.index))?;
        log::info!(
            "segment {} opened at frame {} ({})",
            segment.index,
            start_frame,
            direction
        );
        self.open = Some(OpenSegment {
            segment,
            writer,
            last_frame: start_frame,
        });
        Ok(())
    }

    fn close_open(&mut self, min_frames: u64) -> Result<()> {
        let Some(OpenSegment {
            segment,
            writer,
            last_frame,
        }) = self.open.take()
        else {
            return Ok(());
        };
        let mut record = SegmentRecord {
            index: segment.index,
            direction: segment.direction,
            start_frame: segment.start_frame,
            end_frame: last_frame,
            frame_count: segment.frame_count,
            files: None,
        };

        if segment.frame_count >= min_frames {
            let files = writer
                .commit()
                .with_context(|| format!("failed to persist segment {}", segment.index))?;
            log::info!(
                "segment {} persisted: {} frames walking {} (frames {}..={})",
                segment.index,
                segment.frame_count,
                segment.direction,
                segment.start_frame,
                last_frame
            );
            record.files = Some(files);
            self.report.persisted.push(record);
        } else {
            writer
                .discard()
                .with_context(|| format!("failed to discard segment {}", segment.index))?;
            log::warn!(
                "segment {} discarded: {} frames is below the minimum of {}",
                segment.index,
                segment.frame_count,
                min_frames
            );
            self.report.discarded.push(record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_policy_parses() {
        assert_eq!(
            "pass-through".parse::<MissingDetectionPolicy>(),
            Ok(MissingDetectionPolicy::PassThrough)
        );
        assert_eq!(
            "carry_forward".parse::<MissingDetectionPolicy>(),
            Ok(MissingDetectionPolicy::CarryForward)
        );
        assert!("guess".parse::<MissingDetectionPolicy>().is_err());
    }

    #[test]
    fn placement_follows_policy() {
        let last = Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert!(Placement::resolve(None, last, MissingDetectionPolicy::Skip).is_none());
        assert!(matches!(
            Placement::resolve(None, last, MissingDetectionPolicy::PassThrough),
            Some(Placement::FullFrame)
        ));
        assert!(matches!(
            Placement::resolve(None, last, MissingDetectionPolicy::CarryForward),
            Some(Placement::Carried(_))
        ));
        assert!(Placement::resolve(None, None, MissingDetectionPolicy::CarryForward).is_none());
    }
}
