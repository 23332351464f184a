//! Direction-change segmentation.
//!
//! A session is cut into walking passes: every time the subject's horizontal
//! direction flips, the open segment is closed and a new one begins. Closed
//! segments shorter than `min_frames` are discarded.

mod segmenter;
mod store;

use serde::{Deserialize, Serialize};

use crate::direction::Direction;

pub use segmenter::{
    MissingDetectionPolicy, SegmentRecord, SegmentationReport, Segmenter, Truncation,
};
pub use store::{DirectorySegmentStore, SegmentFiles, SegmentStore, SegmentWriter};

/// One contiguous walking pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u32,
    /// Source frame index of the first written frame.
    pub start_frame: u64,
    /// Frame pairs written so far.
    pub frame_count: u64,
    pub direction: Direction,
}

impl Segment {
    pub fn new(index: u32, start_frame: u64, direction: Direction) -> Self {
        Self {
            index,
            start_frame,
            frame_count: 0,
            direction,
        }
    }
}
