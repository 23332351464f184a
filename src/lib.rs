//! Gait Segmenter
//!
//! Splits synchronized front (AP) and lateral gait recordings into walking
//! passes, one per direction, for a downstream video classifier.
//!
//! # Pipeline
//!
//! For every pair of frames read in lock-step from the two views:
//!
//! 1. A person detector runs on both frames and one box per view is selected.
//! 2. The direction view's box feeds a bounded window of horizontal positions;
//!    the sign of `newest - oldest` is the walking direction.
//! 3. A change of direction closes the open segment and opens the next.
//! 4. Both frames are cropped around the subject and letterboxed into a black
//!    square, then written to the open segment's two videos.
//!
//! Segments shorter than `min_frames` are discarded.
//!
//! # Module Structure
//!
//! - `frame`: Frame, View and BoundingBox
//! - `detect`: detector backends, person filtering, target selection
//! - `direction`: direction window and inference
//! - `normalize`: crop + letterbox
//! - `ingest`: frame sources (FFmpeg files, Y4M files, synthetic streams)
//! - `encode`: segment video writers (Y4M, MP4)
//! - `segment`: segment lifecycle and output store
//! - `pipeline`, `batch`: one pair, or a whole directory tree
//! - `manifest`, `config`, `ui`, `cli`: bookkeeping and the command line

pub mod batch;
pub mod cli;
pub mod config;
pub mod detect;
pub mod direction;
pub mod encode;
pub mod frame;
pub mod ingest;
pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod segment;
pub mod ui;

pub use config::SegmenterConfig;
pub use detect::{open_backend, Detection, DetectorBackend, SelectionPolicy};
pub use direction::{Direction, DirectionHistory, DirectionMetric};
pub use frame::{BoundingBox, Frame, View};
pub use ingest::{FrameSource, VideoConfig, VideoSource};
pub use normalize::normalize;
pub use pipeline::process_pair;
pub use segment::{
    DirectorySegmentStore, MissingDetectionPolicy, Segment, SegmentStore, SegmentWriter,
    SegmentationReport, Segmenter,
};
