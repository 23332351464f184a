//! gait_segment - split paired gait videos into per-direction segments
//!
//! Usage:
//!   gait_segment pair --front full_ap.mp4 --lateral full_lat.mp4 --out out/
//!   gait_segment batch --input sessions/ --out segmented/ [--dry-run]

fn main() -> anyhow::Result<()> {
    gait_segmenter::cli::run()
}
