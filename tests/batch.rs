use std::path::Path;

use gait_segmenter::batch::{discover_pairs, plan_batch, run_batch};
use gait_segmenter::detect::CpuBackend;
use gait_segmenter::encode::{VideoFormat, VideoSink, Y4mWriter};
use gait_segmenter::manifest::{BatchSummary, PairManifest, PairStatus};
use gait_segmenter::ui::Ui;
use gait_segmenter::{FrameSource, SegmenterConfig, VideoConfig, VideoSource, View};

const WALKER: &str =
    "stub://walker?frames=120&turns=60&speed=1&width=160&height=90&start=10&box_width=20&box_height=50";

/// Render a synthetic walker into a Y4M file, as if it were a recording.
fn record(url: &str, path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut source = VideoSource::open(VideoConfig::new(url, View::Front)).unwrap();
    let (width, height) = source.dimensions();
    let mut writer: Box<dyn VideoSink> =
        Box::new(Y4mWriter::create(path, source.frame_rate(), width, height).unwrap());
    while let Some(frame) = source.next_frame().unwrap() {
        writer.write_frame(&frame.image).unwrap();
    }
    writer.finish().unwrap();
}

fn config() -> SegmenterConfig {
    let mut cfg = SegmenterConfig::default();
    cfg.input.front_file = "full_ap.y4m".to_string();
    cfg.input.lateral_file = "full_lat.y4m".to_string();
    cfg.output.target_size = 32;
    cfg.output.format = VideoFormat::Y4m;
    cfg
}

fn build_tree(root: &Path) {
    let good = root.join("p01").join("walk1");
    record(WALKER, &good.join("full_ap.y4m"));
    record(WALKER, &good.join("full_lat.y4m"));

    let broken = root.join("p02").join("walk1");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("full_ap.y4m"), b"not a video").unwrap();
    record(WALKER, &broken.join("full_lat.y4m"));

    let incomplete = root.join("p03");
    record(WALKER, &incomplete.join("full_ap.y4m"));
}

#[test]
fn batch_mirrors_layout_and_isolates_failures() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    build_tree(input.path());

    let mut detector = CpuBackend::new();
    let summary = run_batch(
        &config(),
        &mut detector,
        input.path(),
        output.path(),
        &Ui::plain(),
        None,
    )
    .expect("batch run");

    let sessions: Vec<&str> = summary.entries.iter().map(|e| e.session.as_str()).collect();
    assert_eq!(sessions, vec!["p01/walk1", "p02/walk1"]);

    let done = &summary.entries[0];
    assert_eq!(done.status, PairStatus::Done);
    assert_eq!(done.persisted, 2);
    let failed = &summary.entries[1];
    assert_eq!(failed.status, PairStatus::Failed);
    assert!(failed.error.as_deref().unwrap_or_default().contains("YUV4MPEG2"));

    let session_out = output.path().join("p01").join("walk1");
    assert!(session_out.join("segment0").join("ap_0.y4m").is_file());
    assert!(session_out.join("segment1").join("lat_1.y4m").is_file());
    let manifest = PairManifest::read(&session_out).expect("pair manifest");
    let counts: Vec<u64> = manifest.report.persisted.iter().map(|s| s.frame_count).collect();
    assert_eq!(counts, vec![56, 55]);

    assert!(!output.path().join("p02").join("walk1").join("segment0").exists());
    assert_eq!(BatchSummary::read(output.path()).expect("summary"), summary);
}

#[test]
fn dry_run_lists_without_writing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    build_tree(input.path());
    let target = output.path().join("segmented");

    let summary = plan_batch(&config(), input.path(), &target).expect("plan");
    assert_eq!(summary.count(PairStatus::Planned), 2);
    assert!(!target.exists());
}

#[test]
fn discovery_uses_configured_file_names() {
    let input = tempfile::tempdir().unwrap();
    build_tree(input.path());

    let default_names = discover_pairs(input.path(), &SegmenterConfig::default().input).unwrap();
    assert!(default_names.is_empty());

    let pairs = discover_pairs(input.path(), &config().input).unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].relative, Path::new("p01").join("walk1"));
}
