//! gait_segment - cut paired gait videos into single-direction walking passes
//!
//! `pair` segments one front/lateral pair; `batch` walks a directory tree of
//! sessions. Configuration comes from defaults, an optional JSON/TOML file,
//! `GAIT_*` environment variables and finally the flags below.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::batch::{plan_batch, run_batch};
use crate::config::SegmenterConfig;
use crate::detect::{open_backend, SelectionPolicy};
use crate::direction::DirectionMetric;
use crate::encode::VideoFormat;
use crate::frame::View;
use crate::manifest::PairStatus;
use crate::pipeline::process_pair;
use crate::segment::MissingDetectionPolicy;
use crate::ui::{Ui, UiMode};

#[derive(Parser, Debug)]
#[command(
    name = "gait_segment",
    about = "Split front/lateral gait videos into one segment per walking direction"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a single front/lateral pair
    Pair {
        /// Front (AP) video, or a stub:// URL
        #[arg(long, value_name = "PATH")]
        front: String,
        /// Lateral video, or a stub:// URL
        #[arg(long, value_name = "PATH")]
        lateral: String,
        /// Output directory for segment{i}/ folders
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Segment every session found under a directory tree
    Batch {
        /// Root directory searched for sessions
        #[arg(long, value_name = "DIR")]
        input: PathBuf,
        /// Output root; mirrors the input layout
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
        /// List sessions without processing them
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(ClapArgs, Debug)]
struct Overrides {
    /// JSON or TOML config file (default: $GAIT_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Detector backend (cpu|scripted|tract)
    #[arg(long)]
    detector: Option<String>,
    /// ONNX model for the tract detector
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Detection script for the scripted detector
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,
    #[arg(long)]
    confidence_threshold: Option<f32>,
    /// Shortest segment kept, in frames
    #[arg(long)]
    min_frames: Option<u64>,
    #[arg(long)]
    history_window: Option<usize>,
    /// Horizontal coordinate tracked (center_x|x1)
    #[arg(long)]
    direction_metric: Option<DirectionMetric>,
    /// View used for direction inference (front|lateral)
    #[arg(long)]
    direction_view: Option<View>,
    #[arg(long)]
    front_selection: Option<SelectionPolicy>,
    #[arg(long)]
    lateral_selection: Option<SelectionPolicy>,
    /// Handling of frames without a person (skip|pass_through|carry_forward)
    #[arg(long)]
    missing: Option<MissingDetectionPolicy>,
    /// Open a segment at the first usable frame
    #[arg(long)]
    open_at_start: bool,
    /// Ignore direction changes in segments shorter than this
    #[arg(long, value_name = "FRAMES")]
    debounce: Option<u64>,
    /// Output side length in pixels
    #[arg(long)]
    target_size: Option<u32>,
    #[arg(long)]
    crop_bias: Option<u32>,
    /// Output container (y4m|mp4)
    #[arg(long)]
    format: Option<VideoFormat>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: UiMode,
}

impl Overrides {
    fn load_config(&self) -> Result<SegmenterConfig> {
        let mut cfg = SegmenterConfig::from_sources(self.config.as_deref())?;
        self.apply(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut SegmenterConfig) {
        if let Some(detector) = &self.detector {
            cfg.detection.backend = detector.clone();
        }
        if let Some(model) = &self.model {
            cfg.detection.model_path = Some(model.clone());
        }
        if let Some(script) = &self.script {
            cfg.detection.script_path = Some(script.clone());
        }
        if let Some(threshold) = self.confidence_threshold {
            cfg.detection.confidence_threshold = threshold;
        }

        let seg = &mut cfg.segmentation;
        if let Some(min_frames) = self.min_frames {
            seg.min_frames = min_frames;
        }
        if let Some(window) = self.history_window {
            seg.history_window = window;
        }
        if let Some(metric) = self.direction_metric {
            seg.direction_metric = metric;
        }
        if let Some(view) = self.direction_view {
            seg.direction_view = view;
        }
        if let Some(policy) = self.front_selection {
            seg.front_selection = policy;
        }
        if let Some(policy) = self.lateral_selection {
            seg.lateral_selection = policy;
        }
        if let Some(missing) = self.missing {
            seg.missing = missing;
        }
        if self.open_at_start {
            seg.open_at_start = true;
        }
        if let Some(debounce) = self.debounce {
            seg.debounce_frames = Some(debounce);
        }

        if let Some(size) = self.target_size {
            cfg.output.target_size = size;
        }
        if let Some(bias) = self.crop_bias {
            cfg.output.crop_bias = bias;
        }
        if let Some(format) = self.format {
            cfg.output.format = format;
        }
    }

    fn ui(&self) -> Ui {
        let is_tty = std::io::stderr().is_terminal();
        let stdout_is_tty = std::io::stdout().is_terminal();
        Ui::new(self.ui, is_tty, !stdout_is_tty)
    }
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    match args.command {
        Command::Pair {
            front,
            lateral,
            out,
            overrides,
        } => cmd_pair(&front, &lateral, &out, &overrides, &stop),
        Command::Batch {
            input,
            out,
            dry_run,
            overrides,
        } => cmd_batch(&input, &out, dry_run, &overrides, &stop),
    }
}

fn cmd_pair(
    front: &str,
    lateral: &str,
    out: &Path,
    overrides: &Overrides,
    stop: &AtomicBool,
) -> Result<()> {
    let ui = overrides.ui();
    let cfg = overrides.load_config()?;
    let mut detector = {
        let _stage = ui.stage("Load detector");
        open_backend(&cfg.detection)?
    };

    let manifest = {
        let mut stage = ui.stage("Segment pair");
        let manifest = process_pair(&cfg, detector.as_mut(), front, lateral, out, Some(stop))?;
        stage.finish_with(format!("{} segments", manifest.report.persisted.len()));
        manifest
    };

    let report = &manifest.report;
    println!("=== Segmentation ===");
    println!("Frames read:    {}", report.frames_read);
    println!("Frames written: {}", report.frames_written);
    println!("Frames skipped: {}", report.frames_skipped);
    for record in &report.persisted {
        println!(
            "  segment{}: {} frames, {} (frames {}..={})",
            record.index, record.frame_count, record.direction, record.start_frame, record.end_frame
        );
    }
    if !report.discarded.is_empty() {
        println!("Discarded:      {} short segments", report.discarded.len());
    }
    if let Some(truncated) = &report.truncated {
        println!(
            "Warning: {} view ended first after {} frames",
            truncated.shorter, truncated.frames_read
        );
    }
    if report.interrupted {
        println!("Interrupted: the last segment was closed early");
    }
    Ok(())
}

fn cmd_batch(
    input: &Path,
    out: &Path,
    dry_run: bool,
    overrides: &Overrides,
    stop: &AtomicBool,
) -> Result<()> {
    let ui = overrides.ui();
    let cfg = overrides.load_config()?;
    if dry_run {
        let summary = plan_batch(&cfg, input, out)?;
        println!("{} sessions would be processed", summary.entries.len());
        return Ok(());
    }

    let mut detector = {
        let _stage = ui.stage("Load detector");
        open_backend(&cfg.detection)?
    };
    let summary = run_batch(&cfg, detector.as_mut(), input, out, &ui, Some(stop))?;

    let failed = summary.count(PairStatus::Failed);
    println!(
        "Sessions: {} done, {} failed, {} segments persisted",
        summary.count(PairStatus::Done),
        failed,
        summary.segments_persisted()
    );
    if failed > 0 {
        return Err(anyhow!(
            "{} of {} sessions failed (see {})",
            failed,
            summary.entries.len(),
            out.join(crate::manifest::BATCH_SUMMARY_FILE).display()
        ));
    }
    Ok(())
}
