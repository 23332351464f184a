use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::backends::BACKEND_NAMES;
use crate::detect::SelectionPolicy;
use crate::direction::{DirectionMetric, DEFAULT_HISTORY_WINDOW};
use crate::encode::VideoFormat;
use crate::frame::View;
use crate::segment::MissingDetectionPolicy;

const DEFAULT_BACKEND: &str = "cpu";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MIN_FRAMES: u64 = 50;
const DEFAULT_TARGET_SIZE: u32 = 512;
const DEFAULT_CROP_BIAS: u32 = 10;
const DEFAULT_FRONT_NAME: &str = "ap";
const DEFAULT_LATERAL_NAME: &str = "lat";
const DEFAULT_FRONT_FILE: &str = "full_ap.mp4";
const DEFAULT_LATERAL_FILE: &str = "full_lat.mp4";

#[derive(Debug, Deserialize, Default)]
struct SegmenterConfigFile {
    detection: Option<DetectionConfigFile>,
    segmentation: Option<SegmentationConfigFile>,
    output: Option<OutputConfigFile>,
    input: Option<InputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SegmentationConfigFile {
    min_frames: Option<u64>,
    history_window: Option<usize>,
    direction_metric: Option<DirectionMetric>,
    direction_view: Option<View>,
    front_selection: Option<SelectionPolicy>,
    lateral_selection: Option<SelectionPolicy>,
    missing: Option<MissingDetectionPolicy>,
    open_at_start: Option<bool>,
    debounce_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    target_size: Option<u32>,
    crop_bias: Option<u32>,
    format: Option<VideoFormat>,
    front_name: Option<String>,
    lateral_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct InputConfigFile {
    front_file: Option<String>,
    lateral_file: Option<String>,
}

/// Complete, validated configuration of a segmentation run.
#[derive(Debug, Clone, Default)]
pub struct SegmenterConfig {
    pub detection: DetectionSettings,
    pub segmentation: SegmentationConfig,
    pub output: OutputSettings,
    pub input: InputSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// One of `cpu`, `scripted`, `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    /// Square model input side for `tract`.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            script_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    /// Shortest segment that is persisted.
    pub min_frames: u64,
    pub history_window: usize,
    pub direction_metric: DirectionMetric,
    /// View whose box feeds the direction window.
    pub direction_view: View,
    pub front_selection: SelectionPolicy,
    pub lateral_selection: SelectionPolicy,
    pub missing: MissingDetectionPolicy,
    /// Open an `unknown` segment at the first usable frame instead of
    /// waiting for the first direction reading.
    pub open_at_start: bool,
    /// Ignore direction changes until the open segment has this many frames.
    pub debounce_frames: Option<u64>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            min_frames: DEFAULT_MIN_FRAMES,
            history_window: DEFAULT_HISTORY_WINDOW,
            direction_metric: DirectionMetric::CenterX,
            direction_view: View::Front,
            front_selection: SelectionPolicy::LeftMost,
            lateral_selection: SelectionPolicy::First,
            missing: MissingDetectionPolicy::Skip,
            open_at_start: false,
            debounce_frames: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub target_size: u32,
    /// Pixels added to each horizontal edge of the crop.
    pub crop_bias: u32,
    pub format: VideoFormat,
    pub front_name: String,
    pub lateral_name: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            crop_bias: DEFAULT_CROP_BIAS,
            format: VideoFormat::default(),
            front_name: DEFAULT_FRONT_NAME.to_string(),
            lateral_name: DEFAULT_LATERAL_NAME.to_string(),
        }
    }
}

/// File names of the two views inside a session directory (batch mode).
#[derive(Debug, Clone)]
pub struct InputSettings {
    pub front_file: String,
    pub lateral_file: String,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            front_file: DEFAULT_FRONT_FILE.to_string(),
            lateral_file: DEFAULT_LATERAL_FILE.to_string(),
        }
    }
}

impl SegmenterConfig {
    /// Defaults, then the config file (`path`, else `GAIT_CONFIG`), then
    /// `GAIT_*` environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::from_sources(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`SegmenterConfig::load`] without the final validation, so that
    /// command line overrides can be applied first.
    pub fn from_sources(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var("GAIT_CONFIG")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: SegmenterConfigFile) -> Self {
        let detection = {
            let d = DetectionSettings::default();
            let f = file.detection.unwrap_or_default();
            DetectionSettings {
                backend: f.backend.unwrap_or(d.backend),
                model_path: f.model_path,
                script_path: f.script_path,
                input_size: f.input_size.unwrap_or(d.input_size),
                confidence_threshold: f.confidence_threshold.unwrap_or(d.confidence_threshold),
                iou_threshold: f.iou_threshold.unwrap_or(d.iou_threshold),
            }
        };
        let segmentation = {
            let d = SegmentationConfig::default();
            let f = file.segmentation.unwrap_or_default();
            SegmentationConfig {
                min_frames: f.min_frames.unwrap_or(d.min_frames),
                history_window: f.history_window.unwrap_or(d.history_window),
                direction_metric: f.direction_metric.unwrap_or(d.direction_metric),
                direction_view: f.direction_view.unwrap_or(d.direction_view),
                front_selection: f.front_selection.unwrap_or(d.front_selection),
                lateral_selection: f.lateral_selection.unwrap_or(d.lateral_selection),
                missing: f.missing.unwrap_or(d.missing),
                open_at_start: f.open_at_start.unwrap_or(d.open_at_start),
                debounce_frames: f.debounce_frames,
            }
        };
        let output = {
            let d = OutputSettings::default();
            let f = file.output.unwrap_or_default();
            OutputSettings {
                target_size: f.target_size.unwrap_or(d.target_size),
                crop_bias: f.crop_bias.unwrap_or(d.crop_bias),
                format: f.format.unwrap_or(d.format),
                front_name: f.front_name.unwrap_or(d.front_name),
                lateral_name: f.lateral_name.unwrap_or(d.lateral_name),
            }
        };
        let input = {
            let d = InputSettings::default();
            let f = file.input.unwrap_or_default();
            InputSettings {
                front_file: f.front_file.unwrap_or(d.front_file),
                lateral_file: f.lateral_file.unwrap_or(d.lateral_file),
            }
        };
        Self {
            detection,
            segmentation,
            output,
            input,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(backend) = env_value("GAIT_DETECTOR") {
            self.detection.backend = backend;
        }
        if let Some(path) = env_value("GAIT_MODEL_PATH") {
            self.detection.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("GAIT_SCRIPT_PATH") {
            self.detection.script_path = Some(PathBuf::from(path));
        }
        if let Some(threshold) = env_value("GAIT_CONFIDENCE_THRESHOLD") {
            self.detection.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("GAIT_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Some(min_frames) = env_value("GAIT_MIN_FRAMES") {
            self.segmentation.min_frames = min_frames
                .parse()
                .map_err(|_| anyhow!("GAIT_MIN_FRAMES must be a non-negative integer"))?;
        }
        if let Some(size) = env_value("GAIT_TARGET_SIZE") {
            self.output.target_size = size
                .parse()
                .map_err(|_| anyhow!("GAIT_TARGET_SIZE must be a positive integer"))?;
        }
        if let Some(bias) = env_value("GAIT_CROP_BIAS") {
            self.output.crop_bias = bias
                .parse()
                .map_err(|_| anyhow!("GAIT_CROP_BIAS must be a non-negative integer"))?;
        }
        if let Some(format) = env_value("GAIT_OUTPUT_FORMAT") {
            self.output.format = format
                .parse()
                .map_err(|e: String| anyhow!("GAIT_OUTPUT_FORMAT: {}", e))?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.detection.backend = self.detection.backend.trim().to_ascii_lowercase();
        if !BACKEND_NAMES.contains(&self.detection.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                self.detection.backend,
                BACKEND_NAMES.join(", ")
            ));
        }
        if self.detection.backend == "scripted" && self.detection.script_path.is_none() {
            return Err(anyhow!("the scripted detector needs a script path"));
        }
        if self.detection.backend == "tract" && self.detection.model_path.is_none() {
            return Err(anyhow!("the tract detector needs a model path"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(anyhow!("confidence threshold must be between 0 and 1"));
        }
        if !(self.detection.iou_threshold > 0.0 && self.detection.iou_threshold <= 1.0) {
            return Err(anyhow!("IoU threshold must be in (0, 1]"));
        }
        if self.detection.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }

        if self.segmentation.min_frames == 0 {
            return Err(anyhow!("min_frames must be greater than zero"));
        }
        if self.segmentation.history_window < 2 {
            return Err(anyhow!("history window must hold at least 2 positions"));
        }
        if self.segmentation.debounce_frames == Some(0) {
            self.segmentation.debounce_frames = None;
        }

        if self.output.target_size == 0 {
            return Err(anyhow!("target size must be greater than zero"));
        }
        check_name("output front name", &self.output.front_name)?;
        check_name("output lateral name", &self.output.lateral_name)?;
        if self.output.front_name == self.output.lateral_name {
            return Err(anyhow!("front and lateral output names must differ"));
        }
        check_name("input front file", &self.input.front_file)?;
        check_name("input lateral file", &self.input.lateral_file)?;
        if self.input.front_file == self.input.lateral_file {
            return Err(anyhow!("front and lateral input files must differ"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SegmenterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// Names become path components, so no separators.
fn check_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(anyhow!("{} '{}' is not a plain file name", what, name));
    }
    Ok(())
}
