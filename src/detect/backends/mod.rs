pub mod cpu;
pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::{anyhow, Result};

pub use cpu::CpuBackend;
pub use scripted::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use crate::config::DetectionSettings;
use crate::detect::backend::DetectorBackend;

/// Names accepted by [`open_backend`].
pub const BACKEND_NAMES: &[&str] = &["cpu", "scripted", "tract"];

/// Build the detector capability named in `settings`.
///
/// Called once per process; the returned backend is then passed explicitly to
/// every segmentation run.
pub fn open_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let mut backend: Box<dyn DetectorBackend> = match settings.backend.as_str() {
        "cpu" => Box::new(CpuBackend::new()),
        "scripted" => {
            let path = settings
                .script_path
                .as_ref()
                .ok_or_else(|| anyhow!("scripted detector requires a script path"))?;
            Box::new(ScriptedBackend::from_path(path)?)
        }
        "tract" => open_tract(settings)?,
        other => {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of {})",
                other,
                BACKEND_NAMES.join(", ")
            ))
        }
    };
    backend.warm_up()?;
    log::info!("detector backend '{}' ready", backend.name());
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn open_tract(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract detector requires a model path"))?;
    Ok(Box::new(
        TractBackend::new(path, settings.input_size)?.with_iou_threshold(settings.iou_threshold),
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(_settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "tract detector requires the backend-tract feature"
    ))
}
