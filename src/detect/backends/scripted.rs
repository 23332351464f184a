use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::{Frame, View};

/// Per-view detection lists indexed by frame number.
///
/// ```json
/// {
///   "front":   [[{"bbox": [10, 20, 60, 220], "confidence": 0.91}], []],
///   "lateral": [[{"bbox": [300, 15, 350, 230], "class_id": 0, "confidence": 0.88}]]
/// }
/// ```
#[derive(Debug, Deserialize, Default)]
struct ScriptFile {
    #[serde(default)]
    front: Vec<Vec<Detection>>,
    #[serde(default)]
    lateral: Vec<Vec<Detection>>,
}

/// Backend that replays precomputed detections.
///
/// Used to run the segmenter on boxes exported from an external detector or
/// tracker, and to drive deterministic segmentation scenarios. Frames without
/// an entry yield no detections.
#[derive(Default)]
pub struct ScriptedBackend {
    script: HashMap<(View, u64), Vec<Detection>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON script from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let file: ScriptFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;

        let mut backend = Self::new();
        for (view, frames) in [(View::Front, file.front), (View::Lateral, file.lateral)] {
            for (index, detections) in frames.into_iter().enumerate() {
                backend.set(view, index as u64, detections);
            }
        }
        Ok(backend)
    }

    /// Replace the detections reported for one frame of one view.
    pub fn set(&mut self, view: View, index: u64, detections: Vec<Detection>) {
        if detections.is_empty() {
            self.script.remove(&(view, index));
        } else {
            self.script.insert((view, index), detections);
        }
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self
            .script
            .get(&(frame.view, frame.index))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::ObjectClass;
    use crate::frame::BoundingBox;
    use image::RgbImage;
    use std::io::Write;

    #[test]
    fn loads_script_per_view() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "front": [[], [{{"bbox": [1, 2, 3, 4], "confidence": 0.7}}]],
                "lateral": [[{{"bbox": [5, 6, 7, 8], "class_id": 2, "confidence": 0.4}}]]
            }}"#
        )
        .unwrap();

        let mut backend = ScriptedBackend::from_path(file.path()).unwrap();
        let frame = |index, view| Frame::new(index, view, RgbImage::new(1, 1));

        assert!(backend.detect(&frame(0, View::Front)).unwrap().is_empty());
        let front = backend.detect(&frame(1, View::Front)).unwrap();
        assert_eq!(front[0].bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(front[0].class, ObjectClass::Person);

        let lateral = backend.detect(&frame(0, View::Lateral)).unwrap();
        assert_eq!(lateral[0].class, ObjectClass::Other(2));
        assert!(backend.detect(&frame(5, View::Lateral)).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_script() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"front\": 3}}").unwrap();
        assert!(ScriptedBackend::from_path(file.path()).is_err());
    }
}
