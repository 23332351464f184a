use anyhow::Result;

use crate::frame::Frame;

use super::result::Detection;

/// Detector backend trait.
///
/// A backend is the object-detection capability the segmenter consumes. It is
/// built once per process and handed to the segmentation loop explicitly as
/// `&mut dyn DetectorBackend`.
///
/// Implementations return every box they find, in frame pixel coordinates and
/// in their native order. Class and confidence filtering happen in
/// [`detect_persons`](super::detect_persons).
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
