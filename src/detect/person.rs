use anyhow::Result;

use crate::frame::Frame;

use super::backend::DetectorBackend;
use super::result::{Detection, ObjectClass};

/// Run `backend` on `frame` and keep persons with `confidence >= threshold`.
///
/// Detector order is preserved; selection strategies rely on it.
pub fn detect_persons(
    backend: &mut dyn DetectorBackend,
    frame: &Frame,
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let detections = backend.detect(frame)?;
    Ok(detections
        .into_iter()
        .filter(|d| d.class == ObjectClass::Person && d.confidence >= confidence_threshold)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;
    use crate::frame::{BoundingBox, View};
    use image::RgbImage;

    #[test]
    fn keeps_only_confident_persons_in_order() {
        let mut backend = ScriptedBackend::new();
        let b = |x: f32| BoundingBox::new(x, 0.0, x + 10.0, 10.0);
        backend.set(
            View::Front,
            0,
            vec![
                Detection::person(b(50.0), 0.9),
                Detection {
                    bbox: b(10.0),
                    class: ObjectClass::Other(2),
                    confidence: 0.99,
                },
                Detection::person(b(30.0), 0.5),
                Detection::person(b(20.0), 0.49),
            ],
        );
        let frame = Frame::new(0, View::Front, RgbImage::new(4, 4));

        let persons = detect_persons(&mut backend, &frame, 0.5).unwrap();
        let xs: Vec<f32> = persons.iter().map(|d| d.bbox.x1).collect();
        assert_eq!(xs, vec![50.0, 30.0]);
    }
}
