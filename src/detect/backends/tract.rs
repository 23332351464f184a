#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, ObjectClass};
use crate::frame::{BoundingBox, Frame};
use crate::normalize::letterbox;

/// Default square input side of YOLOv8/YOLO11 exports.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Candidates below this score are dropped before NMS.
const MIN_CANDIDATE_SCORE: f32 = 0.05;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// The model is expected to take a `1×3×S×S` float input in `0..1` and to
/// produce `1×(4+C)×N` (or the transposed `1×N×(4+C)`) rows of
/// `cx, cy, w, h, class scores...` in input pixel space.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            iou_threshold: 0.45,
        })
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> (Tensor, crate::normalize::Letterbox) {
        let (canvas, placement) = letterbox(&frame.image, self.input_size);
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        (input.into_tensor(), placement)
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        placement: &crate::normalize::Letterbox,
        frame: &Frame,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|e| anyhow!("unexpected YOLO output rank: {}", e))?;
        let shape = view.shape().to_vec();
        if shape[0] != 1 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        // Rows are either attributes-major (1, 4+C, N) or anchors-major (1, N, 4+C).
        let attrs_major = shape[1] < shape[2];
        let (attrs, anchors) = if attrs_major {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if attrs <= 4 {
            return Err(anyhow!("YOLO output has no class scores: {:?}", shape));
        }
        let at = |attr: usize, anchor: usize| {
            if attrs_major {
                view[[0, attr, anchor]]
            } else {
                view[[0, anchor, attr]]
            }
        };

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..attrs)
                .map(|attr| (attr - 4, at(attr, anchor)))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < MIN_CANDIDATE_SCORE {
                continue;
            }
            let boxed = BoundingBox::from_center(
                at(0, anchor),
                at(1, anchor),
                at(2, anchor),
                at(3, anchor),
            );
            let bbox = placement.to_source(&boxed, frame.width(), frame.height());
            candidates.push(Detection {
                bbox,
                class: ObjectClass::from_coco_id(class_id as u16),
                confidence: score,
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, placement) = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, &placement, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::<f32>::zeros((1, 3, size, size)).into_tensor();
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up failed")?;
        Ok(())
    }
}

/// Per-class greedy NMS. Output is ordered by descending confidence.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<Detection> = Vec::new();
    for cand in candidates {
        if keep
            .iter()
            .filter(|kept| kept.class == cand.class)
            .all(|kept| kept.bbox.iou(&cand.bbox) <= iou_threshold)
        {
            keep.push(cand);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_suppresses_overlaps_within_class() {
        let b = |x: f32| BoundingBox::new(x, 0.0, x + 100.0, 100.0);
        let dets = vec![
            Detection::person(b(0.0), 0.6),
            Detection::person(b(5.0), 0.9),
            Detection::person(b(300.0), 0.7),
            Detection {
                bbox: b(5.0),
                class: ObjectClass::Other(1),
                confidence: 0.8,
            },
        ];
        let kept = non_max_suppression(dets, 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().all(|d| d.confidence != 0.6));
    }
}
