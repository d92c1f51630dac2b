#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{ModelBackend, ModelOutput};
use crate::detect::result::BoundingBox;

/// Score floor below which raw candidates are dropped before they reach the
/// adapter. The adapter applies the configured threshold; this floor only
/// keeps the candidate list small.
const CANDIDATE_FLOOR: f32 = 0.05;

/// Overlap above which the lower-scoring of two same-class boxes is
/// suppressed.
const NMS_IOU: f32 = 0.45;

/// Tract-based backend for ONNX person detection.
///
/// Loads a local model file and performs inference on RGB frames. Expects a
/// detection head laid out `[1, 4 + classes, anchors]` with `cx, cy, w, h`
/// in the first four channels, the YOLO convention. No network I/O.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode_outputs(&self, outputs: TVec<TValue>) -> Result<Vec<ModelOutput>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let (channels, anchors) = match view.shape() {
            &[1, c, n] => (c, n),
            other => {
                return Err(anyhow!("unsupported model output shape {:?}", other));
            }
        };
        if channels < 5 {
            return Err(anyhow!(
                "model output has {} channels, need at least 5",
                channels
            ));
        }

        let grid = view.index_axis(tract_ndarray::Axis(0), 0);
        let max_x = (self.width.saturating_sub(1)) as f32;
        let max_y = (self.height.saturating_sub(1)) as f32;

        let mut candidates = Vec::new();
        for n in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = 0.0f32;
            for class in 4..channels {
                let score = grid[[class, n]];
                if score > best_score {
                    best_score = score;
                    best_class = class - 4;
                }
            }
            if best_score < CANDIDATE_FLOOR {
                continue;
            }

            let cx = grid[[0, n]];
            let cy = grid[[1, n]];
            let w = grid[[2, n]];
            let h = grid[[3, n]];
            let x1 = (cx - w / 2.0).clamp(0.0, max_x);
            let y1 = (cy - h / 2.0).clamp(0.0, max_y);
            let x2 = (cx + w / 2.0).clamp(0.0, max_x);
            let y2 = (cy + h / 2.0).clamp(0.0, max_y);

            candidates.push(ModelOutput {
                class_id: best_class as u32,
                confidence: best_score,
                bbox: BoundingBox::new(
                    x1.round() as u32,
                    y1.round() as u32,
                    x2.round() as u32,
                    y2.round() as u32,
                ),
            });
        }

        Ok(non_max_suppress(candidates))
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<ModelOutput>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_outputs(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let zeros = vec![0u8; (self.width as usize) * (self.height as usize) * 3];
        let input = self.build_input(&zeros, self.width, self.height)?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}

/// Greedy per-class suppression: keep the highest-scoring box, drop every
/// same-class box overlapping it beyond `NMS_IOU`.
fn non_max_suppress(mut candidates: Vec<ModelOutput>) -> Vec<ModelOutput> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<ModelOutput> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > NMS_IOU
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix1 = a.x1.max(b.x1) as f32;
    let iy1 = a.y1.max(b.y1) as f32;
    let ix2 = a.x2.min(b.x2) as f32;
    let iy2 = a.y2.min(b.y2) as f32;
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);

    let area_a = (a.width() as f32) * (a.height() as f32);
    let area_b = (b.width() as f32) * (b.height() as f32);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
