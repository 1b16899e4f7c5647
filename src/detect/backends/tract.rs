#![cfg(feature = "backend-tract")]

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::nms::{non_max_suppression, NMS_IOU_THRESHOLD};
use crate::detect::result::{Detection, DetectionFilter};
use crate::frame::Frame;

/// Tract-based backend for YOLOv8-format ONNX models.
///
/// Frames are resized to the square model input by nearest sampling. The model is
/// expected to emit one `[1, 4 + C, N]` tensor: `cx, cy, w, h` followed by one
/// score per class, for each of `N` candidates.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    labels: Vec<String>,
    filter: DetectionFilter,
}

impl TractBackend {
    /// Load an ONNX model and its newline-separated labels file.
    pub fn new<P: AsRef<Path>, L: AsRef<Path>>(
        model_path: P,
        labels_path: L,
        input_size: u32,
        filter: DetectionFilter,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let labels_path = labels_path.as_ref();
        let labels = load_labels(labels_path)?;
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX model {} ({} classes, input {}x{})",
            model_path.display(),
            labels.len(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            labels,
            filter,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size as usize;
        let src_w = frame.width as usize;
        let src_h = frame.height as usize;
        let pixels = frame.pixels();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let sy = (y * src_h / side).min(src_h - 1);
            let sx = (x * src_w / side).min(src_w - 1);
            pixels[(sy * src_w + sx) * 3 + c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("expected a [1, 4 + C, N] output tensor")?;

        let features = view.shape()[1];
        let candidates = view.shape()[2];
        if features < 5 {
            return Err(anyhow!("output has {} features, need at least 5", features));
        }
        let classes = features - 4;
        let sx = frame.width as f32 / self.input_size as f32;
        let sy = frame.height as f32 / self.input_size as f32;

        let mut raw = Vec::new();
        for i in 0..candidates {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..classes {
                let score = view[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if best_score < self.filter.confidence_threshold {
                continue;
            }
            let cx = view[[0, 0, i]] * sx;
            let cy = view[[0, 1, i]] * sy;
            let w = view[[0, 2, i]] * sx;
            let h = view[[0, 3, i]] * sy;
            let name = self
                .labels
                .get(best_class)
                .cloned()
                .unwrap_or_else(|| format!("class{}", best_class));
            raw.push(Detection::new(
                [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                name,
                best_score,
            ));
        }

        Ok(self
            .filter
            .apply(non_max_suppression(raw, NMS_IOU_THRESHOLD)))
    }
}

fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read labels from {}", path.display()))?;
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(labels)
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::blank(self.input_size, self.input_size, 0)?;
        self.detect(&blank).map(|_| ())
    }
}
