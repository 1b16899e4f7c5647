use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::{Detection, DetectionFilter};
use crate::frame::Frame;

/// Frames per sweep of the synthetic object across the frame.
const SWEEP_FRAMES: u64 = 60;
/// Trailing frames of each sweep in which the object is hidden.
const HIDDEN_FRAMES: u64 = 10;

/// Stub backend for running the pipeline without a model.
///
/// Reports one object of the configured class sweeping left to right along a
/// shallow diagonal, hidden for the last few frames of every sweep, plus a static
/// high-confidence "potted plant" in the top-left corner. Output depends only on the
/// frame sequence number and size.
pub struct StubBackend {
    class_name: String,
    filter: DetectionFilter,
}

impl StubBackend {
    pub fn new(class_name: impl Into<String>, filter: DetectionFilter) -> Self {
        Self {
            class_name: class_name.into(),
            filter,
        }
    }

    fn synthesize(&self, frame: &Frame) -> Vec<Detection> {
        let w = frame.width as f32;
        let h = frame.height as f32;
        let mut out = Vec::with_capacity(2);

        let phase = frame.sequence % SWEEP_FRAMES;
        if phase < SWEEP_FRAMES - HIDDEN_FRAMES {
            let t = phase as f32 / (SWEEP_FRAMES - HIDDEN_FRAMES - 1) as f32;
            let cx = w * (0.1 + 0.8 * t);
            let cy = h * (0.4 + 0.2 * t);
            let half_w = w * 0.06;
            let half_h = h * 0.12;
            out.push(Detection::new(
                [cx - half_w, cy - half_h, cx + half_w, cy + half_h],
                self.class_name.clone(),
                0.72,
            ));
        }

        out.push(Detection::new(
            [0.0, 0.0, w * 0.2, h * 0.3],
            "potted plant",
            0.91,
        ));
        out
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new("bottle", DetectionFilter::default())
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.filter.apply(self.synthesize(frame)))
    }
}
