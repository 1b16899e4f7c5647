use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A detector turns one frame into the detections visible in it. The guidance loop
/// owns exactly one detector and calls it at most once per tick.
///
/// Errors are not fatal: the loop logs them and treats the tick as having zero
/// detections.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Bounding boxes are in the frame's pixel coordinates. Backends apply their
    /// confidence threshold and priority tagging before returning.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once at startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
