//! Frame ingestion sources.
//!
//! - `stub://` synthetic frames (always available)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources hand out one RGB24 `Frame` per call. Nothing here stores frames or
//! forwards them anywhere.

use anyhow::Result;

use crate::frame::Frame;

mod camera;
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::CameraSource;

/// A camera-like producer of frames.
///
/// `start` and `stop` bracket one acquisition cycle; a source may be started again
/// after it was stopped. `stop` must be safe to call repeatedly.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    fn stop(&mut self);

    fn is_healthy(&self) -> bool {
        true
    }
}
