use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::config::CameraSettings;
use crate::frame::Frame;

/// Camera frame source.
///
/// `stub://` sources synthesise frames paced to the configured rate; device paths
/// go through V4L2 when the `ingest-v4l2` feature is enabled.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(super::v4l2::DeviceSource),
}

impl CameraSource {
    pub fn new(settings: CameraSettings) -> Result<Self> {
        if settings.source.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(settings)),
            });
        }
        Self::device(settings)
    }

    #[cfg(feature = "ingest-v4l2")]
    fn device(settings: CameraSettings) -> Result<Self> {
        Ok(Self {
            backend: CameraBackend::Device(super::v4l2::DeviceSource::new(settings)),
        })
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn device(settings: CameraSettings) -> Result<Self> {
        Err(anyhow!(
            "camera source '{}' requires the ingest-v4l2 feature (use stub:// to simulate)",
            settings.source
        ))
    }

    /// Frames delivered since construction.
    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(_) => 0,
        }
    }
}

impl FrameSource for CameraSource {
    fn start(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.start(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    fn stop(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.stop(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.disconnect(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.running,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticSource {
    settings: CameraSettings,
    frame_count: u64,
    running: bool,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
            running: false,
            next_due: None,
        }
    }

    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.next_due = None;
        log::info!(
            "camera: {} started (synthetic {}x{} @ {} fps)",
            self.settings.source,
            self.settings.width,
            self.settings.height,
            self.settings.fps
        );
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            log::info!("camera: {} stopped", self.settings.source);
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.running {
            return Err(anyhow!("camera {} is not started", self.settings.source));
        }
        self.pace();
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.settings.width, self.settings.height, self.frame_count)
    }

    fn pace(&mut self) {
        let period = Duration::from_millis(1000 / self.settings.fps.max(1) as u64);
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + period);
    }

    /// Horizontal gradient that drifts one step per frame.
    fn generate_pixels(&self) -> Vec<u8> {
        let w = self.settings.width as usize;
        let h = self.settings.height as usize;
        let mut pixels = vec![0u8; w * h * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % w) as u64;
            let shade = ((x * 255 / w.max(1) as u64 + self.frame_count) % 256) as u8;
            px[0] = shade;
            px[1] = shade / 2;
            px[2] = 255 - shade;
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuideConfig;

    fn stub_settings() -> CameraSettings {
        let mut settings = GuideConfig::defaults().camera;
        settings.width = 32;
        settings.height = 24;
        settings.fps = 1000;
        settings
    }

    #[test]
    fn synthetic_source_produces_sequenced_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_settings())?;
        source.start()?;
        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!((first.width, first.height), (32, 24));
        assert_eq!(first.sequence + 1, second.sequence);
        assert_ne!(first.pixels(), second.pixels());
        assert_eq!(source.frames_captured(), 2);
        Ok(())
    }

    #[test]
    fn stopped_source_refuses_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_settings())?;
        assert!(source.next_frame().is_err());
        source.start()?;
        assert!(source.is_healthy());
        source.stop();
        source.stop();
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_source_needs_feature() {
        let mut settings = stub_settings();
        settings.source = "/dev/video0".to_string();
        assert!(CameraSource::new(settings).is_err());
    }
}
