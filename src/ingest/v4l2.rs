//! V4L2 camera capture.
//!
//! RGB3 is requested at the configured size and rate. When the driver keeps its own
//! format, NV12 and YUYV are converted to RGB24 on every frame.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::config::CameraSettings;
use crate::frame::Frame;

/// Buffers queued in the kernel while a frame is being processed.
const STREAM_BUFFERS: u32 = 4;

#[self_referencing]
struct OpenCamera {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Negotiated capture mode of an open device.
#[derive(Clone, Copy, Debug)]
struct CaptureMode {
    width: u32,
    height: u32,
    format: PixelFormat,
}

pub(crate) struct DeviceSource {
    settings: CameraSettings,
    open: Option<(OpenCamera, CaptureMode)>,
    sequence: u64,
    failed: bool,
}

impl DeviceSource {
    pub(crate) fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            open: None,
            sequence: 0,
            failed: false,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.settings.source.as_str();
        let device = v4l::Device::with_path(path)
            .with_context(|| format!("camera {} could not be opened", path))?;

        let mode = negotiate(&device, &self.settings)?;
        let params = v4l::video::capture::Parameters::with_fps(self.settings.fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!("camera: {} ignored {} fps request: {}", path, self.settings.fps, err);
        }

        let camera = OpenCameraTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow!("camera stream setup failed: {}", err))
            },
        }
        .try_build()?;

        log::info!(
            "camera: {} open at {}x{} ({:?})",
            path,
            mode.width,
            mode.height,
            mode.format
        );
        self.open = Some((camera, mode));
        self.failed = false;
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (camera, mode) = self
            .open
            .as_mut()
            .ok_or_else(|| anyhow!("camera {} is not started", self.settings.source))?;
        let captured = camera.with_stream_mut(|stream| stream.next().map(|(buf, _)| buf.to_vec()));
        let raw = match captured {
            Ok(raw) => raw,
            Err(err) => {
                self.failed = true;
                return Err(anyhow!("camera {} read failed: {}", self.settings.source, err));
            }
        };

        let rgb = normalize_to_rgb(&raw, mode.width, mode.height, mode.format)?;
        self.sequence += 1;
        self.failed = false;
        Frame::new(rgb, mode.width, mode.height, self.sequence)
    }

    pub(crate) fn disconnect(&mut self) {
        if self.open.take().is_some() {
            log::info!("camera: {} closed", self.settings.source);
        }
    }

    pub(crate) fn is_healthy(&self) -> bool {
        self.open.is_some() && !self.failed
    }
}

/// Ask for RGB3 at the configured size and read back what the driver settled on.
fn negotiate(device: &v4l::Device, settings: &CameraSettings) -> Result<CaptureMode> {
    use v4l::video::Capture;

    let mut wanted = device.format().context("camera format query failed")?;
    wanted.width = settings.width;
    wanted.height = settings.height;
    wanted.fourcc = v4l::FourCC::new(b"RGB3");

    let actual = device.set_format(&wanted).or_else(|err| {
        log::warn!("camera: {} refused RGB3: {}", settings.source, err);
        device.format()
    })?;
    let format = PixelFormat::from_fourcc(&actual.fourcc.repr).ok_or_else(|| {
        anyhow!(
            "camera {} delivers {}, which cannot be converted to RGB",
            settings.source,
            actual.fourcc
        )
    })?;
    Ok(CaptureMode {
        width: actual.width,
        height: actual.height,
        format,
    })
}
