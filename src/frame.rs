//! Frame container and frame geometry.
//!
//! - `Frame`: RGB24 pixels produced by a `FrameSource`, consumed by a `Detector`.
//! - `FrameGeometry`: dimensions, centre and the normalisation distance that every
//!   selection and direction computation works in.
//!
//! Frames live for one guidance tick. Nothing downstream of the detector keeps pixels.

use anyhow::{anyhow, Result};

/// A point in pixel coordinates (x to the right, y downward).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One captured frame. Pixels are RGB24, row-major, `width * height * 3` bytes.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source capture counter, starting at 1.
    pub sequence: u64,
}

impl Frame {
    /// Wrap captured pixels. Fails when the buffer does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// All-black frame of the given size.
    pub fn blank(width: u32, height: u32, sequence: u64) -> Result<Self> {
        let len = rgb_len(width, height)?;
        Self::new(vec![0u8; len], width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Derived frame dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    pub width: f32,
    pub height: f32,
    pub center: Point,
    /// Half the frame diagonal: the distance at which closeness reaches zero.
    pub max_diagonal_half: f32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            width: w,
            height: h,
            center: Point::new(w / 2.0, h / 2.0),
            max_diagonal_half: (w * w + h * h).sqrt() / 2.0,
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn distance_from_center(&self, point: Point) -> f32 {
        point.distance_to(self.center)
    }

    /// Closeness of `point` to the frame centre: 1.0 at the centre, 0.0 at (or beyond)
    /// half the diagonal.
    pub fn distance_score(&self, point: Point) -> f32 {
        if self.max_diagonal_half <= 0.0 {
            return 0.0;
        }
        let ratio = self.distance_from_center(point) / self.max_diagonal_half;
        1.0 - ratio.min(1.0)
    }
}
