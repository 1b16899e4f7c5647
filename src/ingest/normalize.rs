use anyhow::{anyhow, Result};

/// Capture formats the camera layer knows how to turn into RGB24.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let count = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            let expected = count * 3;
            check_len("RGB", pixels, expected)?;
            Ok(pixels.to_vec())
        }
        PixelFormat::Nv12 => {
            check_len("NV12", pixels, count + count / 2)?;
            let mut rgb = vec![0u8; count * 3];
            for j in 0..h {
                for i in 0..w {
                    let uv = count + (j / 2) * w + (i / 2) * 2;
                    write_rgb(&mut rgb, j * w + i, pixels[j * w + i], pixels[uv], pixels[uv + 1]);
                }
            }
            Ok(rgb)
        }
        PixelFormat::Yuyv => {
            if w % 2 != 0 {
                return Err(anyhow!("YUYV frame width must be even, got {}", w));
            }
            check_len("YUYV", pixels, count * 2)?;
            let mut rgb = vec![0u8; count * 3];
            for (pair, chunk) in pixels.chunks_exact(4).enumerate() {
                let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
                write_rgb(&mut rgb, pair * 2, y0, u, v);
                write_rgb(&mut rgb, pair * 2 + 1, y1, u, v);
            }
            Ok(rgb)
        }
    }
}

fn check_len(name: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            name,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn write_rgb(rgb: &mut [u8], index: usize, y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let offset = index * 3;
    rgb[offset] = clamp_to_u8(y + 1.402_f32 * v);
    rgb[offset + 1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    rgb[offset + 2] = clamp_to_u8(y + 1.772_f32 * u);
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
