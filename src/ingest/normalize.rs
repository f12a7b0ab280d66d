use anyhow::{anyhow, Result};
use image::RgbaImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

/// Convert one captured frame into an RGBA image.
pub(crate) fn normalize_to_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbaImage> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

    let expected = match format {
        PixelFormat::Rgb24 => plane * 3,
        PixelFormat::Yuyv => plane * 2,
        PixelFormat::Nv12 => plane + plane / 2,
    };
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    let mut rgba = RgbaImage::new(width, height);
    for j in 0..h {
        for i in 0..w {
            let [r, g, b] = match format {
                PixelFormat::Rgb24 => {
                    let offset = (j * w + i) * 3;
                    [pixels[offset], pixels[offset + 1], pixels[offset + 2]]
                }
                PixelFormat::Yuyv => {
                    let pair = (j * w + (i & !1)) * 2;
                    let y = pixels[pair + (i & 1) * 2];
                    yuv_to_rgb(y, pixels[pair + 1], pixels[pair + 3])
                }
                PixelFormat::Nv12 => {
                    let uv_index = plane + (j / 2) * w + (i / 2) * 2;
                    yuv_to_rgb(pixels[j * w + i], pixels[uv_index], pixels[uv_index + 1])
                }
            };
            rgba.put_pixel(i as u32, j as u32, image::Rgba([r, g, b, 255]));
        }
    }
    Ok(rgba)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
