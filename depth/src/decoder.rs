use crate::{error::DecodeError, types::DepthSurface};
use image::{DynamicImage, GenericImageView, ImageError};
use tracing::{debug, instrument};

const SAMPLE_MAX: f32 = u16::MAX as f32;

/// Widen an 8-bit channel to the 16-bit range (`0xAB` -> `0xABAB`).
fn widen(v: u8) -> u16 {
    u16::from(v) * 257
}

fn classify(e: ImageError) -> DecodeError {
    match e {
        ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
        other => DecodeError::Truncated(other.to_string()),
    }
}

/// Decode a depth visualization into normalized samples.
///
/// Single-channel sources contribute their luminance, everything else its red
/// channel; both are taken at 16-bit precision and divided by 65535. The
/// provider's near/far convention is kept as-is.
#[instrument(skip_all, level = "debug", fields(len = bytes.len()))]
pub fn decode(bytes: &[u8]) -> Result<DepthSurface, DecodeError> {
    let format = image::guess_format(bytes).map_err(classify)?;
    let img = image::load_from_memory_with_format(bytes, format).map_err(classify)?;
    let (width, height) = (img.width(), img.height());

    let samples: Vec<u16> = match img {
        DynamicImage::ImageLuma8(buf) => buf.pixels().map(|p| widen(p.0[0])).collect(),
        DynamicImage::ImageLumaA8(buf) => buf.pixels().map(|p| widen(p.0[0])).collect(),
        DynamicImage::ImageLuma16(buf) => buf.pixels().map(|p| p.0[0]).collect(),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().map(|p| p.0[0]).collect(),
        DynamicImage::ImageRgb8(buf) => buf.pixels().map(|p| widen(p.0[0])).collect(),
        DynamicImage::ImageRgba8(buf) => buf.pixels().map(|p| widen(p.0[0])).collect(),
        other => other.to_rgb16().pixels().map(|p| p.0[0]).collect(),
    };

    let values = samples
        .into_iter()
        .map(|s| f32::from(s) / SAMPLE_MAX)
        .collect();
    debug!(?format, width, height, "decoded depth artifact");
    DepthSurface::new(values, width, height).ok_or_else(|| {
        DecodeError::Truncated(format!(
            "pixel count does not match {}x{} dimensions",
            width, height
        ))
    })
}
