//! Image saving utilities.

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use ndarray::Axis;

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Convert a normalized NHWC tensor to an RGB image.
///
/// Samples are scaled by 255 and truncated to `u8`, then the batch dimension is dropped.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] unless the tensor has exactly one batch
/// element and three channels.
pub fn tensor_to_image(tensor: &ImageTensor) -> Result<RgbImage> {
    let (batch, height, width, channels) = tensor.dim();

    if batch != 1 || channels != RGB_CHANNELS {
        return Err(Error::ShapeMismatch {
            expected: format!("(1, h, w, {RGB_CHANNELS})"),
            actual: format!("{:?}", tensor.shape()),
        });
    }

    let frame = tensor.index_axis(Axis(0), 0);
    // Logical iteration order is row-major HWC whatever the memory layout
    let raw: Vec<u8> = frame.iter().copied().map(denormalize).collect();

    let too_large = || Error::ShapeMismatch {
        expected: "image dimensions that fit in u32".to_string(),
        actual: format!("{width}x{height}"),
    };
    let width = u32::try_from(width).map_err(|_| too_large())?;
    let height = u32::try_from(height).map_err(|_| too_large())?;

    RgbImage::from_raw(width, height, raw).ok_or_else(|| Error::ShapeMismatch {
        expected: format!("{width}x{height} RGB buffer"),
        actual: "buffer too small".to_string(),
    })
}

/// Encode an image as PNG bytes, the payload served for downloads.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the encoder fails.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|source| Error::Encode { source })?;
    Ok(bytes)
}

/// Denormalize a value from [0, 1] to [0, 255] with clamping.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn denormalize(value: f32) -> u8 {
    // Safe: clamped to [0, 255] range before casting
    (value * 255.0).clamp(0.0, 255.0) as u8
}
