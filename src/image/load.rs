//! Image loading utilities.

use image::error::{ParameterError, ParameterErrorKind};
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, ImageError, RgbImage};

use crate::error::{Error, Result};

use super::{ImageTensor, RGB_CHANNELS};

/// Decode an uploaded image and convert it to a normalized tensor.
///
/// The image is:
/// 1. Decoded from memory (JPEG or PNG, any color type)
/// 2. Converted to RGB with `f32` samples in [0, 1]
/// 3. Resized so its longer side equals `max_dim`, keeping the aspect ratio
/// 4. Returned as NHWC tensor (1, height, width, 3)
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a decodable raster image.
pub fn decode_and_resize(bytes: &[u8], max_dim: u32) -> Result<ImageTensor> {
    let img = decode(bytes)?;

    let original = img.dimensions();
    let (width, height) = scaled_dimensions(original, max_dim);
    tracing::debug!(
        "Resizing {}x{} -> {width}x{height}",
        original.0,
        original.1
    );

    // Bilinear on float samples keeps values inside [0, 1]
    let resized = imageops::resize(&img.to_rgb32f(), width, height, FilterType::Triangle);

    let (width, height) = (width as usize, height as usize);
    ImageTensor::from_shape_vec((1, height, width, RGB_CHANNELS), resized.into_raw()).map_err(
        |_| Error::ShapeMismatch {
            expected: format!("(1, {height}, {width}, {RGB_CHANNELS})"),
            actual: "reshape failed".to_string(),
        },
    )
}

/// Decode an uploaded image into a fixed `size x size` RGB thumbnail.
///
/// The aspect ratio is not preserved.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a decodable raster image.
pub fn preview(bytes: &[u8], size: u32) -> Result<RgbImage> {
    let img = decode(bytes)?;
    Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

/// Target dimensions for an image of `(width, height)` whose longer side becomes `max_dim`.
///
/// Each side is `round(side * max_dim / longer_side)`, never less than one pixel.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_dimensions((width, height): (u32, u32), max_dim: u32) -> (u32, u32) {
    let long_dim = width.max(height).max(1);
    let scale = f64::from(max_dim) / f64::from(long_dim);

    // Safe: a rounded side is at most max_dim
    let scale_side = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);

    (scale_side(width), scale_side(height))
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes).map_err(|source| Error::Decode { source })?;

    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Decode {
            source: ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            )),
        });
    }

    Ok(img)
}
