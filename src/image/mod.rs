//! Image decoding, resizing and encoding.

mod load;
mod save;

pub use load::{decode_and_resize, preview, scaled_dimensions};
pub use save::{encode_png, tensor_to_image};

use ndarray::Array4;

/// Image tensor in NHWC format (batch, height, width, channels).
/// Values are normalized to the [0, 1] range the style model expects.
pub type ImageTensor = Array4<f32>;

/// Longer side of a decoded image after resizing.
pub const MAX_DIM: u32 = 512;

/// Edge length of the square thumbnails shown next to each other before a transfer.
pub const PREVIEW_SIZE: u32 = 256;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// MIME type of the download payload produced by [`encode_png`].
pub const PNG_MIME: &str = "image/png";
