//! # stylecast
//!
//! Arbitrary neural style transfer with a local gallery.
//!
//! A content image and a style image are decoded into normalized NHWC tensors,
//! passed through a pretrained arbitrary-image-stylization model running on
//! ONNX Runtime, and the result is saved as a numbered PNG in a flat gallery
//! directory.
//!
//! ## Example
//!
//! ```no_run
//! use stylecast::{Config, Pipeline};
//!
//! # fn main() -> stylecast::Result<()> {
//! let mut pipeline = Pipeline::new(Config::default())?;
//!
//! let content = std::fs::read("content.jpg")?;
//! let style = std::fs::read("style.jpg")?;
//! let stylized = pipeline.transfer(&content, &style)?;
//!
//! println!("saved to {}", stylized.path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gallery;
pub mod image;
pub mod model;
pub mod pipeline;

pub use error::{Error, ErrorKind, Result};
pub use gallery::{Gallery, GalleryEntry};
pub use model::StyleModel;
pub use pipeline::{Config, Pipeline, Stylized};
