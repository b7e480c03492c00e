//! Pretrained style model: download, loading and invocation.

mod loader;
mod style;

pub use loader::{ModelCache, ModelSource};
pub use style::{stylize, OnnxStyleModel, StyleModel};
