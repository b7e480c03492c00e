//! Content + style → stylized image pipeline.

mod transfer;

pub use transfer::{Config, Pipeline, Stylized};
