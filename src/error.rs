//! Custom error types for stylecast.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the stylecast library.
#[derive(Error, Debug)]
pub enum Error {
    /// Uploaded bytes are not a decodable raster image.
    #[error("failed to decode image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// Failed to encode an image as PNG.
    #[error("failed to encode image as PNG: {source}")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    /// Failed to download a model.
    #[error("failed to download model {name}: {source}")]
    ModelDownload {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    /// The connection failed while a model was being downloaded.
    #[error("download of model {name} was interrupted: {source}")]
    ModelTransfer {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// The model ran but did not produce a usable output.
    #[error("model produced no usable output: {reason}")]
    ModelOutput { reason: String },

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Failed to read or write the gallery directory.
    #[error("gallery I/O failed at {path}: {source}")]
    Gallery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create cache directory.
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable or unencodable image data.
    Decode,
    /// Anything between fetching the model and reading its output.
    Inference,
    /// Directory creation, reads and writes.
    Filesystem,
    /// Rejected configuration.
    Config,
}

impl Error {
    /// Which part of the pipeline this error came from.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode { .. } | Self::Encode { .. } => ErrorKind::Decode,
            Self::ModelDownload { .. }
            | Self::ModelTransfer { .. }
            | Self::ModelLoad { .. }
            | Self::Inference { .. }
            | Self::ModelOutput { .. }
            | Self::ShapeMismatch { .. } => ErrorKind::Inference,
            Self::Gallery { .. } | Self::CacheDir { .. } | Self::Io(_) => ErrorKind::Filesystem,
            Self::InvalidParameter { .. } => ErrorKind::Config,
        }
    }
}

/// Result type alias for stylecast operations.
pub type Result<T> = std::result::Result<T, Error>;
