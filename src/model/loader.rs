//! Model downloading and caching utilities.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

/// Filename used when a URL has no usable last path segment.
const FALLBACK_FILENAME: &str = "style_model.onnx";

/// Where a model comes from and where it is cached.
///
/// The expected model is an ONNX export of Magenta's
/// arbitrary-image-stylization-v1-256: inputs are the content and style
/// tensors (NHWC, `f32` in [0, 1]) and the first output is the stylized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    url: String,
    cache_path: PathBuf,
}

impl ModelSource {
    /// Describe a model downloaded from `url`.
    ///
    /// The cache location mirrors the URL's host and path, so two URLs that
    /// share a last segment never share a cached file.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let cache_path = cache_components(&url).into_iter().collect();

        Self { url, cache_path }
    }

    /// Remote location of the model.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Name of the cached file.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.cache_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(FALLBACK_FILENAME)
    }

    /// Location of the cached file, relative to the cache directory.
    #[must_use]
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }
}

/// Host and path segments of `url`, made safe to use as path components.
fn cache_components(url: &str) -> Vec<String> {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme.split(['?', '#']).next().unwrap_or_default();

    let mut components: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(sanitize)
        .collect();

    // Host only, or a directory URL: there is no file name to reuse
    if components.len() < 2 || path.ends_with('/') {
        components.push(FALLBACK_FILENAME.to_string());
    }

    components
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Manages the model cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache.
    ///
    /// Uses the platform-appropriate cache directory:
    /// - Windows: `%LOCALAPPDATA%\stylecast\models`
    /// - Linux: `~/.cache/stylecast/models`
    /// - macOS: `~/Library/Caches/stylecast/models`
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new() -> Result<Self> {
        let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join("stylecast").join("models"))
    }

    /// Create a model cache rooted at `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn at(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        create_cache_dir(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Directory holding the cached models.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the path to a model file, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be downloaded or accessed.
    pub fn get_model_path(&self, source: &ModelSource) -> Result<PathBuf> {
        let path = self.cache_dir.join(source.cache_path());

        if path.exists() {
            tracing::debug!("Using cached model {}", path.display());
        } else {
            if let Some(parent) = path.parent() {
                create_cache_dir(parent)?;
            }
            download_file(source.url(), &path, source.filename())?;
        }

        Ok(path)
    }
}

fn create_cache_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| Error::CacheDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, name: &str) -> Result<()> {
    tracing::info!("Downloading {name} from {url}");

    let client = reqwest::blocking::Client::new();
    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| Error::ModelDownload {
            name: name.to_string(),
            source,
        })?;

    let pb = response
        .content_length()
        .map_or_else(ProgressBar::no_length, ProgressBar::new);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {name}"));

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    let copied = copy_body(&mut pb.wrap_read(response), &mut file, name)
        .and_then(|_| file.sync_all().map_err(Error::from));
    drop(file);

    if let Err(err) = copied {
        pb.abandon_with_message(format!("Failed to download {name}"));
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            tracing::debug!("Could not remove {}: {cleanup}", temp_path.display());
        }
        return Err(err);
    }

    pb.finish_with_message(format!("Downloaded {name}"));

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Copy a response body into `writer`.
///
/// Read failures are network failures and map to [`Error::ModelTransfer`];
/// write failures stay I/O errors.
fn copy_body<R: Read, W: Write>(reader: &mut R, writer: &mut W, name: &str) -> Result<u64> {
    let mut buffer = [0u8; 8192];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(Error::ModelTransfer {
                    name: name.to_string(),
                    source,
                })
            }
        };
        writer.write_all(&buffer[..bytes_read])?;
        total += bytes_read as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Yields some bytes, then fails like a dropped connection.
    struct DroppedConnection {
        sent: bool,
    }

    impl Read for DroppedConnection {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                ));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"onnx");
            Ok(4)
        }
    }

    #[test]
    fn test_filename_from_url() {
        let source = ModelSource::from_url("https://example.com/models/magenta.onnx");
        assert_eq!(source.filename(), "magenta.onnx");
        assert_eq!(source.url(), "https://example.com/models/magenta.onnx");
        assert_eq!(
            source.cache_path(),
            Path::new("example.com").join("models").join("magenta.onnx")
        );
    }

    #[test]
    fn test_filename_ignores_query() {
        let source = ModelSource::from_url("https://example.com/a/model.onnx?download=true");
        assert_eq!(source.filename(), "model.onnx");
    }

    #[test]
    fn test_filename_fallback() {
        let source = ModelSource::from_url("https://example.com/models/");
        assert_eq!(source.filename(), FALLBACK_FILENAME);

        let source = ModelSource::from_url("https://example.com");
        assert_eq!(source.filename(), FALLBACK_FILENAME);
    }

    #[test]
    fn test_cache_path_is_sanitized() {
        let source = ModelSource::from_url("http://127.0.0.1:9/../a b/model.onnx");
        assert_eq!(
            source.cache_path(),
            Path::new("127.0.0.1_9").join("a_b").join("model.onnx")
        );
    }

    #[test]
    fn test_shared_last_segment_gets_separate_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::at(dir.path()).unwrap();
        let first = ModelSource::from_url("http://127.0.0.1:9/magenta/resolve/main/model.onnx");
        let second =
            ModelSource::from_url("http://127.0.0.1:9/someone/else/resolve/main/model.onnx");

        let cached = dir.path().join(first.cache_path());
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"first-model").unwrap();

        assert_eq!(cache.get_model_path(&first).unwrap(), cached);

        // The second URL is not cached, so it must go to the network (and fail)
        let err = cache.get_model_path(&second).unwrap_err();
        assert!(matches!(err, Error::ModelDownload { .. }));
        assert_ne!(first.cache_path(), second.cache_path());
    }

    #[test]
    fn test_cached_model_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::at(dir.path().join("models")).unwrap();
        // An unroutable URL proves no request is made
        let source = ModelSource::from_url("http://127.0.0.1:9/cached.onnx");
        let cached = cache.dir().join(source.cache_path());
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"onnx").unwrap();

        let path = cache.get_model_path(&source).unwrap();
        assert_eq!(path, cached);
    }

    #[test]
    fn test_unreachable_model_is_an_inference_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::at(dir.path()).unwrap();
        let source = ModelSource::from_url("http://127.0.0.1:9/missing.onnx");

        let err = cache.get_model_path(&source).unwrap_err();

        assert!(matches!(err, Error::ModelDownload { .. }));
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert!(!dir.path().join(source.cache_path()).exists());
    }

    #[test]
    fn test_copy_body_read_failure_is_a_transfer_error() {
        let mut sink = Vec::new();
        let err = copy_body(&mut DroppedConnection { sent: false }, &mut sink, "model.onnx")
            .unwrap_err();

        assert!(matches!(err, Error::ModelTransfer { .. }));
        assert_eq!(err.kind(), ErrorKind::Inference);
        assert_eq!(sink, b"onnx");
    }

    #[test]
    fn test_copy_body_counts_bytes() {
        let mut sink = Vec::new();
        let copied = copy_body(&mut &b"0123456789"[..], &mut sink, "model.onnx").unwrap();
        assert_eq!(copied, 10);
        assert_eq!(sink, b"0123456789");
    }
}
