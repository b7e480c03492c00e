//! Flat on-disk gallery of stylized images.
//!
//! Images are stored as `stylized_image_<N>.png` with a 1-based sequence
//! number. Files are created with create-new semantics, so two writers racing
//! for the same number never overwrite each other; the loser moves on to the
//! next free number.

use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{Error, Result};
use crate::image::encode_png;

/// Default gallery directory, relative to the working directory.
pub const DEFAULT_GALLERY_DIR: &str = "stylized_images";

const FILE_PREFIX: &str = "stylized_image_";
const FILE_SUFFIX: &str = ".png";

/// A stored image: its file name and raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Gallery rooted at a single directory.
#[derive(Debug, Clone)]
pub struct Gallery {
    root: PathBuf,
}

impl Gallery {
    /// Create a handle for the gallery at `root`. Nothing is touched on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the images.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the gallery directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gallery`] if the directory cannot be created.
    pub fn ensure_store_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|source| gallery_error(&self.root, source))
    }

    /// Encode `image` as PNG and store it under the next free sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be encoded or written.
    pub fn save(&self, image: &RgbImage) -> Result<PathBuf> {
        let bytes = encode_png(image)?;
        let mut seq = self.next_sequence()?;

        loop {
            let path = self.root.join(file_name(seq));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let written = file.write_all(&bytes).and_then(|()| file.sync_all());
                    drop(file);
                    keep_or_discard(&path, written)?;
                    tracing::info!("Saved {}", path.display());
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!("{} already taken", path.display());
                    seq = self.bump(seq)?;
                }
                Err(source) => return Err(gallery_error(&path, source)),
            }
        }
    }

    /// List the stored images.
    ///
    /// Numbered images come first, ascending by sequence number, followed by
    /// any other files in lexicographic order. File contents are read as the
    /// iterator advances. A missing directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gallery`] if the directory cannot be read.
    pub fn list_entries(&self) -> Result<Entries> {
        let mut names = self.file_names()?;
        names.sort_by(|a, b| compare_names(a, b));

        Ok(Entries {
            root: self.root.clone(),
            names: names.into_iter(),
        })
    }

    /// One past the highest sequence number on disk.
    fn next_sequence(&self) -> Result<u64> {
        let highest = self
            .file_names()?
            .iter()
            .filter_map(|name| sequence_number(name))
            .max()
            .unwrap_or(0);
        self.bump(highest)
    }

    fn bump(&self, seq: u64) -> Result<u64> {
        seq.checked_add(1).ok_or_else(|| {
            gallery_error(
                &self.root,
                std::io::Error::other("gallery sequence numbers exhausted"),
            )
        })
    }

    fn file_names(&self) -> Result<Vec<String>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(gallery_error(&self.root, source)),
        };

        let mut names = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|source| gallery_error(&self.root, source))?;
            let file_type = entry
                .file_type()
                .map_err(|source| gallery_error(&entry.path(), source))?;
            if !file_type.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => tracing::debug!("Skipping non UTF-8 file name {name:?}"),
            }
        }
        Ok(names)
    }
}

/// Lazy iterator over gallery entries, see [`Gallery::list_entries`].
#[derive(Debug)]
pub struct Entries {
    root: PathBuf,
    names: std::vec::IntoIter<String>,
}

impl Iterator for Entries {
    type Item = Result<GalleryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        let path = self.root.join(&name);
        Some(
            fs::read(&path)
                .map(|bytes| GalleryEntry { name, bytes })
                .map_err(|source| Error::Gallery { path, source }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.names.size_hint()
    }
}

impl ExactSizeIterator for Entries {}

/// Turn a failed write into an error, removing the partial file so it is
/// neither listed nor holding its sequence number.
fn keep_or_discard(path: &Path, written: std::io::Result<()>) -> Result<()> {
    written.map_err(|source| {
        if let Err(err) = fs::remove_file(path) {
            tracing::warn!("Could not remove partial file {}: {err}", path.display());
        }
        gallery_error(path, source)
    })
}

fn gallery_error(path: &Path, source: std::io::Error) -> Error {
    Error::Gallery {
        path: path.to_path_buf(),
        source,
    }
}

fn file_name(seq: u64) -> String {
    format!("{FILE_PREFIX}{seq}{FILE_SUFFIX}")
}

/// Sequence number embedded in a gallery file name, if it has one.
fn sequence_number(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn compare_names(a: &str, b: &str) -> Ordering {
    match (sequence_number(a), sequence_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
