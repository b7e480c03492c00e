//! Request handler for a single style transfer.

use std::path::{Path, PathBuf};

use ::image::RgbImage;

use crate::error::{Error, Result};
use crate::gallery::{Gallery, DEFAULT_GALLERY_DIR};
use crate::image::{self, MAX_DIM, PREVIEW_SIZE};
use crate::model::{self, ModelCache, ModelSource, OnnxStyleModel, StyleModel};

/// Configuration for the style transfer pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Longer side of the content and style tensors fed to the model.
    pub max_dim: u32,

    /// Edge length of the square upload previews.
    pub preview_size: u32,

    /// Directory the stylized images are saved to.
    pub gallery_dir: PathBuf,

    /// Where the pretrained ONNX model is downloaded from.
    ///
    /// Required by [`Pipeline::new`]; pipelines built with
    /// [`Pipeline::with_model`] ignore it.
    pub model_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_dim: MAX_DIM,
            preview_size: PREVIEW_SIZE,
            gallery_dir: PathBuf::from(DEFAULT_GALLERY_DIR),
            model_url: None,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.max_dim == 0 {
            return Err(Error::InvalidParameter {
                name: "max_dim".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.preview_size == 0 {
            return Err(Error::InvalidParameter {
                name: "preview_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.model_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(Error::InvalidParameter {
                name: "model_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Result of a successful transfer.
#[derive(Debug, Clone)]
pub struct Stylized {
    /// The stylized image, at the content tensor's size.
    pub image: RgbImage,
    /// Where the gallery copy was written.
    pub path: PathBuf,
}

impl Stylized {
    /// PNG bytes for download, see [`image::PNG_MIME`].
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn png_bytes(&self) -> Result<Vec<u8>> {
        image::encode_png(&self.image)
    }
}

/// Style transfer pipeline holding the once-loaded model and the gallery.
pub struct Pipeline<M = OnnxStyleModel> {
    config: Config,
    model: M,
    gallery: Gallery,
}

impl Pipeline<OnnxStyleModel> {
    /// Create a new pipeline with the given configuration.
    ///
    /// This will download the model if it is not already cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or the gallery cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let Some(url) = config.model_url.as_deref() else {
            return Err(Error::InvalidParameter {
                name: "model_url".to_string(),
                reason: "no model URL configured (pass --model-url)".to_string(),
            });
        };
        let source = ModelSource::from_url(url);

        tracing::info!("Initializing pipeline with config: {config:?}");

        let cache = ModelCache::new()?;

        tracing::info!("Loading style model...");
        let model = OnnxStyleModel::load(&cache, &source)?;

        Self::with_model(config, model)
    }
}

impl<M: StyleModel> Pipeline<M> {
    /// Create a pipeline around an already constructed model.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the gallery cannot be created.
    pub fn with_model(config: Config, model: M) -> Result<Self> {
        config.validate()?;

        let gallery = Gallery::new(config.gallery_dir.clone());
        gallery.ensure_store_exists()?;

        tracing::info!("Pipeline initialized successfully");

        Ok(Self {
            config,
            model,
            gallery,
        })
    }

    /// Stylize `content` with `style` and save the result to the gallery.
    ///
    /// Both arguments are encoded image files (JPEG or PNG).
    ///
    /// # Errors
    ///
    /// Returns an error if decoding, inference or saving fails.
    pub fn transfer(&mut self, content: &[u8], style: &[u8]) -> Result<Stylized> {
        tracing::info!("Decoding content image...");
        let content_tensor = image::decode_and_resize(content, self.config.max_dim)?;

        tracing::info!("Decoding style image...");
        let style_tensor = image::decode_and_resize(style, self.config.max_dim)?;

        tracing::info!("Applying style...");
        let stylized = model::stylize(&mut self.model, &content_tensor, &style_tensor)?;

        let image = image::tensor_to_image(&stylized)?;
        let path = self.gallery.save(&image)?;

        tracing::info!("Transfer complete");
        Ok(Stylized { image, path })
    }

    /// Square thumbnail of an uploaded image.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded.
    pub fn preview(&self, bytes: &[u8]) -> Result<RgbImage> {
        image::preview(bytes, self.config.preview_size)
    }

    /// The gallery this pipeline saves into.
    #[must_use]
    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Directory the gallery lives in.
    #[must_use]
    pub fn gallery_dir(&self) -> &Path {
        self.gallery.root()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
