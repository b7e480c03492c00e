//! Style transfer model invocation.

use std::fmt;
use std::path::Path;

use image::{imageops, imageops::FilterType, ImageBuffer, Rgb};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};
use crate::image::{ImageTensor, RGB_CHANNELS};

use super::loader::{ModelCache, ModelSource};

/// A pretrained arbitrary style transfer model.
///
/// Implementations map a content tensor and a style tensor (both NHWC, batch of
/// one, values in [0, 1]) to the model's output collection. The first output is
/// the stylized image; any further outputs are auxiliary.
pub trait StyleModel {
    /// Run the model once.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn run(&mut self, content: &ImageTensor, style: &ImageTensor) -> Result<Vec<ImageTensor>>;
}

impl<M: StyleModel + ?Sized> StyleModel for Box<M> {
    fn run(&mut self, content: &ImageTensor, style: &ImageTensor) -> Result<Vec<ImageTensor>> {
        (**self).run(content, style)
    }
}

/// Apply the style of `style` to `content`.
///
/// Returns the first element of the model's outputs. If the model returns an
/// image whose spatial size differs from the content tensor, it is resampled
/// back to the content's height and width.
///
/// # Errors
///
/// Returns an error if inference fails, the model returns nothing, or the
/// primary output is not a single RGB image.
pub fn stylize<M: StyleModel + ?Sized>(
    model: &mut M,
    content: &ImageTensor,
    style: &ImageTensor,
) -> Result<ImageTensor> {
    tracing::debug!(
        "Stylizing content {:?} with style {:?}",
        content.shape(),
        style.shape()
    );

    let stylized = model
        .run(content, style)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::ModelOutput {
            reason: "empty output collection".to_string(),
        })?;

    let (batch, height, width, channels) = stylized.dim();
    if batch != 1 || channels != RGB_CHANNELS {
        return Err(Error::ShapeMismatch {
            expected: format!("(1, h, w, {RGB_CHANNELS})"),
            actual: format!("{:?}", stylized.shape()),
        });
    }

    let (_, content_height, content_width, _) = content.dim();
    if (height, width) == (content_height, content_width) {
        return Ok(stylized);
    }

    tracing::debug!(
        "Resampling output {width}x{height} to content size {content_width}x{content_height}"
    );
    resample(&stylized, content_height, content_width)
}

/// Resize a (1, h, w, 3) tensor to (1, `height`, `width`, 3) bilinearly.
fn resample(tensor: &ImageTensor, height: usize, width: usize) -> Result<ImageTensor> {
    let (_, src_height, src_width, _) = tensor.dim();

    let to_u32 = |value: usize| {
        u32::try_from(value).map_err(|_| Error::ShapeMismatch {
            expected: "image dimensions that fit in u32".to_string(),
            actual: value.to_string(),
        })
    };

    let frame: ImageBuffer<Rgb<f32>, Vec<f32>> = ImageBuffer::from_raw(
        to_u32(src_width)?,
        to_u32(src_height)?,
        tensor.iter().copied().collect(),
    )
    .ok_or_else(|| Error::ShapeMismatch {
        expected: format!("{src_width}x{src_height} RGB buffer"),
        actual: "buffer too small".to_string(),
    })?;

    let resized = imageops::resize(&frame, to_u32(width)?, to_u32(height)?, FilterType::Triangle);

    Array4::from_shape_vec((1, height, width, RGB_CHANNELS), resized.into_raw()).map_err(|_| {
        Error::ShapeMismatch {
            expected: format!("(1, {height}, {width}, {RGB_CHANNELS})"),
            actual: "reshape failed".to_string(),
        }
    })
}

/// Style model backed by an ONNX Runtime session.
pub struct OnnxStyleModel {
    name: String,
    session: Session,
}

impl OnnxStyleModel {
    /// Load the model described by `source`, downloading it into `cache` on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be downloaded or loaded.
    pub fn load(cache: &ModelCache, source: &ModelSource) -> Result<Self> {
        let path = cache.get_model_path(source)?;
        Self::from_file(path)
    }

    /// Load an ONNX model from a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let session = Session::builder()
            .map_err(|source| Error::ModelLoad {
                name: name.clone(),
                source,
            })?
            .commit_from_file(path)
            .map_err(|source| Error::ModelLoad {
                name: name.clone(),
                source,
            })?;

        tracing::info!("Loaded {name}");

        Ok(Self { name, session })
    }

    /// Name of the loaded model file.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for OnnxStyleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxStyleModel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl StyleModel for OnnxStyleModel {
    fn run(&mut self, content: &ImageTensor, style: &ImageTensor) -> Result<Vec<ImageTensor>> {
        let content_value =
            Tensor::from_array(content.clone()).map_err(|source| Error::Inference { source })?;
        let style_value =
            Tensor::from_array(style.clone()).map_err(|source| Error::Inference { source })?;

        let outputs = self
            .session
            .run(ort::inputs![content_value, style_value])
            .map_err(|source| Error::Inference { source })?;

        let tensors = keep_primary_output(outputs.values().map(|output| extract_array4(&output)))?;

        Ok(tensors)
    }
}

/// Collect extracted model outputs.
///
/// The first output must be an image tensor. Later outputs are auxiliary and
/// are dropped when they are not.
fn keep_primary_output<I>(extracted: I) -> Result<Vec<ImageTensor>>
where
    I: IntoIterator<Item = Result<ImageTensor>>,
{
    let mut extracted = extracted.into_iter();

    let primary = extracted.next().ok_or_else(|| Error::ModelOutput {
        reason: "empty output collection".to_string(),
    })??;

    let mut tensors = vec![primary];
    for (index, output) in extracted.enumerate() {
        match output {
            Ok(tensor) => tensors.push(tensor),
            Err(err) => tracing::debug!("Skipping auxiliary output {}: {err}", index + 1),
        }
    }

    Ok(tensors)
}

/// Extract a 4D array from an ONNX value.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn extract_array4(value: &ort::value::ValueRef<'_>) -> Result<Array4<f32>> {
    let (shape_info, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|source| Error::Inference { source })?;

    // Safe: tensor dimensions are always non-negative and within bounds
    let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();

    if dims.len() != 4 {
        return Err(Error::ShapeMismatch {
            expected: "4D tensor".to_string(),
            actual: format!("{}D tensor", dims.len()),
        });
    }

    Array4::from_shape_vec((dims[0], dims[1], dims[2], dims[3]), data.to_vec()).map_err(|_| {
        Error::ShapeMismatch {
            expected: format!("{dims:?}"),
            actual: "reshape failed".to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Returns the content inverted plus an auxiliary output.
    struct Invert;

    impl StyleModel for Invert {
        fn run(&mut self, content: &ImageTensor, style: &ImageTensor) -> Result<Vec<ImageTensor>> {
            Ok(vec![content.mapv(|v| 1.0 - v), style.clone()])
        }
    }

    /// Returns a fixed-size output regardless of input.
    struct FixedOutput(Array4<f32>);

    impl StyleModel for FixedOutput {
        fn run(&mut self, _: &ImageTensor, _: &ImageTensor) -> Result<Vec<ImageTensor>> {
            Ok(vec![self.0.clone()])
        }
    }

    struct Silent;

    impl StyleModel for Silent {
        fn run(&mut self, _: &ImageTensor, _: &ImageTensor) -> Result<Vec<ImageTensor>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_stylize_preserves_shape() {
        let content = Array4::<f32>::from_elem((1, 341, 512, 3), 0.25);
        let style = Array4::<f32>::from_elem((1, 512, 512, 3), 0.9);

        let stylized = stylize(&mut Invert, &content, &style).unwrap();

        assert_eq!(stylized.shape(), &[1, 341, 512, 3]);
        // First output is kept, the auxiliary one is dropped
        assert!((stylized[[0, 0, 0, 0]] - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_stylize_through_box() {
        let mut model: Box<dyn StyleModel> = Box::new(Invert);
        let content = Array4::<f32>::zeros((1, 8, 4, 3));
        let style = Array4::<f32>::zeros((1, 16, 16, 3));

        let stylized = stylize(&mut model, &content, &style).unwrap();
        assert_eq!(stylized.shape(), content.shape());
    }

    #[test]
    fn test_stylize_resamples_to_content_size() {
        let content = Array4::<f32>::zeros((1, 20, 30, 3));
        let style = Array4::<f32>::zeros((1, 16, 16, 3));
        let mut model = FixedOutput(Array4::from_elem((1, 24, 32, 3), 0.5));

        let stylized = stylize(&mut model, &content, &style).unwrap();

        assert_eq!(stylized.shape(), &[1, 20, 30, 3]);
        assert!(stylized.iter().all(|&v| (v - 0.5).abs() < 1e-4));
    }

    #[test]
    fn test_stylize_rejects_wrong_channels() {
        let content = Array4::<f32>::zeros((1, 8, 8, 3));
        let mut model = FixedOutput(Array4::zeros((1, 8, 8, 4)));

        let err = stylize(&mut model, &content, &content).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_stylize_empty_outputs() {
        let content = Array4::<f32>::zeros((1, 8, 8, 3));

        let err = stylize(&mut Silent, &content, &content).unwrap_err();
        assert!(matches!(err, Error::ModelOutput { .. }));
        assert_eq!(err.kind(), ErrorKind::Inference);
    }

    #[test]
    fn test_missing_model_file() {
        let err = OnnxStyleModel::from_file("does/not/exist.onnx").unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
        assert!(err.to_string().contains("exist.onnx"));
    }

    #[test]
    fn test_auxiliary_outputs_that_fail_extraction_are_dropped() {
        let primary = Array4::<f32>::from_elem((1, 4, 4, 3), 0.5);
        let extracted = vec![
            Ok(primary.clone()),
            Err(Error::ShapeMismatch {
                expected: "4D tensor".to_string(),
                actual: "0D tensor".to_string(),
            }),
            Ok(Array4::<f32>::zeros((1, 2, 2, 3))),
        ];

        let tensors = keep_primary_output(extracted).unwrap();

        assert_eq!(tensors.len(), 2);
        assert_eq!(tensors[0], primary);
    }

    #[test]
    fn test_primary_output_must_extract() {
        let extracted = vec![
            Err(Error::ShapeMismatch {
                expected: "4D tensor".to_string(),
                actual: "2D tensor".to_string(),
            }),
            Ok(Array4::<f32>::zeros((1, 2, 2, 3))),
        ];

        let err = keep_primary_output(extracted).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let err = keep_primary_output(Vec::<Result<ImageTensor>>::new()).unwrap_err();
        assert!(matches!(err, Error::ModelOutput { .. }));
    }
}
