//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns a 112×112 aligned face crop into an L2-normalized 512-d embedding
//! using the w600k_r50 model.

use crate::alignment::ALIGNED_SIZE;
use crate::types::Embedding;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download w600k_r50.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("aligned crop must be 112x112, got {0}x{1}")]
    BadCropSize(u32, u32),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an embedding from an aligned 112×112 crop.
    pub fn extract(&mut self, aligned: &GrayImage) -> Result<Embedding, RecognizerError> {
        let input = preprocess(aligned)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: raw.to_vec(),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        }
        .l2_normalized())
    }
}

/// Normalize an aligned grayscale crop into a 1×3×112×112 tensor, luma replicated per channel.
fn preprocess(aligned: &GrayImage) -> Result<Array4<f32>, RecognizerError> {
    let (w, h) = aligned.dimensions();
    if (w, h) != (ALIGNED_SIZE, ALIGNED_SIZE) {
        return Err(RecognizerError::BadCropSize(w, h));
    }

    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        let normalized = (pixel[0] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = normalized;
        }
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let crop = GrayImage::from_pixel(ALIGNED_SIZE, ALIGNED_SIZE, Luma([255]));
        let tensor = preprocess(&crop).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 1, 50, 60]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_channels_identical() {
        let crop = GrayImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| Luma([((x + y) % 256) as u8]));
        let tensor = preprocess(&crop).unwrap();
        for y in 0..112 {
            for x in 0..112 {
                let r = tensor[[0, 0, y, x]];
                assert_eq!(r, tensor[[0, 1, y, x]]);
                assert_eq!(r, tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn test_preprocess_rejects_wrong_size() {
        let crop = GrayImage::new(100, 112);
        assert!(matches!(preprocess(&crop), Err(RecognizerError::BadCropSize(100, 112))));
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceRecognizer::load(Path::new("/nonexistent/w600k_r50.onnx")).err().unwrap();
        assert!(matches!(err, RecognizerError::ModelNotFound(_)));
    }
}
