//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns 112×112 RGB face crops into 512-dimensional, L2-normalized
//! embeddings using the w600k_r50 ArcFace model.

use crate::alignment::ALIGNED_SIZE;
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
pub const ARCFACE_EMBEDDING_DIM: usize = 512;
pub const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (download w600k_r50.onnx from insightface buffalo_l)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop must be 112x112, got {0}x{1}")]
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
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Embed an aligned 112×112 face crop.
    pub fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError> {
        if face.dimensions() != (ALIGNED_SIZE, ALIGNED_SIZE) {
            return Err(RecognizerError::BadCropSize(face.width(), face.height()));
        }

        let input = preprocess(face);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let mut embedding = Embedding::new(raw.to_vec()).normalized();
        embedding.model_version = Some(ARCFACE_MODEL_VERSION.to_string());
        Ok(embedding)
    }
}

/// Convert an RGB crop into a NCHW float tensor.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let (w, h) = (face.width() as usize, face.height() as usize);
    Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
        (face.get_pixel(x as u32, y as u32)[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD
    })
}
