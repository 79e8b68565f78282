//! Detection + embedding behind one seam.

use crate::alignment;
use crate::config::{Config, CropMode};
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("face region lies outside the image")]
    EmptyCrop,
}

/// Face detection and embedding, as used by the gallery loader and the
/// recognition pipeline.
pub trait FaceAnalyzer {
    /// Detect faces, highest confidence first.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzeError>;

    /// Embed one detected face. Fails with [`AnalyzeError::EmptyCrop`] when
    /// the box has no pixels inside the image.
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, AnalyzeError>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzeError> {
        (**self).detect(image)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, AnalyzeError> {
        (**self).embed(image, face)
    }
}

/// SCRFD + ArcFace analyzer running on ONNX Runtime.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    crop_mode: CropMode,
}

impl OnnxAnalyzer {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer, crop_mode: CropMode) -> Self {
        Self {
            detector,
            recognizer,
            crop_mode,
        }
    }

    /// Load both models named by `config`. Fails fast if either is missing.
    pub fn from_config(config: &Config) -> Result<Self, AnalyzeError> {
        let detector = FaceDetector::load(
            &config.detector_model_path(),
            &config.detector,
            config.intra_threads,
        )?;
        let recognizer = FaceRecognizer::load(&config.recognizer_model_path(), config.intra_threads)?;
        Ok(Self::new(detector, recognizer, config.matching.crop_mode))
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzeError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, AnalyzeError> {
        let rect = face
            .to_crop_rect(image.width(), image.height())
            .ok_or(AnalyzeError::EmptyCrop)?;

        let crop = match (self.crop_mode, face.landmarks.as_ref()) {
            (CropMode::Aligned, Some(landmarks)) => alignment::align_face(image, landmarks),
            _ => alignment::crop_face(image, &rect),
        };

        Ok(self.recognizer.embed(&crop)?)
    }
}
