//! facematch-core: face recognition against a folder of known faces.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime on the CPU. Faces are labelled with the gallery
//! identity of highest cosine similarity.

pub mod alignment;
pub mod analyzer;
pub mod annotate;
pub mod config;
pub mod detector;
pub mod gallery;
pub mod imaging;
pub mod pipeline;
pub mod recognizer;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod types;

pub use analyzer::{AnalyzeError, FaceAnalyzer, OnnxAnalyzer};
pub use annotate::{AnnotateError, Annotator};
pub use config::{default_model_dir, Config, ConfigError, CropMode};
pub use detector::{DetectorError, FaceDetector};
pub use gallery::{load_known_faces, Gallery, GalleryError, GalleryLoad, SkipReason, SkippedFile};
pub use imaging::ImageError;
pub use pipeline::{recognize_faces, FaceMatch, Recognition};
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use types::{
    BoundingBox, CosineMatcher, Embedding, Identity, MatchOutcome, MatchResult, Matcher, PixelRect,
    Score, UNKNOWN_LABEL,
};
