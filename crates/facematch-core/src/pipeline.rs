//! Recognition of every face in a query image against the gallery.

use crate::analyzer::{AnalyzeError, FaceAnalyzer};
use crate::gallery::Gallery;
use crate::types::{MatchResult, Matcher, PixelRect, Score};
use image::RgbImage;
use serde::Serialize;

/// One recognized face in the query image.
#[derive(Debug, Clone, Serialize)]
pub struct FaceMatch {
    /// Face region, clipped to the image.
    pub rect: PixelRect,
    /// Detector confidence.
    pub confidence: f32,
    pub result: MatchResult,
    /// Similarity against every gallery identity, in gallery order.
    pub scores: Vec<Score>,
}

/// Outcome of recognizing one query image.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Recognition {
    /// Faces reported by the detector, including any skipped for an empty crop.
    pub detected: usize,
    pub faces: Vec<FaceMatch>,
}

/// Detect every face in `image`, embed it and label it with its closest
/// gallery identity.
pub fn recognize_faces<A, M>(
    analyzer: &mut A,
    matcher: &M,
    gallery: &Gallery,
    image: &RgbImage,
) -> Result<Recognition, AnalyzeError>
where
    A: FaceAnalyzer + ?Sized,
    M: Matcher + ?Sized,
{
    let detections = analyzer.detect(image)?;
    tracing::info!(faces = detections.len(), "faces detected");

    let mut faces = Vec::with_capacity(detections.len());
    for face in &detections {
        let Some(rect) = face.to_crop_rect(image.width(), image.height()) else {
            tracing::debug!(?face, "skipping face outside the image");
            continue;
        };

        let embedding = match analyzer.embed(image, face) {
            Ok(embedding) => embedding,
            Err(AnalyzeError::EmptyCrop) => {
                tracing::debug!(?face, "skipping face with empty crop");
                continue;
            }
            Err(e) => return Err(e),
        };

        let outcome = matcher.compare(&embedding, gallery.identities());
        for score in &outcome.scores {
            tracing::debug!(identity = %score.name, similarity = score.similarity, "similarity");
        }
        tracing::info!(
            label = %outcome.best.label,
            similarity = outcome.best.similarity,
            x = rect.x,
            y = rect.y,
            "face labelled"
        );

        faces.push(FaceMatch {
            rect,
            confidence: face.confidence,
            result: outcome.best,
            scores: outcome.scores,
        });
    }

    Ok(Recognition {
        detected: detections.len(),
        faces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blocks_image, ColorAnalyzer};
    use crate::types::{BoundingBox, CosineMatcher, Embedding, Identity, UNKNOWN_LABEL};
    use std::path::PathBuf;

    fn gallery() -> Gallery {
        let id = |name: &str, values: Vec<f32>| Identity {
            name: name.into(),
            embedding: Embedding::new(values),
            source: PathBuf::from(format!("{name}.png")),
        };
        Gallery::from_identities([
            id("red", vec![255.0, 0.0, 0.0]),
            id("blue", vec![0.0, 0.0, 255.0]),
        ])
    }

    #[test]
    fn test_labels_each_face() {
        let image = blocks_image(120, 60, &[
            (5, 5, 30, 30, [250, 10, 10]),
            (60, 10, 50, 40, [10, 10, 250]),
        ]);
        let recognition =
            recognize_faces(&mut ColorAnalyzer, &CosineMatcher::default(), &gallery(), &image).unwrap();

        assert_eq!(recognition.detected, 2);
        assert_eq!(recognition.faces.len(), 2);
        let labels: Vec<&str> = recognition.faces.iter().map(|f| f.result.label.as_str()).collect();
        assert_eq!(labels, ["blue", "red"]);
        assert_eq!(recognition.faces[1].rect, PixelRect { x: 5, y: 5, width: 30, height: 30 });
        // Scores cover the whole gallery in gallery order.
        let names: Vec<&str> = recognition.faces[0].scores.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["blue", "red"]);
        assert!(recognition.faces[0].result.percent() >= 99);
    }

    #[test]
    fn test_no_faces() {
        let recognition = recognize_faces(
            &mut ColorAnalyzer,
            &CosineMatcher::default(),
            &gallery(),
            &RgbImage::new(50, 50),
        )
        .unwrap();
        assert_eq!(recognition.detected, 0);
        assert!(recognition.faces.is_empty());
    }

    #[test]
    fn test_threshold_marks_unknown() {
        // Green is orthogonal to both gallery colours.
        let image = blocks_image(40, 40, &[(0, 0, 40, 40, [0, 255, 0])]);
        let recognition =
            recognize_faces(&mut ColorAnalyzer, &CosineMatcher::new(Some(0.5)), &gallery(), &image)
                .unwrap();
        assert_eq!(recognition.faces[0].result.label, UNKNOWN_LABEL);
        assert!(!recognition.faces[0].result.matched);
    }

    /// Reports one face outside the image and one inside.
    struct OffsetAnalyzer;

    impl FaceAnalyzer for OffsetAnalyzer {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzeError> {
            let b = |x: f32| BoundingBox {
                x, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9, landmarks: None,
            };
            Ok(vec![b(500.0), b(0.0)])
        }

        fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, AnalyzeError> {
            ColorAnalyzer.embed(image, face)
        }
    }

    #[test]
    fn test_skips_faces_outside_image() {
        let image = blocks_image(20, 20, &[(0, 0, 10, 10, [255, 0, 0])]);
        let recognition =
            recognize_faces(&mut OffsetAnalyzer, &CosineMatcher::default(), &gallery(), &image).unwrap();
        assert_eq!(recognition.detected, 2);
        assert_eq!(recognition.faces.len(), 1);
        assert_eq!(recognition.faces[0].result.label, "red");
    }

    #[test]
    fn test_recognition_serializes() {
        let image = blocks_image(40, 40, &[(0, 0, 40, 40, [255, 0, 0])]);
        let recognition =
            recognize_faces(&mut ColorAnalyzer, &CosineMatcher::default(), &gallery(), &image).unwrap();
        let json = serde_json::to_value(&recognition).unwrap();
        assert_eq!(json["detected"], 1);
        assert_eq!(json["faces"][0]["result"]["label"], "red");
        assert_eq!(json["faces"][0]["rect"]["width"], 40);
    }
}
