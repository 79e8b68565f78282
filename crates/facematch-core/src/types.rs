use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Label given to a face with no acceptable gallery match.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer pixel region of this box inside a `img_width` × `img_height` image.
    ///
    /// The top-left corner is clamped to the image origin and the far edge is
    /// clipped to the image border. Returns `None` when nothing is left.
    pub fn to_crop_rect(&self, img_width: u32, img_height: u32) -> Option<PixelRect> {
        let x0 = self.x.round().max(0.0) as u32;
        let y0 = self.y.round().max(0.0) as u32;
        let x1 = ((self.x + self.width).round().max(0.0) as u32).min(img_width);
        let y1 = ((self.y + self.height).round().max(0.0) as u32).min(img_height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Axis-aligned pixel rectangle, always non-empty and inside its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity between two embeddings, in [-1, 1].
    ///
    /// Zero when either vector has zero norm.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let (dot, norm_a, norm_b) = self
            .values
            .iter()
            .zip(other.values.iter())
            .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (a, b)| {
                (dot + a * b, na + a * a, nb + b * b)
            });

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            (dot / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// L2-normalized copy. A zero vector is returned unchanged.
    pub fn normalized(&self) -> Embedding {
        let norm = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            self.values.iter().map(|x| x / norm).collect()
        } else {
            self.values.clone()
        };
        Embedding {
            values,
            model_version: self.model_version.clone(),
        }
    }
}

/// One gallery entry: a named reference face.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// File stem of the reference image.
    pub name: String,
    pub embedding: Embedding,
    /// Reference image the embedding was computed from.
    pub source: PathBuf,
}

/// Similarity of a query against one gallery identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub name: String,
    pub similarity: f32,
}

/// Final label for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Identity name, or [`UNKNOWN_LABEL`].
    pub label: String,
    /// Cosine similarity of the closest identity, -1 when the gallery is empty.
    pub similarity: f32,
    /// Whether `label` names a gallery identity.
    pub matched: bool,
}

impl MatchResult {
    /// Similarity as a whole percentage, truncated toward zero.
    pub fn percent(&self) -> i32 {
        (self.similarity * 100.0) as i32
    }

    /// Text drawn next to the face, e.g. `"alice - 83%"`.
    pub fn caption(&self) -> String {
        format!("{} - {}%", self.label, self.percent())
    }
}

/// Best match plus the per-identity scores it was chosen from.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub best: MatchResult,
    /// One score per gallery identity, in gallery order.
    pub scores: Vec<Score>,
}

/// Strategy for comparing a query embedding against the gallery.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[Identity]) -> MatchOutcome;
}

/// Nearest-neighbour matcher over cosine similarity.
///
/// Without `min_similarity` the closest identity is always reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher {
    pub min_similarity: Option<f32>,
}

impl CosineMatcher {
    pub fn new(min_similarity: Option<f32>) -> Self {
        Self { min_similarity }
    }
}

impl Matcher for CosineMatcher {
    fn compare(&self, query: &Embedding, gallery: &[Identity]) -> MatchOutcome {
        let scores: Vec<Score> = gallery
            .iter()
            .map(|identity| Score {
                name: identity.name.clone(),
                similarity: query.similarity(&identity.embedding),
            })
            .collect();

        // Strict comparison: the first of equally close identities wins.
        let mut best: Option<&Score> = None;
        for score in &scores {
            if best.map_or(true, |b| score.similarity > b.similarity) {
                best = Some(score);
            }
        }

        let best = match best {
            Some(score) => {
                let accepted = self
                    .min_similarity
                    .map_or(true, |threshold| score.similarity >= threshold);
                MatchResult {
                    label: if accepted {
                        score.name.clone()
                    } else {
                        UNKNOWN_LABEL.to_string()
                    },
                    similarity: score.similarity,
                    matched: accepted,
                }
            }
            None => MatchResult {
                label: UNKNOWN_LABEL.to_string(),
                similarity: -1.0,
                matched: false,
            },
        };

        MatchOutcome { best, scores }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, values: Vec<f32>) -> Identity {
        Identity {
            name: name.into(),
            embedding: Embedding::new(values),
            source: PathBuf::from(format!("{name}.png")),
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-3.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_similarity_ignores_scale() {
        let a = Embedding::new(vec![1.0, 1.0]);
        let b = Embedding::new(vec![10.0, 10.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
        assert!(a.euclidean_distance(&b) > 1.0);
    }

    #[test]
    fn test_normalized_unit_length() {
        let e = Embedding::new(vec![3.0, 4.0]).normalized();
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
        assert_eq!(Embedding::new(vec![0.0; 3]).normalized().values, vec![0.0; 3]);
    }

    #[test]
    fn test_crop_rect_clamps_negative_origin() {
        let b = BoundingBox {
            x: -10.0, y: -4.0, width: 50.0, height: 30.0,
            confidence: 0.9, landmarks: None,
        };
        let r = b.to_crop_rect(100, 100).unwrap();
        assert_eq!(r, PixelRect { x: 0, y: 0, width: 40, height: 26 });
    }

    #[test]
    fn test_crop_rect_clips_far_edge() {
        let b = BoundingBox {
            x: 80.0, y: 90.0, width: 50.0, height: 50.0,
            confidence: 0.9, landmarks: None,
        };
        let r = b.to_crop_rect(100, 100).unwrap();
        assert_eq!((r.right(), r.bottom()), (100, 100));
        assert_eq!((r.width, r.height), (20, 10));
    }

    #[test]
    fn test_crop_rect_outside_image_is_empty() {
        let b = BoundingBox {
            x: 120.0, y: 10.0, width: 30.0, height: 30.0,
            confidence: 0.9, landmarks: None,
        };
        assert!(b.to_crop_rect(100, 100).is_none());
    }

    #[test]
    fn test_percent_truncates() {
        let r = MatchResult { label: "a".into(), similarity: 0.839, matched: true };
        assert_eq!(r.percent(), 83);
        assert_eq!(r.caption(), "a - 83%");
        let neg = MatchResult { label: "a".into(), similarity: -0.255, matched: true };
        assert_eq!(neg.percent(), -25);
    }

    #[test]
    fn test_cosine_matcher_scans_whole_gallery() {
        let query = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            identity("decoy1", vec![0.0, 1.0, 0.0]),
            identity("decoy2", vec![0.0, 0.0, 1.0]),
            identity("match", vec![1.0, 0.1, 0.0]),
        ];

        let outcome = CosineMatcher::default().compare(&query, &gallery);
        assert!(outcome.best.matched);
        assert_eq!(outcome.best.label, "match");
        assert_eq!(outcome.scores.len(), 3);
        assert_eq!(outcome.scores[0].name, "decoy1");
        assert!(outcome.best.similarity > 0.99);
    }

    #[test]
    fn test_cosine_matcher_always_reports_best_without_threshold() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![identity("far", vec![0.1, 1.0])];
        let outcome = CosineMatcher::default().compare(&query, &gallery);
        assert!(outcome.best.matched);
        assert_eq!(outcome.best.label, "far");
    }

    #[test]
    fn test_cosine_matcher_threshold_keeps_similarity() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![identity("far", vec![0.1, 1.0])];
        let outcome = CosineMatcher::new(Some(0.5)).compare(&query, &gallery);
        assert!(!outcome.best.matched);
        assert_eq!(outcome.best.label, UNKNOWN_LABEL);
        assert!((outcome.best.similarity - outcome.scores[0].similarity).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_matcher_first_wins_ties() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            identity("first", vec![1.0, 0.0]),
            identity("second", vec![2.0, 0.0]),
        ];
        let outcome = CosineMatcher::default().compare(&query, &gallery);
        assert_eq!(outcome.best.label, "first");
    }

    #[test]
    fn test_cosine_matcher_empty_gallery() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let outcome = CosineMatcher::default().compare(&query, &[]);
        assert!(!outcome.best.matched);
        assert_eq!(outcome.best.label, UNKNOWN_LABEL);
        assert_eq!(outcome.best.similarity, -1.0);
        assert!(outcome.scores.is_empty());
    }
}
