//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model on a letterboxed RGB image, decodes the three anchor-free
//! stride heads and suppresses overlapping boxes.

use crate::config::{ConfigError, DetectorConfig};
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = 9;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download det_10g.onnx from insightface buffalo_l)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("{0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scale and padding applied when fitting the image into the square input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / width as f32).min(input_size as f32 / height as f32);
        let (new_w, new_h) = Self::scaled_dims(width, height, scale, input_size);
        Self {
            scale,
            pad_x: (input_size - new_w) / 2,
            pad_y: (input_size - new_h) / 2,
        }
    }

    fn scaled_dims(width: u32, height: u32, scale: f32, input_size: u32) -> (u32, u32) {
        let w = ((width as f32 * scale).round() as u32).clamp(1, input_size);
        let h = ((height as f32 * scale).round() as u32).clamp(1, input_size);
        (w, h)
    }

    /// Map a point from model input space back to the original image.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
    nms_threshold: f32,
    /// Per-stride output indices for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(
        model_path: &Path,
        config: &DetectorConfig,
        intra_threads: usize,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            input_size = config.input_size,
            "loaded SCRFD model"
        );

        if output_names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            nms_threshold: config.nms_threshold,
            stride_indices,
        })
    }

    /// Detect faces in an RGB image, highest confidence first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(image, self.input_size);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[slot];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };

            let head = StrideHead {
                stride,
                scores: extract(score_idx, "scores")?,
                bboxes: extract(bbox_idx, "bboxes")?,
                kps: extract(kps_idx, "kps")?,
            };
            candidates.extend(head.decode(self.input_size, &letterbox, self.confidence_threshold));
        }

        let faces = nms(candidates, self.nms_threshold);
        tracing::debug!(faces = faces.len(), "SCRFD detection complete");
        Ok(faces)
    }
}

/// Letterbox an RGB image into a centred square NCHW tensor.
///
/// Padding is filled with `SCRFD_MEAN`, which normalizes to zero.
fn preprocess(image: &RgbImage, input_size: usize) -> (Array4<f32>, Letterbox) {
    let size = input_size as u32;
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let (new_w, new_h) = Letterbox::scaled_dims(image.width(), image.height(), letterbox.scale, size);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let pad = SCRFD_MEAN.round() as u8;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([pad, pad, pad]));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.pad_x),
        i64::from(letterbox.pad_y),
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Discover output tensor ordering by name.
///
/// Named exports ("score_8", "bbox_16", "kps_32", ...) are mapped to their
/// stride slots in any order. Anything else falls back to the standard
/// positional layout: [0-2] scores, [3-5] bboxes, [6-8] kps.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Raw outputs of one stride level.
struct StrideHead<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideHead<'_> {
    /// Decode every anchor above `threshold` into original-image coordinates.
    fn decode(&self, input_size: usize, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let grid = input_size / self.stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let step = self.stride as f32;

        (0..anchors)
            .filter_map(|idx| {
                let score = *self.scores.get(idx)?;
                if score <= threshold {
                    return None;
                }

                let cell = idx / SCRFD_ANCHORS_PER_CELL;
                let ax = (cell % grid) as f32 * step;
                let ay = (cell / grid) as f32 * step;

                // Distances to the four edges, in stride units.
                let d = self.bboxes.get(idx * 4..idx * 4 + 4)?;
                let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
                let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);

                let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                    std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
                });

                Some(BoundingBox {
                    x: x1,
                    y: y1,
                    width: x2 - x1,
                    height: y2 - y1,
                    confidence: score,
                    landmarks,
                })
            })
            .collect()
    }
}

/// Non-Maximum Suppression. Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-Union between two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
