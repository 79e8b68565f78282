//! Face alignment to the canonical ArcFace crop.
//!
//! Detected faces are either warped onto the five InsightFace reference
//! landmarks with a 4-DOF similarity transform, or cut out by their bounding
//! box and resized, both producing a 112×112 RGB crop.

use crate::types::PixelRect;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// Least-squares similarity transform mapping `src` points onto `dst`.
///
/// Returns [a, -b, tx, b, a, ty], i.e. the matrix
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
/// Solved in closed form on centred point sets.
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    let n = src.len() as f32;
    let centroid = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (smx, smy) = centroid(src);
    let (dmx, dmy) = centroid(dst);

    let mut dot = 0.0f32;
    let mut cross = 0.0f32;
    let mut src_var = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - smx, sy - smy);
        let (dx, dy) = (dx - dmx, dy - dmy);
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
        src_var += sx * sx + sy * sy;
    }

    if src_var < 1e-12 {
        // Degenerate landmarks: translate only.
        return [1.0, 0.0, dmx - smx, 0.0, 1.0, dmy - smy];
    }

    let a = dot / src_var;
    let b = cross / src_var;
    let tx = dmx - (a * smx - b * smy);
    let ty = dmy - (b * smx + a * smy);

    [a, -b, tx, b, a, ty]
}

/// Warp the face onto the reference landmarks, producing a 112×112 crop.
///
/// Bilinear interpolation; pixels mapped from outside the image are black.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let m = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);

    match Projection::from_matrix([m[0], m[1], m[2], m[3], m[4], m[5], 0.0, 0.0, 1.0]) {
        Some(projection) => warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut out,
        ),
        None => tracing::warn!(?landmarks, "non-invertible alignment transform; using black crop"),
    }

    out
}

/// Cut the bounding box out of the image and resize it to 112×112.
pub fn crop_face(image: &RgbImage, rect: &PixelRect) -> RgbImage {
    let crop = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
    imageops::resize(&crop, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}
