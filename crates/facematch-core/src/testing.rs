//! Model-free [`FaceAnalyzer`] for tests.
//!
//! Every maximal run of columns containing a non-black pixel counts as one
//! face; its embedding is the mean colour of the non-black pixels. Solid
//! colour blocks on a black background therefore behave like distinct people.

use crate::analyzer::{AnalyzeError, FaceAnalyzer};
use crate::types::{BoundingBox, Embedding};
use image::{Rgb, RgbImage};

/// Channel sum above which a pixel is part of a face.
const FOREGROUND_MIN: u16 = 30;

#[derive(Debug, Default, Clone, Copy)]
pub struct ColorAnalyzer;

fn is_foreground(p: &Rgb<u8>) -> bool {
    p.0.iter().map(|&c| u16::from(c)).sum::<u16>() > FOREGROUND_MIN
}

impl FaceAnalyzer for ColorAnalyzer {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzeError> {
        let (w, h) = image.dimensions();
        let column_rows = move |x: u32| (0..h).filter(move |&y| is_foreground(image.get_pixel(x, y)));

        let mut faces = Vec::new();
        let mut x = 0;
        while x < w {
            if column_rows(x).next().is_none() {
                x += 1;
                continue;
            }
            let start = x;
            let (mut top, mut bottom) = (h, 0);
            while x < w {
                let mut rows = column_rows(x).peekable();
                let Some(&first) = rows.peek() else { break };
                let last = rows.last().unwrap_or(first);
                top = top.min(first);
                bottom = bottom.max(last + 1);
                x += 1;
            }
            faces.push(BoundingBox {
                x: start as f32,
                y: top as f32,
                width: (x - start) as f32,
                height: (bottom - top) as f32,
                confidence: (x - start) as f32 / w as f32,
                landmarks: None,
            });
        }

        faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(faces)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, AnalyzeError> {
        let rect = face
            .to_crop_rect(image.width(), image.height())
            .ok_or(AnalyzeError::EmptyCrop)?;

        let mut sum = [0.0f32; 3];
        let mut count = 0usize;
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let p = image.get_pixel(x, y);
                if is_foreground(p) {
                    for c in 0..3 {
                        sum[c] += f32::from(p[c]);
                    }
                    count += 1;
                }
            }
        }

        if count == 0 {
            return Err(AnalyzeError::EmptyCrop);
        }
        Ok(Embedding::new(sum.iter().map(|s| s / count as f32).collect()))
    }
}

/// Black `width` × `height` image with solid blocks `(x, y, w, h, colour)`.
pub fn blocks_image(width: u32, height: u32, blocks: &[(u32, u32, u32, u32, [u8; 3])]) -> RgbImage {
    let mut image = RgbImage::new(width, height);
    for &(bx, by, bw, bh, colour) in blocks {
        for y in by..(by + bh).min(height) {
            for x in bx..(bx + bw).min(width) {
                image.put_pixel(x, y, Rgb(colour));
            }
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_each_block() {
        let image = blocks_image(100, 60, &[
            (10, 10, 20, 30, [255, 0, 0]),
            (50, 5, 40, 40, [0, 0, 255]),
        ]);
        let faces = ColorAnalyzer.detect(&image).unwrap();
        assert_eq!(faces.len(), 2);
        // Wider block first.
        assert_eq!((faces[0].x, faces[0].y, faces[0].width, faces[0].height), (50.0, 5.0, 40.0, 40.0));
        assert_eq!((faces[1].x, faces[1].y, faces[1].width, faces[1].height), (10.0, 10.0, 20.0, 30.0));
    }

    #[test]
    fn test_black_image_has_no_faces() {
        assert!(ColorAnalyzer.detect(&RgbImage::new(20, 20)).unwrap().is_empty());
    }

    #[test]
    fn test_embedding_is_mean_colour() {
        let image = blocks_image(40, 40, &[(0, 0, 40, 40, [10, 200, 30])]);
        let faces = ColorAnalyzer.detect(&image).unwrap();
        let e = ColorAnalyzer.embed(&image, &faces[0]).unwrap();
        assert_eq!(e.values, vec![10.0, 200.0, 30.0]);
    }
}
