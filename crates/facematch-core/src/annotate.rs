//! Drawing recognition results onto the query image.
//!
//! Each face gets a green box and a `"name - NN%"` caption in black on a
//! filled green tab, placed under the box or, when that would run off the
//! bottom of the image, inside the box along its bottom edge.

use crate::config::AnnotateConfig;
use crate::pipeline::FaceMatch;
use crate::types::PixelRect;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: u32 = 2;
/// Space around the caption inside its tab.
const LABEL_PADDING: i32 = 5;

/// Fonts tried, in order, when no font is configured.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid font file {0}")]
    InvalidFont(PathBuf),
}

/// Where the caption tab sits relative to the face box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPlacement {
    Below,
    Inside,
}

/// Caption geometry for one face, in image coordinates (may be negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelLayout {
    pub placement: LabelPlacement,
    pub background_x: i32,
    pub background_y: i32,
    pub background_width: u32,
    pub background_height: u32,
    /// Top-left corner of the caption text.
    pub text_x: i32,
    pub text_y: i32,
}

/// Place a `text_w` × `text_h` caption for the face at `rect`.
pub fn label_layout(rect: &PixelRect, text_w: u32, text_h: u32, img_height: u32) -> LabelLayout {
    let bottom = rect.bottom() as i32;
    let th = text_h as i32;
    let tab_h = th + 2 * LABEL_PADDING;

    let (placement, background_y, text_y) = if bottom + tab_h > img_height as i32 {
        (LabelPlacement::Inside, bottom - tab_h, bottom - LABEL_PADDING - th)
    } else {
        (LabelPlacement::Below, bottom, bottom + LABEL_PADDING)
    };

    LabelLayout {
        placement,
        background_x: rect.x as i32,
        background_y,
        background_width: text_w + 2 * LABEL_PADDING as u32,
        background_height: tab_h as u32,
        text_x: rect.x as i32 + LABEL_PADDING,
        text_y,
    }
}

/// Draws boxes and captions. Without a font only the boxes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    /// Load the configured font, or the first system font found.
    ///
    /// A configured font that cannot be loaded is an error; finding no
    /// system font only disables captions.
    pub fn new(config: &AnnotateConfig) -> Result<Self, AnnotateError> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => find_system_font(),
        };
        if font.is_none() {
            tracing::warn!("no label font found (set FACEMATCH_FONT_PATH); captions disabled");
        }
        Ok(Self::with_font(font, config.font_scale))
    }

    pub fn with_font(font: Option<FontVec>, font_scale: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(font_scale),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every face's box and caption onto `image`.
    pub fn annotate(&self, image: &mut RgbImage, faces: &[FaceMatch]) {
        for face in faces {
            draw_box(image, &face.rect);

            let Some(font) = &self.font else { continue };
            let caption = face.result.caption();
            let (text_w, text_h) = text_size(self.scale, font, &caption);
            let layout = label_layout(&face.rect, text_w, text_h, image.height());

            draw_filled_rect_mut(
                image,
                Rect::at(layout.background_x, layout.background_y)
                    .of_size(layout.background_width, layout.background_height),
                BOX_COLOR,
            );
            draw_text_mut(
                image,
                TEXT_COLOR,
                layout.text_x,
                layout.text_y,
                self.scale,
                font,
                &caption,
            );
        }
    }
}

fn draw_box(image: &mut RgbImage, rect: &PixelRect) {
    for inset in 0..BOX_THICKNESS {
        let (w, h) = (rect.width.saturating_sub(2 * inset), rect.height.saturating_sub(2 * inset));
        if w == 0 || h == 0 {
            break;
        }
        let r = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(image, r, BOX_COLOR);
    }
}

fn load_font(path: &Path) -> Result<FontVec, AnnotateError> {
    let bytes = std::fs::read(path).map_err(|source| AnnotateError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;
    let font = FontVec::try_from_vec(bytes).map_err(|_| AnnotateError::InvalidFont(path.to_path_buf()))?;
    tracing::debug!(path = %path.display(), "label font loaded");
    Ok(font)
}

fn find_system_font() -> Option<FontVec> {
    FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .filter(|p| p.is_file())
        .find_map(|p| load_font(p).ok())
}
