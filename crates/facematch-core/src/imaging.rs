//! Image decoding and encoding for gallery files and uploads.

use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// File extensions accepted for gallery images and uploads.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("unsupported image format (expected JPEG or PNG)")]
    Unsupported,
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Whether `path` has one of the [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
}

/// Decode JPEG or PNG bytes into an RGB image. Other formats are rejected
/// from their magic bytes, whatever the file was called.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ImageError> {
    let format = image::guess_format(bytes).map_err(|_| ImageError::Unsupported)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(ImageError::Unsupported);
    }
    let image = image::load_from_memory_with_format(bytes, format)?;
    Ok(image.to_rgb8())
}

/// MIME type of JPEG or PNG bytes, from their magic bytes.
pub fn mime_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        _ => None,
    }
}

/// Read and decode an image file.
pub fn open_rgb(path: &Path) -> Result<RgbImage, ImageError> {
    let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
        path: path.display().to_string(),
        source,
    })?;
    decode_rgb(&bytes)
}

/// Encode an RGB image as PNG.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
