//! Gallery of known faces, loaded from a folder of reference images.
//!
//! Each JPEG/PNG file contributes one identity named after its file stem,
//! embedded from the highest-confidence face in the image.

use crate::analyzer::{AnalyzeError, FaceAnalyzer};
use crate::imaging;
use crate::types::Identity;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read gallery directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("analysis failed for {path}: {source}")]
    Analyze {
        path: PathBuf,
        source: AnalyzeError,
    },
}

/// Why a gallery file contributed no identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// The file could not be read or decoded.
    Unreadable(String),
    NoFaceDetected,
    /// The detected face had no pixels inside the image.
    EmptyCrop,
    /// A later file with the same stem replaced this one.
    Replaced,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

impl std::fmt::Display for SkippedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = self
            .path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        match &self.reason {
            SkipReason::Unreadable(err) => write!(f, "could not read {file}: {err}"),
            SkipReason::NoFaceDetected => write!(f, "no face detected in {file}"),
            SkipReason::EmptyCrop => write!(f, "face crop in {file} is empty"),
            SkipReason::Replaced => write!(f, "{file} was replaced by another file with the same name"),
        }
    }
}

/// In-memory name → embedding mapping, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    /// Build a gallery; a later identity replaces an earlier one of the same name.
    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        let mut gallery = Self::default();
        for identity in identities {
            gallery.insert(identity);
        }
        gallery
    }

    /// Insert or replace by name, returning the replaced identity.
    pub fn insert(&mut self, identity: Identity) -> Option<Identity> {
        match self
            .identities
            .binary_search_by(|entry| entry.name.as_str().cmp(&identity.name))
        {
            Ok(idx) => Some(std::mem::replace(&mut self.identities[idx], identity)),
            Err(idx) => {
                self.identities.insert(idx, identity);
                None
            }
        }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|i| i.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.identities
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.identities[idx])
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Result of loading a gallery folder.
#[derive(Debug, Clone, Default)]
pub struct GalleryLoad {
    pub gallery: Gallery,
    pub skipped: Vec<SkippedFile>,
}

/// List gallery candidates in `dir`: regular files with a supported
/// extension, sorted by path.
pub fn gallery_files(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let dir_error = |source| GalleryError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(dir_error)? {
        let path = entry.map_err(dir_error)?.path();
        if path.is_file() && imaging::has_supported_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load every reference image in `dir` into a gallery.
///
/// Files without a detectable face, unreadable images and empty crops are
/// skipped with a warning. Model failures abort the load.
pub fn load_known_faces<A>(dir: &Path, analyzer: &mut A) -> Result<GalleryLoad, GalleryError>
where
    A: FaceAnalyzer + ?Sized,
{
    let files = gallery_files(dir)?;
    tracing::info!(dir = %dir.display(), candidates = files.len(), "loading known faces");

    let mut load = GalleryLoad::default();
    for path in files {
        match embed_reference(&path, analyzer)? {
            Ok(identity) => {
                tracing::debug!(name = %identity.name, path = %path.display(), "known face loaded");
                if let Some(old) = load.gallery.insert(identity) {
                    let skipped = SkippedFile {
                        path: old.source,
                        reason: SkipReason::Replaced,
                    };
                    tracing::warn!("{skipped}");
                    load.skipped.push(skipped);
                }
            }
            Err(reason) => {
                let skipped = SkippedFile { path, reason };
                tracing::warn!("{skipped}");
                load.skipped.push(skipped);
            }
        }
    }

    tracing::info!(
        identities = load.gallery.len(),
        skipped = load.skipped.len(),
        "known faces loaded"
    );
    Ok(load)
}

/// Embed one reference image. The outer error aborts the load, the inner
/// one skips the file.
fn embed_reference<A>(
    path: &Path,
    analyzer: &mut A,
) -> Result<Result<Identity, SkipReason>, GalleryError>
where
    A: FaceAnalyzer + ?Sized,
{
    let analyze_error = |source| GalleryError::Analyze {
        path: path.to_path_buf(),
        source,
    };

    let image = match imaging::open_rgb(path) {
        Ok(image) => image,
        Err(e) => return Ok(Err(SkipReason::Unreadable(e.to_string()))),
    };

    let faces = analyzer.detect(&image).map_err(analyze_error)?;
    let Some(face) = faces.first() else {
        return Ok(Err(SkipReason::NoFaceDetected));
    };

    let embedding = match analyzer.embed(&image, face) {
        Ok(embedding) => embedding,
        Err(AnalyzeError::EmptyCrop) => return Ok(Err(SkipReason::EmptyCrop)),
        Err(e) => return Err(analyze_error(e)),
    };

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Ok(Identity {
        name,
        embedding,
        source: path.to_path_buf(),
    }))
}
