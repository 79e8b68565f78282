use facematch_core::annotate::Annotator;
use facematch_core::gallery::{self, GalleryLoad};
use facematch_core::imaging;
use facematch_core::{
    AnalyzeError, CosineMatcher, FaceAnalyzer, GalleryError, ImageError, Recognition, SkippedFile,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Image(#[from] ImageError),
    #[error("analysis failed: {0}")]
    Analyze(#[from] AnalyzeError),
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("no known faces were loaded")]
    EmptyGallery,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Analyzer the engine thread owns.
pub type BoxedAnalyzer = Box<dyn FaceAnalyzer + Send>;

/// What the gallery currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct GallerySnapshot {
    pub dir: PathBuf,
    pub identities: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

impl GallerySnapshot {
    fn new(dir: &Path, load: &GalleryLoad) -> Self {
        Self {
            dir: dir.to_path_buf(),
            identities: load.gallery.names().map(str::to_string).collect(),
            skipped: load.skipped.clone(),
        }
    }
}

/// Result of a recognition request.
pub struct RecognizeOutput {
    /// The uploaded image bytes, handed back unchanged.
    pub uploaded: Vec<u8>,
    pub recognition: Recognition,
    /// Query image with boxes and captions, PNG-encoded.
    pub annotated_png: Vec<u8>,
    pub gallery: GallerySnapshot,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<RecognizeOutput, EngineError>>,
    },
    Gallery {
        reply: oneshot::Sender<GallerySnapshot>,
    },
    ReloadGallery {
        reply: oneshot::Sender<Result<GallerySnapshot, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode an uploaded image, recognize every face and annotate it.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<RecognizeOutput, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Recognize { image, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn gallery(&self) -> Result<GallerySnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Gallery { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Re-read the gallery folder, replacing the in-memory gallery.
    pub async fn reload_gallery(&self) -> Result<GallerySnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::ReloadGallery { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// State owned by the engine thread.
struct Engine {
    analyzer: BoxedAnalyzer,
    matcher: CosineMatcher,
    annotator: Annotator,
    gallery_dir: PathBuf,
    load: GalleryLoad,
}

impl Engine {
    fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::Recognize { image, reply } => {
                let _ = reply.send(self.recognize(image));
            }
            EngineRequest::Gallery { reply } => {
                let _ = reply.send(GallerySnapshot::new(&self.gallery_dir, &self.load));
            }
            EngineRequest::ReloadGallery { reply } => {
                let result = gallery::load_known_faces(&self.gallery_dir, &mut self.analyzer)
                    .map(|load| {
                        self.load = load;
                        GallerySnapshot::new(&self.gallery_dir, &self.load)
                    })
                    .map_err(EngineError::from);
                let _ = reply.send(result);
            }
        }
    }

    fn recognize(&mut self, uploaded: Vec<u8>) -> Result<RecognizeOutput, EngineError> {
        let mut image = imaging::decode_rgb(&uploaded)?;
        if self.load.gallery.is_empty() {
            return Err(EngineError::EmptyGallery);
        }

        let recognition = facematch_core::recognize_faces(
            &mut self.analyzer,
            &self.matcher,
            &self.load.gallery,
            &image,
        )?;
        self.annotator.annotate(&mut image, &recognition.faces);

        Ok(RecognizeOutput {
            uploaded,
            recognition,
            annotated_png: imaging::encode_png(&image)?,
            gallery: GallerySnapshot::new(&self.gallery_dir, &self.load),
        })
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The gallery is loaded before the thread starts. A missing or unreadable
/// gallery folder leaves the gallery empty; model failures are fatal.
pub fn spawn_engine(
    mut analyzer: BoxedAnalyzer,
    matcher: CosineMatcher,
    annotator: Annotator,
    gallery_dir: PathBuf,
) -> Result<EngineHandle, EngineError> {
    let load = match gallery::load_known_faces(&gallery_dir, &mut analyzer) {
        Ok(load) => load,
        Err(GalleryError::Directory { path, source }) => {
            tracing::warn!(dir = %path.display(), error = %source, "gallery folder unreadable; starting with no known faces");
            GalleryLoad::default()
        }
        Err(e) => return Err(e.into()),
    };
    if load.gallery.is_empty() {
        tracing::warn!(dir = %gallery_dir.display(), "no known faces were loaded");
    }

    let mut engine = Engine {
        analyzer,
        matcher,
        annotator,
        gallery_dir,
        load,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(request) = rx.blocking_recv() {
                engine.handle(request);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::testing::{blocks_image, ColorAnalyzer};

    fn write_png(dir: &Path, name: &str, colour: [u8; 3]) {
        let image = blocks_image(32, 32, &[(0, 0, 32, 32, colour)]);
        std::fs::write(dir.join(name), imaging::encode_png(&image).unwrap()).unwrap();
    }

    fn engine(dir: &Path) -> EngineHandle {
        spawn_engine(
            Box::new(ColorAnalyzer),
            CosineMatcher::default(),
            Annotator::with_font(None, 16.0),
            dir.to_path_buf(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_recognize_labels_and_annotates() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "alice.png", [255, 0, 0]);
        let handle = engine(dir.path());

        let query = blocks_image(64, 64, &[(10, 10, 30, 30, [240, 5, 5])]);
        let query = imaging::encode_png(&query).unwrap();
        let out = handle.recognize(query.clone()).await.unwrap();

        assert_eq!(out.uploaded, query);

        assert_eq!(out.recognition.faces.len(), 1);
        assert_eq!(out.recognition.faces[0].result.label, "alice");
        let annotated = imaging::decode_rgb(&out.annotated_png).unwrap();
        assert_eq!(annotated.get_pixel(10, 10).0, [0, 255, 0]);
    }

    #[tokio::test]
    async fn test_empty_gallery_refuses_recognition() {
        let dir = tempfile::tempdir().unwrap();
        let handle = engine(dir.path());
        let query = imaging::encode_png(&blocks_image(8, 8, &[])).unwrap();
        assert!(matches!(handle.recognize(query).await, Err(EngineError::EmptyGallery)));
    }

    #[tokio::test]
    async fn test_missing_gallery_dir_starts_empty() {
        let handle = engine(Path::new("/nonexistent/known_faces"));
        assert!(handle.gallery().await.unwrap().identities.is_empty());
        assert!(matches!(handle.reload_gallery().await, Err(EngineError::Gallery(_))));
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "alice.png", [255, 0, 0]);
        let handle = engine(dir.path());
        assert_eq!(handle.gallery().await.unwrap().identities, ["alice"]);

        write_png(dir.path(), "bob.png", [0, 0, 255]);
        let snapshot = handle.reload_gallery().await.unwrap();
        assert_eq!(snapshot.identities, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_bad_upload_is_image_error() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "alice.png", [255, 0, 0]);
        let handle = engine(dir.path());
        assert!(matches!(
            handle.recognize(b"hello".to_vec()).await,
            Err(EngineError::Image(ImageError::Unsupported))
        ));
    }
}
