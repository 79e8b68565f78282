//! Router and request handlers.

use crate::engine::RecognizeOutput;
use crate::error::HttpError;
use crate::page;
use crate::state::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facematch_core::imaging;
use facematch_core::FaceMatch;
use serde::Serialize;
use std::path::Path;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "image";

pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/recognize", post(recognize_page))
        .route("/api/recognize", post(recognize_json))
        .route("/api/gallery", get(gallery))
        .route("/api/gallery/reload", post(reload_gallery))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(page::index_page())
}

/// Read the `image` field of a multipart upload.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, HttpError> {
    let mut multipart = multipart.map_err(|e| HttpError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if let Some(name) = field.file_name().filter(|n| !n.is_empty()) {
            if !imaging::has_supported_extension(Path::new(name)) {
                return Err(HttpError::BadRequest(format!(
                    "unsupported file type: {name} (expected jpg, jpeg or png)"
                )));
            }
        }

        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(HttpError::BadRequest("uploaded image is empty".to_string()));
        }
        tracing::debug!(bytes = bytes.len(), "image uploaded");
        return Ok(bytes.to_vec());
    }

    Err(HttpError::BadRequest(format!(
        "missing multipart field \"{UPLOAD_FIELD}\""
    )))
}

async fn recognize_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<RecognizeOutput, HttpError> {
    let bytes = read_upload(multipart).await?;
    Ok(state.engine.recognize(bytes).await?)
}

async fn recognize_page(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match recognize_upload(&state, multipart).await {
        Ok(output) => Html(page::result_page(&output)).into_response(),
        Err(err) => {
            let class = match err {
                HttpError::Conflict(_) => "warn",
                _ => "error",
            };
            let html = page::message_page(class, err.message());
            (err.status(), Html(html)).into_response()
        }
    }
}

#[derive(Serialize)]
struct RecognizeResponse {
    identities: usize,
    detected: usize,
    faces: Vec<FaceMatch>,
    /// Annotated image as a PNG data URI.
    annotated_image: String,
}

async fn recognize_json(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecognizeResponse>, HttpError> {
    let output = recognize_upload(&state, multipart).await?;
    Ok(Json(RecognizeResponse {
        identities: output.gallery.identities.len(),
        detected: output.recognition.detected,
        annotated_image: page::data_uri(&output.annotated_png),
        faces: output.recognition.faces,
    }))
}

async fn gallery(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    Ok(Json(state.engine.gallery().await?))
}

async fn reload_gallery(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let snapshot = state.engine.reload_gallery().await?;
    tracing::info!(identities = snapshot.identities.len(), "gallery reloaded");
    Ok(Json(snapshot))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    identities: usize,
    detector_model: String,
    recognizer_model: String,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let snapshot = state.engine.gallery().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        identities: snapshot.identities.len(),
        detector_model: state.models.detector.clone(),
        recognizer_model: state.models.recognizer.clone(),
    }))
}
