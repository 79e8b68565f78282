//! Route tests against an engine running the colour-block analyzer.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use facematch_core::imaging::encode_png;
use facematch_core::testing::{blocks_image, ColorAnalyzer};
use facematch_core::{Annotator, CosineMatcher};
use facematch_web::{create_router, spawn_engine, AppState, ModelInfo};
use http_body_util::BodyExt;
use std::path::Path;
use tower::ServiceExt;

const BOUNDARY: &str = "facematch-test-boundary";

fn write_face(dir: &Path, file: &str, colour: [u8; 3]) {
    let image = blocks_image(32, 32, &[(0, 0, 32, 32, colour)]);
    std::fs::write(dir.join(file), encode_png(&image).unwrap()).unwrap();
}

fn app(gallery_dir: &Path) -> Router {
    app_with_limit(gallery_dir, 1024 * 1024)
}

fn app_with_limit(gallery_dir: &Path, max_upload_bytes: usize) -> Router {
    let engine = spawn_engine(
        Box::new(ColorAnalyzer),
        CosineMatcher::default(),
        Annotator::with_font(None, 16.0),
        gallery_dir.to_path_buf(),
    )
    .unwrap();
    let models = ModelInfo {
        detector: "det_10g.onnx".into(),
        recognizer: "w600k_r50.onnx".into(),
    };
    create_router(AppState::new(engine, models, max_upload_bytes))
}

fn gallery() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_face(dir.path(), "red.png", [255, 0, 0]);
    write_face(dir.path(), "blue.png", [0, 0, 255]);
    dir
}

fn multipart(field: &str, filename: &str, data: &[u8]) -> Body {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn upload(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn red_query() -> Vec<u8> {
    encode_png(&blocks_image(80, 60, &[(10, 10, 30, 30, [255, 0, 0])])).unwrap()
}

#[tokio::test]
async fn health_reports_gallery_and_models() {
    let dir = gallery();
    let response = app(dir.path()).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["identities"], 2);
    assert_eq!(json["detector_model"], "det_10g.onnx");
}

#[tokio::test]
async fn index_serves_upload_form() {
    let dir = gallery();
    let response = app(dir.path()).oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("enctype=\"multipart/form-data\""));
    assert!(html.contains("name=\"image\""));
}

#[tokio::test]
async fn gallery_lists_identities_sorted() {
    let dir = gallery();
    let response = app(dir.path()).oneshot(get("/api/gallery")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["identities"], serde_json::json!(["blue", "red"]));
    assert_eq!(json["skipped"], serde_json::json!([]));
}

#[tokio::test]
async fn api_recognize_labels_face() {
    let dir = gallery();
    let request = upload("/api/recognize", multipart("image", "query.png", &red_query()));
    let response = app(dir.path()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["identities"], 2);
    assert_eq!(json["detected"], 1);
    let face = &json["faces"][0];
    assert_eq!(face["result"]["label"], "red");
    assert_eq!(face["rect"]["x"], 10);
    assert_eq!(face["scores"].as_array().unwrap().len(), 2);
    assert!(json["annotated_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn recognize_page_shows_results() {
    let dir = gallery();
    let request = upload("/recognize", multipart("image", "query.png", &red_query()));
    let response = app(dir.path()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("2 known faces loaded"));
    assert!(html.contains("Faces detected: 1"));
    assert!(html.contains("red - 100%"));
    assert!(html.contains("similarity with blue: 0.00"));
    assert_eq!(html.matches("src=\"data:image/png;base64,").count(), 2);
}

#[tokio::test]
async fn missing_field_is_bad_request() {
    let dir = gallery();
    let request = upload("/api/recognize", multipart("photo", "query.png", &red_query()));
    let response = app(dir.path()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("image"));
}

#[tokio::test]
async fn unsupported_file_type_is_bad_request() {
    let dir = gallery();
    let request = upload("/api/recognize", multipart("image", "query.gif", &red_query()));
    let response = app(dir.path()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn undecodable_upload_is_bad_request() {
    let dir = gallery();
    let request = upload("/api/recognize", multipart("image", "query.png", b"not an image"));
    let response = app(dir.path()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let dir = gallery();
    let request = upload("/api/recognize", multipart("image", "query.png", &[0u8; 4096]));
    let response = app_with_limit(dir.path(), 1024).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert_eq!(json["status"], 413);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn non_multipart_request_is_bad_request() {
    let dir = gallery();
    let request = Request::builder()
        .method("POST")
        .uri("/api/recognize")
        .body(Body::from("hello"))
        .unwrap();
    let response = app(dir.path()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_gallery_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(dir.path());

    let request = upload("/api/recognize", multipart("image", "query.png", &red_query()));
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let request = upload("/recognize", multipart("image", "query.png", &red_query()));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_text(response).await.contains("no known faces loaded"));
}

#[tokio::test]
async fn reload_picks_up_new_faces() {
    let dir = tempfile::tempdir().unwrap();
    let router = app(dir.path());
    write_face(dir.path(), "red.png", [255, 0, 0]);

    let request = Request::builder()
        .method("POST")
        .uri("/api/gallery/reload")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["identities"], serde_json::json!(["red"]));

    let request = upload("/api/recognize", multipart("image", "query.png", &red_query()));
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
