//! HTTP error type and the mapping from engine failures to status codes.

use crate::engine::EngineError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    /// Bad request (missing field, unsupported image).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request cannot be served in the current state (empty gallery).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Engine thread is gone.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message without the status prefix.
    pub fn message(&self) -> &str {
        match self {
            HttpError::BadRequest(msg)
            | HttpError::Conflict(msg)
            | HttpError::PayloadTooLarge(msg)
            | HttpError::ServiceUnavailable(msg)
            | HttpError::Internal(msg) => msg,
        }
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.message(),
            status: status.as_u16(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<EngineError> for HttpError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Image(e) => HttpError::BadRequest(e.to_string()),
            EngineError::EmptyGallery => HttpError::Conflict(
                "no known faces loaded; add images to the gallery folder and reload".to_string(),
            ),
            EngineError::ChannelClosed => HttpError::ServiceUnavailable(err.to_string()),
            EngineError::Analyze(_) | EngineError::Gallery(_) | EngineError::Spawn(_) => {
                HttpError::Internal(err.to_string())
            }
        }
    }
}

impl From<MultipartError> for HttpError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            HttpError::PayloadTooLarge(err.body_text())
        } else {
            HttpError::BadRequest(err.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::ImageError;

    #[test]
    fn test_engine_error_mapping() {
        let status = |e: EngineError| HttpError::from(e).status();
        assert_eq!(status(EngineError::Image(ImageError::Unsupported)), StatusCode::BAD_REQUEST);
        assert_eq!(status(EngineError::EmptyGallery), StatusCode::CONFLICT);
        assert_eq!(status(EngineError::ChannelClosed), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_message_has_no_prefix() {
        let err = HttpError::BadRequest("missing field".into());
        assert_eq!(err.message(), "missing field");
        assert_eq!(err.to_string(), "Bad request: missing field");
    }
}
