//! Shared application state.

use crate::engine::EngineHandle;
use std::sync::Arc;

/// Model files the engine was started with, reported by `/health`.
#[derive(Debug, Clone, Default)]
pub struct ModelInfo {
    pub detector: String,
    pub recognizer: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub models: Arc<ModelInfo>,
    /// Upload limit in bytes, applied to multipart routes.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(engine: EngineHandle, models: ModelInfo, max_upload_bytes: usize) -> Self {
        Self {
            engine,
            models: Arc::new(models),
            max_upload_bytes,
        }
    }
}
