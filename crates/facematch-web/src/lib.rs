//! facematch-web: browser front end for facematch.
//!
//! Upload a photo, get it back with every face boxed and labelled with the
//! closest known identity.

pub mod engine;
pub mod error;
pub mod page;
pub mod routes;
pub mod state;

pub use engine::{spawn_engine, EngineError, EngineHandle, GallerySnapshot, RecognizeOutput};
pub use error::HttpError;
pub use routes::create_router;
pub use state::{AppState, ModelInfo};
