//! HTTP surface (feature `server`).
//!
//! | Method | Path           | Purpose                                         |
//! |--------|----------------|-------------------------------------------------|
//! | GET    | `/`            | embedded upload page                            |
//! | POST   | `/api/convert` | multipart `files` parts + `target_format` field |
//! | GET    | `/api/health`  | liveness plus engine availability               |
//!
//! The router is a plain [`axum::Router`]; the binary binds it to a socket,
//! tests drive it in-process with `tower::ServiceExt::oneshot`.

mod error;
mod routes;

pub use error::ServerError;

use crate::config::BatchConfig;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Default request body limit: 200 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 200 * 1024 * 1024;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Batch configuration used for every request.
    pub config: Arc<BatchConfig>,
    /// Leave request workspaces on disk after the response has been sent.
    pub keep_outputs: bool,
    /// Upper bound on a request body, in bytes.
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config: Arc::new(config),
            keep_outputs: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn keep_outputs(mut self, keep: bool) -> Self {
        self.keep_outputs = keep;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/", get(routes::index))
        .route("/api/convert", post(routes::convert))
        .route("/api/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
