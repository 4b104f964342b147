//! HTTP error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so failures become a JSON body
//! `{"error": "..."}` with a matching status code.
//!
//! Validation failures are the caller's fault and map to 400. Conversion
//! failures map to 500 and carry the failing file name plus the engine's
//! diagnostic, which is what the user needs to fix their upload. Local I/O
//! failures are logged in full but only a generic message is returned, so
//! server paths never leak to clients.

use crate::error::{DocConvError, ErrorClass};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the conversion library.
    #[error(transparent)]
    Conversion(#[from] DocConvError),

    /// Malformed multipart body or missing form field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Conversion(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conversion(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let client_message = match &self {
            ServerError::BadRequest(m) => m.clone(),
            ServerError::Conversion(e) => match e.class() {
                ErrorClass::Validation => e.to_string(),
                ErrorClass::Conversion => {
                    error!(error = %e, "batch conversion failed");
                    e.to_string()
                }
                ErrorClass::Io => {
                    error!(error = %e, "batch I/O failure");
                    "Conversion failed: internal storage error".to_owned()
                }
            },
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                "internal server error".to_owned()
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}
