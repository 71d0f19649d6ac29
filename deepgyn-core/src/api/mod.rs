//! # HTTP API
//!
//! axum router exposing analysis, scan history and report generation.
//! Every failure is answered with a JSON `{"error": "..."}` body and a status
//! code derived from the error kind.

mod server;

pub use server::{AppState, SharedState, router, run};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::DeepGynError;

impl DeepGynError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeepGynError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            DeepGynError::Unauthorized => StatusCode::UNAUTHORIZED,
            DeepGynError::Forbidden { .. } => StatusCode::FORBIDDEN,
            DeepGynError::ShapeMismatch { .. } | DeepGynError::InvalidOutput { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DeepGynError::ClassifierUnavailable { .. } | DeepGynError::StoreUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DeepGynError::ReportRender { .. }
            | DeepGynError::Config(_)
            | DeepGynError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeepGynError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            let cause = std::error::Error::source(&self).map(ToString::to_string);
            tracing::error!(error = %self, cause = cause.as_deref(), "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
