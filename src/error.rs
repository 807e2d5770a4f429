//! Error types for the request server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::analysis::{AnalysisError, ValidationError};
use crate::archive::ArchiveError;
use crate::storage::StoreError;

/// Request-level result type
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Request-level error type
///
/// Every failure is contained to its own request; none of these take the
/// process down.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed report from the worker; nothing was persisted
    #[error("Invalid report: {0}")]
    Validation(#[from] ValidationError),

    /// Worker crashed or signalled an error before completing
    #[error("Analysis failed: {0}")]
    WorkerFault(#[from] AnalysisError),

    #[error("Failed to persist report: {0}")]
    Persistence(#[from] StoreError),

    /// Request body failed mid-upload
    #[error("Upload stream failed: {0}")]
    Stream(String),

    #[error("Upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Upload stalled for more than {secs} seconds")]
    UploadTimeout { secs: u64 },

    #[error("{0}")]
    Archive(#[from] ArchiveError),
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::WorkerFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UploadTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            Self::Validation(e) => tracing::warn!("Rejected report: {}", e),
            Self::PayloadTooLarge { .. } | Self::UploadTimeout { .. } => {
                tracing::warn!("{}", self)
            }
            _ => tracing::error!("{}", self),
        }

        // Archive diagnostics are plain text, upload errors are JSON
        if let Self::Archive(e) = &self {
            return (status, e.to_string()).into_response();
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}
