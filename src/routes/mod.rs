//! Route modules for the request server
//!
//! - POST /upload  - analyze a streamed body and store its report
//! - GET /archive  - bundle stored reports into one archive
//! - anything else - 404

pub mod archive;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the request server router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/upload",
            post(upload::upload)
                .fallback(not_found)
                // Uploads are unbounded unless UPLOAD_MAX_BYTES is set
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/archive", get(archive::archive).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

// ============================================================================
// Tests
// ============================================================================
