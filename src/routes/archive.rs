//! Archive Routes
//!
//! GET /archive - bundle every stored report into the configured archive.
//! Runs inside this request only; other requests keep being served.

use axum::extract::State;

use crate::error::Result;
use crate::state::AppState;

/// GET /archive
///
/// Plain-text archive path on success, plain-text diagnostic on failure.
pub async fn archive(State(state): State<AppState>) -> Result<String> {
    let config = state.config();

    let path = state
        .archive_job()
        .run(&config.reports_dir, &config.archive_path)
        .await?;

    Ok(path.display().to_string())
}
