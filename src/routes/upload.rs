//! Upload Routes
//!
//! POST /upload - stream a body through a fresh Analysis Worker and store the
//! resulting report.
//!
//! Flow:
//! 1. Spawn an Analysis Worker for this request
//! 2. Forward body chunks in arrival order; a full worker channel pauses
//!    reading of the body
//! 3. Send end-of-stream and await the worker's single terminal value
//! 4. Validate the report, persist it by content hash, respond with it

use std::path::PathBuf;

use axum::{body::Body, extract::State, Json};
use futures::StreamExt;
use serde::Serialize;

use crate::analysis::{self, validate_report, AnalysisError, ReportStatus};
use crate::error::{PipelineError, Result};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Response after a successful upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub content_hash: String,
    pub line_count: u64,
    pub error_line_count: u64,
    pub status: ReportStatus,
    pub report_path: PathBuf,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload
///
/// The body is raw bytes of any size. Dropping this future (client went away)
/// drops the worker handle, which aborts the worker.
pub async fn upload(State(state): State<AppState>, body: Body) -> Result<Json<UploadResponse>> {
    let config = state.config();
    let mut worker = analysis::spawn(state.analyzers().create(), config.channel_capacity);
    let worker_id = worker.id();

    let mut stream = body.into_data_stream();
    let mut received: u64 = 0;
    let mut chunks: u64 = 0;

    loop {
        let next = match config.upload_idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    worker.terminate();
                    return Err(PipelineError::UploadTimeout {
                        secs: idle.as_secs(),
                    });
                }
            },
            None => stream.next().await,
        };

        let Some(frame) = next else {
            break;
        };

        let chunk = match frame {
            Ok(chunk) => chunk,
            Err(e) => {
                worker.terminate();
                tracing::warn!(
                    worker_id = %worker_id,
                    received = received,
                    error = %e,
                    "Upload stream failed, worker terminated"
                );
                return Err(PipelineError::Stream(e.to_string()));
            }
        };

        received += chunk.len() as u64;
        if let Some(limit) = config.max_upload_bytes {
            if received > limit {
                worker.terminate();
                return Err(PipelineError::PayloadTooLarge { limit });
            }
        }

        if chunk.is_empty() {
            continue;
        }
        chunks += 1;

        if worker.send_chunk(chunk).await.is_err() {
            // Worker stopped before end of stream; its outcome says why
            let fault = match worker.wait().await {
                Err(e) => e,
                Ok(_) => AnalysisError::Terminated,
            };
            return Err(PipelineError::WorkerFault(fault));
        }
    }

    let report = worker.finish().await?;
    validate_report(&report)?;

    let report_path = state.report_store().put(&report).await?;

    tracing::info!(
        worker_id = %worker_id,
        content_hash = %report.content_hash,
        line_count = report.line_count,
        error_line_count = report.error_line_count,
        bytes = received,
        chunks = chunks,
        path = %report_path.display(),
        "Upload analyzed"
    );

    Ok(Json(UploadResponse {
        content_hash: report.content_hash,
        line_count: report.line_count,
        error_line_count: report.error_line_count,
        status: report.status,
        report_path,
    }))
}
