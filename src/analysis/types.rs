//! Analysis types: reports, chunk messages and worker errors

use axum::body::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of an Analysis Worker's inbound channel (messages)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Marker substrings that flag a line as an error line
pub const DEFAULT_ERROR_MARKERS: &[&str] = &["ERROR", "CRITICAL"];

// ============================================================================
// Report
// ============================================================================

/// Result record of one analysis run
///
/// Produced exactly once per upload when the input stream ends. Stored
/// content-addressed under `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// SHA-256 of the uploaded bytes, lowercase hex
    pub content_hash: String,

    /// Total number of lines
    pub line_count: u64,

    /// Lines containing at least one error marker
    pub error_line_count: u64,

    /// Outcome of the analysis
    pub status: ReportStatus,

    /// Diagnostic attached to an `Error` report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Report {
    /// Build a successful report
    pub fn success(content_hash: String, line_count: u64, error_line_count: u64) -> Self {
        Self {
            content_hash,
            line_count,
            error_line_count,
            status: ReportStatus::Success,
            error_detail: None,
        }
    }
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

// ============================================================================
// Inter-unit Protocol
// ============================================================================

/// Message sent from the Request Server to an Analysis Worker
///
/// Zero or more `Chunk`s followed by exactly one `End`.
#[derive(Debug, Clone)]
pub enum ChunkMessage {
    Chunk(Bytes),
    End,
}

/// Lifecycle of an Analysis Worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, no chunk received yet
    Idle,
    /// At least one chunk received
    Receiving,
    /// `End` received, computing the report
    Finalizing,
    /// Terminal value emitted
    Terminated,
}

// ============================================================================
// Error Types
// ============================================================================

/// Fault raised by or about an Analysis Worker
///
/// Every variant is an error signal: the owner treats all of them as a
/// worker fault.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("analyzer fault: {0}")]
    Fault(String),

    #[error("analysis worker panicked: {0}")]
    Panicked(String),

    #[error("input closed before end of stream")]
    InputClosed,

    #[error("analysis worker terminated")]
    Terminated,
}
