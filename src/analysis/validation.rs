//! Report validation
//!
//! A report crosses the worker boundary as an untrusted message. Only
//! reports passing these checks are persisted.

use super::types::{Report, ReportStatus};

/// Reason a report was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("report status is not success{}", .0.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    NotSuccess(Option<String>),

    #[error("report contentHash is empty")]
    EmptyHash,

    #[error("report contentHash is not lowercase hex: {0}")]
    MalformedHash(String),

    #[error("errorLineCount {error_lines} exceeds lineCount {lines}")]
    CountMismatch { lines: u64, error_lines: u64 },
}

/// Check a report before it is stored
///
/// Line counts are unsigned, so non-negativity holds by construction.
pub fn validate_report(report: &Report) -> Result<(), ValidationError> {
    if report.status != ReportStatus::Success {
        return Err(ValidationError::NotSuccess(report.error_detail.clone()));
    }

    if report.content_hash.is_empty() {
        return Err(ValidationError::EmptyHash);
    }

    // The hash names a file in the report store
    if !report
        .content_hash
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(ValidationError::MalformedHash(report.content_hash.clone()));
    }

    if report.error_line_count > report.line_count {
        return Err(ValidationError::CountMismatch {
            lines: report.line_count,
            error_lines: report.error_line_count,
        });
    }

    Ok(())
}
