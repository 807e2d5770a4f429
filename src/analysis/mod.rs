//! Content Analysis
//!
//! Per-upload analysis behind a message boundary:
//! - `worker`: isolated task fed by a bounded chunk channel, one terminal value
//! - `analyzer`: SHA-256 content hash and line statistics
//! - `line_counter`: chunk-invariant line and error-line counting
//! - `validation`: checks applied to a report before it is stored
//!
//! Protocol:
//! 1. Request handler spawns a worker
//! 2. Handler forwards body chunks in order, then `End`
//! 3. Worker replies with exactly one `Report` or error signal

pub mod analyzer;
pub mod line_counter;
pub mod types;
pub mod validation;
pub mod worker;

pub use analyzer::{compute_hash, AnalyzerFactory, ContentAnalyzer, LineAnalyzer, LineAnalyzerFactory};
pub use line_counter::{LineCounter, LineStats};
pub use types::*;
pub use validation::{validate_report, ValidationError};
pub use worker::{spawn, AnalysisWorkerHandle};
