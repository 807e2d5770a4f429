//! Content analyzers
//!
//! An analyzer owns the accumulators of one upload. The Analysis Worker feeds
//! it chunks in arrival order and asks for the report once input ends.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::line_counter::LineCounter;
use super::types::{AnalysisError, Report, DEFAULT_ERROR_MARKERS};

// ============================================================================
// Traits
// ============================================================================

/// Incremental analysis of one upload's bytes
pub trait ContentAnalyzer: Send {
    /// Apply the next chunk
    fn update(&mut self, chunk: &[u8]) -> Result<(), AnalysisError>;

    /// Consume the analyzer and produce the report
    fn finish(self: Box<Self>) -> Result<Report, AnalysisError>;
}

/// Creates a fresh analyzer per upload
pub trait AnalyzerFactory: Send + Sync {
    fn create(&self) -> Box<dyn ContentAnalyzer>;
}

// ============================================================================
// Line Analyzer
// ============================================================================

/// SHA-256 content hash plus line and error-line counts
pub struct LineAnalyzer {
    hasher: Sha256,
    lines: LineCounter,
}

impl LineAnalyzer {
    pub fn new(markers: &[String]) -> Self {
        Self {
            hasher: Sha256::new(),
            lines: LineCounter::new(markers),
        }
    }
}

impl ContentAnalyzer for LineAnalyzer {
    fn update(&mut self, chunk: &[u8]) -> Result<(), AnalysisError> {
        self.hasher.update(chunk);
        self.lines.update(chunk);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Report, AnalysisError> {
        let analyzer = *self;
        let stats = analyzer.lines.finish();
        let content_hash = hex::encode(analyzer.hasher.finalize());

        Ok(Report::success(content_hash, stats.lines, stats.error_lines))
    }
}

/// Factory for [`LineAnalyzer`] with a fixed marker set
#[derive(Debug, Clone)]
pub struct LineAnalyzerFactory {
    markers: Arc<[String]>,
}

impl LineAnalyzerFactory {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers: markers.into(),
        }
    }
}

impl Default for LineAnalyzerFactory {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_MARKERS.iter().map(|m| m.to_string()).collect())
    }
}

impl AnalyzerFactory for LineAnalyzerFactory {
    fn create(&self) -> Box<dyn ContentAnalyzer> {
        Box::new(LineAnalyzer::new(&self.markers))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Compute the SHA-256 hex digest of data in one shot
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================
