//! Application state management
//!
//! Per-process state shared by all requests. The report store is the only
//! resource requests have in common; analyzers are created fresh per upload
//! and never shared.

use std::sync::Arc;

use crate::analysis::{AnalyzerFactory, LineAnalyzerFactory};
use crate::archive::ArchiveJob;
use crate::config::PipelineConfig;
use crate::storage::ReportStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: PipelineConfig,
    pub report_store: ReportStore,
    pub archive_job: ArchiveJob,
    pub analyzers: Arc<dyn AnalyzerFactory>,
}

impl AppState {
    /// Create state with the default line analyzer
    pub fn new(config: PipelineConfig) -> Self {
        let analyzers = Arc::new(LineAnalyzerFactory::new(config.error_markers.clone()));
        Self::with_analyzers(config, analyzers)
    }

    /// Create state with a custom analyzer factory
    pub fn with_analyzers(config: PipelineConfig, analyzers: Arc<dyn AnalyzerFactory>) -> Self {
        let report_store = ReportStore::new(config.reports_dir.clone());
        let archive_job = ArchiveJob::new(config.archive_command.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                report_store,
                archive_job,
                analyzers,
            }),
        }
    }

    /// Get the pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Get the report store
    pub fn report_store(&self) -> &ReportStore {
        &self.inner.report_store
    }

    /// Get the archive job
    pub fn archive_job(&self) -> &ArchiveJob {
        &self.inner.archive_job
    }

    /// Get the analyzer factory
    pub fn analyzers(&self) -> &dyn AnalyzerFactory {
        self.inner.analyzers.as_ref()
    }
}
