//! Filesystem report store
//!
//! Writes are idempotent create-or-overwrite keyed by content hash. Each write
//! goes to a unique temporary file in the same directory and is renamed into
//! place, so readers never observe a partial report and concurrent writers of
//! the same hash (within or across processes) need no locking.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::analysis::Report;

// ============================================================================
// Errors
// ============================================================================

/// Report store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to create report directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Report Store
// ============================================================================

/// Content-addressed report storage rooted at one directory
#[derive(Debug, Clone)]
pub struct ReportStore {
    base_path: PathBuf,
}

impl ReportStore {
    /// Create a store rooted at `base_path`
    ///
    /// The directory is created lazily by the first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory holding the reports
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Location of the report for `content_hash`
    pub fn report_path(&self, content_hash: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", content_hash))
    }

    /// Persist a report, replacing any report already stored under its hash
    ///
    /// The hash must already be validated: it becomes a file name.
    pub async fn put(&self, report: &Report) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: self.base_path.clone(),
                source,
            })?;

        let mut data = serde_json::to_vec_pretty(report)?;
        data.push(b'\n');

        let path = self.report_path(&report.content_hash);
        let temp_path = self
            .base_path
            .join(format!(".{}.{}.tmp", report.content_hash, Uuid::new_v4()));

        if let Err(source) = tokio::fs::write(&temp_path, &data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::Write {
                path: temp_path,
                source,
            });
        }

        if let Err(source) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::Write { path, source });
        }

        tracing::debug!(
            content_hash = %report.content_hash,
            path = %path.display(),
            size = data.len(),
            "Report stored"
        );

        Ok(path)
    }

    /// Load the report stored under `content_hash`, if any
    pub async fn get(&self, content_hash: &str) -> Result<Option<Report>, StoreError> {
        let path = self.report_path(content_hash);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        Ok(Some(serde_json::from_slice(&data)?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::compute_hash;
    use tempfile::TempDir;

    fn report_for(data: &[u8]) -> Report {
        Report::success(compute_hash(data), 2, 1)
    }

    fn json_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    #[tokio::test]
    async fn test_put_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReportStore::new(temp_dir.path().join("nested").join("reports"));
        let report = report_for(b"hello");

        let path = store.put(&report).await.unwrap();

        assert_eq!(path, store.report_path(&report.content_hash));
        assert!(path.exists());
        assert_eq!(store.get(&report.content_hash).await.unwrap(), Some(report));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReportStore::new(temp_dir.path());
        let report = report_for(b"same bytes");

        let first = store.put(&report).await.unwrap();
        let first_bytes = std::fs::read(&first).unwrap();
        let second = store.put(&report).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), first_bytes);
        assert_eq!(json_files(temp_dir.path()).len(), 1);
        // No temp files left behind
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_hash() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReportStore::new(temp_dir.path());
        let report = report_for(b"contended");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let report = report.clone();
            handles.push(tokio::spawn(async move { store.put(&report).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(json_files(temp_dir.path()).len(), 1);
        assert_eq!(store.get(&report.content_hash).await.unwrap(), Some(report));
    }

    #[tokio::test]
    async fn test_stored_json_shape() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReportStore::new(temp_dir.path());
        let report = report_for(b"shape");

        let path = store.put(&report).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();

        assert_eq!(value["contentHash"], report.content_hash.as_str());
        assert_eq!(value["lineCount"], 2);
        assert_eq!(value["errorLineCount"], 1);
        assert_eq!(value["status"], "success");
        assert!(value.get("errorDetail").is_none());
    }

    #[tokio::test]
    async fn test_get_missing_report() {
        let temp_dir = TempDir::new().unwrap();
        let store = ReportStore::new(temp_dir.path());
        assert_eq!(store.get(&compute_hash(b"absent")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_fails_when_base_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("reports");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = ReportStore::new(&blocker);
        let result = store.put(&report_for(b"x")).await;

        assert!(matches!(result, Err(StoreError::CreateDir { .. })));
    }
}
