//! Archive Job
//!
//! Bundles every stored report into one gzip-compressed tarball using an
//! external `tar`.
//!
//! ## Requirements
//!
//! - `tar` with gzip support must be installed and available in PATH (or the
//!   configured `ARCHIVE_COMMAND`)
//!
//! ## Behavior
//!
//! - The archive is written next to the destination under a temporary name
//!   and renamed over it on success; a failed run leaves the previous archive
//!   untouched
//! - A non-zero exit surfaces tar's stderr verbatim, including the
//!   diagnostic for a missing reports directory
//! - Runs are never retried and are not serialized against each other

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::process::Command;

/// Archive job errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to move archive into place at {path}: {source}")]
    Finalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Runs the external packaging command
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    /// Program to invoke (default: "tar" - uses PATH)
    program: String,
}

impl Default for ArchiveJob {
    fn default() -> Self {
        Self::new("tar")
    }
}

impl ArchiveJob {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Bundle the contents of `reports_dir` into `archive_path`
    ///
    /// Returns the archive path on success.
    pub async fn run(&self, reports_dir: &Path, archive_path: &Path) -> Result<PathBuf, ArchiveError> {
        let start_time = Instant::now();
        let temp_path = temp_sibling(archive_path);

        let output = Command::new(&self.program)
            .arg("-czf")
            .arg(&temp_path)
            .arg("-C")
            .arg(reports_dir)
            .arg(".")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ArchiveError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&temp_path).await;

            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            tracing::warn!(
                program = %self.program,
                reports_dir = %reports_dir.display(),
                status = %output.status,
                stderr = %stderr,
                "Archive command failed"
            );

            return Err(ArchiveError::CommandFailed {
                program: self.program.clone(),
                status: output.status,
                stderr,
            });
        }

        if let Err(source) = tokio::fs::rename(&temp_path, archive_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ArchiveError::Finalize {
                path: archive_path.to_path_buf(),
                source,
            });
        }

        tracing::info!(
            reports_dir = %reports_dir.display(),
            archive = %archive_path.display(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Reports archived"
        );

        Ok(archive_path.to_path_buf())
    }
}

/// Unique temporary path in the archive's directory
fn temp_sibling(archive_path: &Path) -> PathBuf {
    let file_name = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());

    archive_path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
}
