//! Configuration management for the upload analyzer

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_ERROR_MARKERS};

/// Invalid configuration value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Certificate material; plaintext HTTP when absent
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub reports_dir: PathBuf,
    pub archive_path: PathBuf,
    pub archive_command: String,
    /// Inbound channel capacity of each Analysis Worker
    pub channel_capacity: usize,
    pub error_markers: Vec<String>,
    /// Reject bodies larger than this; unbounded when `None`
    pub max_upload_bytes: Option<u64>,
    /// Give up on a body that stalls this long; no timeout when `None`
    pub upload_idle_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub worker_count: usize,
    pub restart_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8443,
                tls: None,
            },
            pipeline: PipelineConfig::default(),
            supervisor: SupervisorConfig {
                worker_count: default_worker_count(),
                restart_delay: Duration::from_millis(250),
            },
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            reports_dir: PathBuf::from("./reports"),
            archive_path: PathBuf::from("./reports.tar.gz"),
            archive_command: "tar".to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            error_markers: DEFAULT_ERROR_MARKERS.iter().map(|m| m.to_string()).collect(),
            max_upload_bytes: None,
            upload_idle_timeout: None,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables
    ///
    /// Unset variables take their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let tls = match (env::var("TLS_CERT_PATH").ok(), env::var("TLS_KEY_PATH").ok()) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let error_markers = match env::var("ERROR_MARKERS") {
            Ok(value) => parse_markers(&value),
            Err(_) => defaults.pipeline.error_markers,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT")?.unwrap_or(defaults.server.port),
                tls,
            },
            pipeline: PipelineConfig {
                reports_dir: env::var("REPORTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.pipeline.reports_dir),
                archive_path: env::var("ARCHIVE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.pipeline.archive_path),
                archive_command: env::var("ARCHIVE_COMMAND")
                    .unwrap_or(defaults.pipeline.archive_command),
                channel_capacity: parse_var("ANALYSIS_CHANNEL_CAPACITY")?
                    .filter(|capacity: &usize| *capacity > 0)
                    .unwrap_or(defaults.pipeline.channel_capacity),
                error_markers,
                max_upload_bytes: parse_var("UPLOAD_MAX_BYTES")?,
                upload_idle_timeout: parse_var("UPLOAD_IDLE_TIMEOUT_SECS")?
                    .map(Duration::from_secs),
            },
            supervisor: SupervisorConfig {
                worker_count: parse_var("WORKER_COUNT")?
                    .filter(|count: &usize| *count > 0)
                    .unwrap_or(defaults.supervisor.worker_count),
                restart_delay: parse_var("WORKER_RESTART_DELAY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.supervisor.restart_delay),
            },
        })
    }
}

/// One worker process per available CPU
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Comma-separated marker list; blanks are dropped
pub fn parse_markers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8443);
        assert!(config.server.tls.is_none());
        assert_eq!(config.pipeline.error_markers, vec!["ERROR", "CRITICAL"]);
        assert!(config.pipeline.max_upload_bytes.is_none());
        assert!(config.pipeline.upload_idle_timeout.is_none());
        assert!(config.supervisor.worker_count >= 1);
    }

    #[test]
    fn test_parse_markers() {
        assert_eq!(parse_markers("ERROR, FATAL ,,PANIC"), vec!["ERROR", "FATAL", "PANIC"]);
        assert!(parse_markers(" , ").is_empty());
    }
}
