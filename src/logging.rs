//! Structured logging via the `tracing` crate: configurable level,
//! format, and destination.

use crate::error::FsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output includes file; None means use the
    /// platform state directory
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format, tty destinations only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
        }
    }
}

/// Resolve the log file path with precedence: SOPSFS_LOG_FILE env, config
/// file, platform state directory default.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> Result<PathBuf, FsError> {
    if let Ok(env_path) = std::env::var("SOPSFS_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(path) = config_file {
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }
    let project_dirs = directories::ProjectDirs::from("", "sopsfs", "sopsfs").ok_or_else(|| {
        FsError::Config("could not determine platform state directory for log file".to_string())
    })?;
    let state_dir = project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_dir());
    Ok(state_dir.join("sopsfs.log"))
}

fn file_writer(config: &LoggingConfig) -> Result<std::sync::Arc<std::fs::File>, FsError> {
    let path = resolve_log_file_path(config.file.clone())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| FsError::Config(format!("failed to create log directory: {}", e)))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map(std::sync::Arc::new)
        .map_err(|e| FsError::Config(format!("failed to open log file {:?}: {}", path, e)))
}

fn writer_for(config: &LoggingConfig) -> Result<(BoxMakeWriter, bool), FsError> {
    let output = std::env::var("SOPSFS_LOG_OUTPUT").unwrap_or_else(|_| config.output.clone());
    match output.as_str() {
        "stdout" => Ok((BoxMakeWriter::new(std::io::stdout), config.color)),
        "stderr" => Ok((BoxMakeWriter::new(std::io::stderr), config.color)),
        "file" => Ok((BoxMakeWriter::new(file_writer(config)?), false)),
        "file+stderr" => Ok((
            BoxMakeWriter::new(file_writer(config)?.and(std::io::stderr)),
            false,
        )),
        other => Err(FsError::Config(format!(
            "invalid log output: {} (must be 'stdout', 'stderr', 'file', or 'file+stderr')",
            other
        ))),
    }
}

/// Initialize the logging system.
///
/// `SOPSFS_LOG`, `SOPSFS_LOG_FORMAT`, `SOPSFS_LOG_OUTPUT` and
/// `SOPSFS_LOG_FILE` override the corresponding configuration fields.
pub fn init_logging(config: &LoggingConfig) -> Result<(), FsError> {
    if !config.enabled || config.level == "off" {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_env("SOPSFS_LOG") {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| FsError::Config(format!("invalid log level {:?}: {}", config.level, e)))?,
    };

    let format = std::env::var("SOPSFS_LOG_FORMAT").unwrap_or_else(|_| config.format.clone());
    let (writer, ansi) = writer_for(config)?;
    let registry = Registry::default().with(filter);

    let init_result = match format.as_str() {
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        "text" => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
        other => {
            return Err(FsError::Config(format!(
                "invalid log format: {} (must be 'json' or 'text')",
                other
            )))
        }
    };
    init_result.map_err(|e| FsError::Config(format!("failed to install subscriber: {}", e)))
}
