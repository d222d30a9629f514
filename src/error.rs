//! Error types for document projection and tool invocation.

use thiserror::Error;

/// Failures from the external encryption tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("tool produced undecodable output: {0}")]
    Output(String),

    #[error("i/o error staging tool input: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem-contract errors surfaced to the host.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("already exists: {0}")]
    FileExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid path segment {segment:?}: {reason}")]
    InvalidPath { segment: String, reason: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse decrypted document: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FsError {
    pub(crate) fn invalid_index(segment: &str) -> FsError {
        FsError::InvalidPath {
            segment: segment.to_string(),
            reason: "not a valid array index".to_string(),
        }
    }
}
