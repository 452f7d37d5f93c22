//! Error types for the release orchestrator

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error kind surfaced to front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Analysis,
    Backend,
    Timeout,
    Cancelled,
    Internal,
}

/// Main error type for the release orchestrator
#[derive(Error, Debug)]
pub enum RiggerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Backend error: {context}: {message}")]
    Backend { context: String, message: String },

    #[error("Upgrade of release {release} v{version} timed out after {elapsed_ms} ms")]
    Timeout {
        release: String,
        version: u32,
        elapsed_ms: u64,
    },

    #[error("Upgrade of release {release} v{version} cancelled after {elapsed_ms} ms")]
    Cancelled {
        release: String,
        version: u32,
        elapsed_ms: u64,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RiggerError {
    /// Wrap a collaborator failure with the release/app it happened for.
    pub fn backend(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        RiggerError::Backend {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RiggerError::Validation(_) => ErrorKind::Validation,
            RiggerError::NotFound(_) => ErrorKind::NotFound,
            RiggerError::Conflict(_) => ErrorKind::Conflict,
            RiggerError::Analysis(_) => ErrorKind::Analysis,
            RiggerError::Backend { .. } => ErrorKind::Backend,
            RiggerError::Timeout { .. } => ErrorKind::Timeout,
            RiggerError::Cancelled { .. } => ErrorKind::Cancelled,
            // Unparseable input from a caller is a malformed request.
            RiggerError::JsonError(_) | RiggerError::YamlError(_) => ErrorKind::Validation,
            RiggerError::IoError(_) | RiggerError::ConfigError(_) | RiggerError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// A cancelled upgrade is an early exit the caller asked for.
    pub fn is_failure(&self) -> bool {
        self.kind() != ErrorKind::Cancelled
    }
}

impl From<anyhow::Error> for RiggerError {
    fn from(err: anyhow::Error) -> Self {
        RiggerError::Internal(err.to_string())
    }
}
