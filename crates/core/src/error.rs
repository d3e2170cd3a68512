//! Error taxonomy for the discovery and sync core.
//!
//! Each variant maps to one of the failure classes: configuration problems
//! never touch the database, parse warnings are collected rather than
//! propagated, validation/conflict/orphan problems are classified by the
//! active validation level, and database errors always abort the sync.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocSyncError {
    #[error("config error in '{path}': {message}")]
    Config { path: String, message: String },

    #[error("validation error at '{path}': {message}")]
    Validation { path: String, message: String },

    #[error("conflict '{kind}' on key '{key}': {suggestion}")]
    ConflictFatal {
        kind: String,
        key: String,
        suggestion: String,
    },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("orphaned file '{path}': {message}")]
    Orphan { path: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DocSyncError {
    /// The process exit code this error maps to, per the CLI contract:
    /// 1 for user/config errors, 2 for database/transactional errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            DocSyncError::Config { .. }
            | DocSyncError::Validation { .. }
            | DocSyncError::ConflictFatal { .. }
            | DocSyncError::Orphan { .. }
            | DocSyncError::Io { .. } => 1,
            DocSyncError::Db(_) | DocSyncError::Cancelled => 2,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocSyncError::Io {
            path: path.into().display().to_string(),
            source,
        }
    }
}

/// A non-fatal, per-file issue collected during a scan or sync. Never
/// propagated as an `Err` — always pushed onto a report's `warnings` list
/// and, where a caller is listening, also emitted as `tracing::warn!`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParseWarning {
    pub path: String,
    pub message: String,
}

impl ParseWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        let warning = Self {
            path: path.into(),
            message: message.into(),
        };
        tracing::warn!(path = %warning.path, message = %warning.message, "parse warning");
        warning
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(
            DocSyncError::Config {
                path: "x".into(),
                message: "y".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(
            DocSyncError::Db(rusqlite::Error::QueryReturnedNoRows).exit_code(),
            2
        );
    }
}
