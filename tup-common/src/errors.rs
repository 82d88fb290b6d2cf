//! Error types shared by stores and executors.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the persistence layer, including lock acquisition.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timed out after {waited:?} waiting for run-state lock {path}")]
    LockTimeout {
        path: PathBuf,
        waited: std::time::Duration,
    },

    #[error("run-state lock is poisoned: {0}")]
    LockPoisoned(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state document {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single per-tenant update. Always recoverable for the run.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("update command exited with {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("failed to launch update command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("update rejected: {0}")]
    Rejected(String),
}
