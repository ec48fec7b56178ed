//! Error types for TransferPool
//!
//! Task attempts fail with `anyhow::Error` because a task is arbitrary caller
//! code. Everything the pool itself can report is a [`DispatchError`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dispatch and transfer operations
#[derive(Error, Debug)]
pub enum DispatchError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A pool needs at least one worker
    #[error("Invalid capacity: a worker pool needs at least one worker")]
    InvalidCapacity,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {worker_id}: {source}")]
    WorkerSpawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },

    /// Worker thread went away while a task was in flight
    #[error("Worker {0} stopped before reporting completion")]
    WorkerLost(usize),

    /// Every worker thread is gone while tasks were still in flight
    #[error("Worker pool disconnected with {0} tasks in flight")]
    PoolDisconnected(usize),

    /// Task gave up after exhausting its retry policy
    #[error("Task '{label}' failed after {attempts} attempts: {message}")]
    TaskFailed {
        label: String,
        attempts: u32,
        message: String,
    },

    /// Multiple errors occurred
    #[error("Multiple errors occurred ({count} errors)")]
    MultipleErrors {
        count: usize,
        errors: Vec<DispatchError>,
    },
}

impl DispatchError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a terminal task failure
    pub fn task_failed(label: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            label: label.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::NotFound(path) => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for TransferPool operations
pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| DispatchError::io(path, e))
    }
}

/// Collects multiple results into a single result
pub fn collect_errors<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(successes),
        1 => Err(errors.remove(0)),
        count => Err(DispatchError::MultipleErrors { count, errors }),
    }
}
