//! Error types for batch processing.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionId;

/// Request-level errors.
///
/// `Capacity`, `Session`, `Encode` and `Unexpected` abort the whole batch. `Decode` and
/// `MemoryExhaustion` are produced per image and are turned into
/// [`ItemFailure`](crate::batch::ItemFailure)s by the batch processor instead of
/// crossing the batch boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Batch of {count} files exceeds the maximum batch size of {max}")]
    Capacity { count: usize, max: usize },

    #[error("Failed to decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    #[error(
        "Not enough memory to process '{name}': needs {required_bytes} bytes, budget is {available_bytes} bytes"
    )]
    MemoryExhaustion {
        name: String,
        required_bytes: u64,
        available_bytes: u64,
    },

    #[error(
        "Batch {session} timed out after {elapsed:?} (limit {limit:?}); {persisted} outputs were persisted"
    )]
    Timeout {
        session: SessionId,
        elapsed: Duration,
        limit: Duration,
        persisted: usize,
    },

    #[error("Worker reached its limit of {limit} batches and must be recycled")]
    WorkerExhausted { limit: u32 },

    #[error("Session store failure: {0}")]
    Session(#[from] SessionError),

    #[error("Failed to encode '{name}': {reason}")]
    Encode { name: String, reason: String },

    #[error("Internal failure: {0}")]
    Unexpected(String),
}

impl Error {
    /// Whether a caller may retry the same request (possibly with smaller images).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::MemoryExhaustion { .. } | Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a [`SessionStore`](crate::session::SessionStore).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session store I/O failure at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid entry name '{0}'")]
    InvalidName(String),

    #[error("Unknown session '{0}'")]
    UnknownSession(SessionId),
}

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported config format: {0}")]
    Format(#[from] common::FileExtensionError),

    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: common::SerdeFormatError,
    },
}
