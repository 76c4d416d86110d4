//! Error types shared by the aggregator, the bootstrap layer, and backends.

use thiserror::Error;

/// Errors a [`Backend`](crate::backend::Backend) reports from one of its operations.
///
/// The aggregator never inspects or translates these; they reach the caller
/// wrapped in [`CacheError::Backend`] exactly as the backend produced them.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no key given and no staging frame has been started")]
    NotStarted,

    #[error("backend `{backend}` is unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors produced by [`TieredCache`](crate::tiered::TieredCache) and the
/// configuration layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to encode or decode cached content: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broadcast task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type BackendResult<T> = Result<T, BackendError>;

pub type CacheResult<T> = Result<T, CacheError>;
