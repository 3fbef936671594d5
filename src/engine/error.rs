//! Error types for the dispatch engine.

use thiserror::Error;

use super::pool::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Errors raised by the worker pool and its queue handle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Queue capacity must be at least one.
    #[error("invalid queue capacity {value}: must be at least 1")]
    InvalidQueueCapacity {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The dispatcher is gone and no longer accepts jobs.
    #[error("job queue closed")]
    QueueClosed,

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}
