//! Job dispatch: bounded queue, worker pool and the per-job backup flow.
//!
//! [`WorkerPool`] owns the concurrency bound and FIFO admission;
//! [`BackupProcessor`] is the [`JobHandler`] every worker runs.

mod error;
mod pool;
mod processor;

pub use error::EngineError;
pub use pool::{
    DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY, DispatchStats, JobHandler, JobOutcome, JobQueue,
    WorkerPool,
};
pub use processor::{BackupProcessor, ProcessError};
