//! Carfile Backup Library
//!
//! This library mirrors content-addressed CAR archives from source nodes into
//! local storage. Pending backups are polled from a storage API, each archive
//! is fetched from the first discovered source that answers, and the outcome
//! is reported back.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`job`] - Backup job records and their wire format
//! - [`poller`] - Interval-driven job polling into the bounded queue
//! - [`engine`] - Worker pool, FIFO dispatcher and per-job backup flow
//! - [`dedup`] - Registry of archives currently being downloaded
//! - [`storage`] - Date-bucketed, capacity-aware directory allocation
//! - [`discovery`] - Source lookup through area schedulers
//! - [`download`] - Multi-source archive retrieval
//! - [`report`] - Result reporting to the storage API
//! - [`config`] - TOML configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dedup;
pub mod discovery;
pub mod download;
pub mod engine;
mod http_client;
pub mod job;
pub mod poller;
pub mod report;
pub mod storage;
#[cfg(test)]
pub(crate) mod test_support;
mod user_agent;

// Re-export commonly used types
pub use config::{AgentConfig, ConfigError};
pub use dedup::{InFlightClaim, InFlightRegistry};
pub use discovery::{SchedulerDirectory, SourceDiscovery, SourceEndpoint};
pub use download::{ArchiveFetcher, DownloadError, SourceClient, TransportOptions};
pub use engine::{
    BackupProcessor, DEFAULT_CONCURRENCY, DispatchStats, EngineError, JobHandler, JobOutcome,
    JobQueue, WorkerPool,
};
pub use job::{ERROR_EVENT_ID, Job};
pub use poller::{HttpJobSource, JobSource, PollError, Poller};
pub use report::{HttpResultReporter, ReportError, ResultReporter};
pub use storage::{AllocateError, Allocation, DirectoryAllocator};
