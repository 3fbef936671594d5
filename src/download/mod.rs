//! Archive download from source nodes.
//!
//! This module resolves an archive's candidate sources and streams the first
//! one that answers into the allocated bucket directory.
//!
//! # Features
//!
//! - Ordered failover across discovered sources
//! - Streaming writes (memory-efficient for multi-GiB archives)
//! - Explicit opt-in for self-signed source certificates
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use carfile_backup::discovery::{Scheduler, SchedulerClient, SchedulerDirectory};
//! use carfile_backup::download::{ArchiveFetcher, SourceClient, TransportOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new("area-1", SchedulerClient::new("http://sched:3456/rpc/v0", "tk")?);
//! let directory = SchedulerDirectory::new(vec![scheduler], "area-1")?;
//! let client = SourceClient::new(&TransportOptions::default())?;
//! let fetcher = ArchiveFetcher::new(Arc::new(directory), client);
//! let fetched = fetcher.fetch("bafy...", 1 << 30, Path::new("/carfile/titan/20240101a")).await?;
//! println!("stored {} from {}", fetched.path.display(), fetched.source);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod fetcher;

pub use client::{SourceClient, TransportOptions, source_url};
pub use constants::{CONNECT_TIMEOUT_SECS, DOWNLOAD_TIMEOUT_SECS};
pub use error::DownloadError;
pub use fetcher::{ArchiveFetcher, FetchedArchive, validate_cid};
