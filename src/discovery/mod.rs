//! Download source discovery.
//!
//! A content identifier is resolved to an ordered list of
//! [`SourceEndpoint`]s by asking a scheduler. The capability is injected into
//! the downloader as a [`SourceDiscovery`] trait object so tests and other
//! registries can stand in for the scheduler RPC.
//!
//! - [`SchedulerDirectory`] - picks the scheduler serving the agent's area
//! - [`SchedulerClient`] - JSON-RPC client for one scheduler

mod error;
mod scheduler;

pub use error::DiscoveryError;
pub use scheduler::{GET_SOURCES_METHOD, Scheduler, SchedulerClient, SchedulerDirectory};

use async_trait::async_trait;

/// One node able to serve an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoint {
    /// Network address, with or without a scheme.
    pub address: String,
    /// Access token presented to the node; may be empty.
    pub token: String,
}

impl SourceEndpoint {
    /// Creates a source endpoint.
    #[must_use]
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
        }
    }
}

/// Resolves a content identifier to candidate download sources.
///
/// Implementations return candidates in preference order; callers try them
/// in that order. Sources are resolved fresh for every download attempt.
#[async_trait]
pub trait SourceDiscovery: Send + Sync {
    /// Returns the candidate sources for `cid`, possibly empty.
    async fn source_list(&self, cid: &str) -> Result<Vec<SourceEndpoint>, DiscoveryError>;
}
