//! Error types for source discovery.

use thiserror::Error;

/// Errors that can occur while resolving download sources for an archive.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The directory was built without any scheduler.
    #[error("no scheduler configured")]
    NoSchedulers,

    /// No scheduler serves the agent's area.
    #[error("no scheduler found for area {area_id}")]
    NoScheduler {
        /// Area the agent is bound to.
        area_id: String,
    },

    /// Transport failure talking to the scheduler.
    #[error("scheduler request to {url} failed: {source}")]
    Network {
        /// Scheduler endpoint.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The scheduler answered with a non-success HTTP status.
    #[error("scheduler {url} returned HTTP {status}")]
    HttpStatus {
        /// Scheduler endpoint.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The scheduler answered with a JSON-RPC error object.
    #[error("scheduler {url} rpc error {code}: {message}")]
    Rpc {
        /// Scheduler endpoint.
        url: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The scheduler response could not be interpreted.
    #[error("invalid scheduler response from {url}: {reason}")]
    InvalidResponse {
        /// Scheduler endpoint.
        url: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

impl DiscoveryError {
    /// Creates a missing-area error.
    pub fn no_scheduler(area_id: impl Into<String>) -> Self {
        Self::NoScheduler {
            area_id: area_id.into(),
        }
    }

    /// Creates a network error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
