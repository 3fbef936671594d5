//! Error types for the download module.
//!
//! Errors raised while *opening* a source (network, status, URL) let the
//! downloader fall through to the next candidate. Errors raised after a
//! source's response was accepted ([`DownloadError::Io`],
//! [`DownloadError::Stream`]) end the whole fetch.

use std::path::PathBuf;

use thiserror::Error;

use crate::discovery::DiscoveryError;

/// Errors that can occur while fetching an archive.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Resolving the source list failed.
    #[error("resolving sources for {cid}: {source}")]
    Discovery {
        /// Content identifier being fetched.
        cid: String,
        /// The underlying discovery error.
        #[source]
        source: DiscoveryError,
    },

    /// The content identifier is unusable as a file name or URL segment.
    #[error("invalid content identifier {cid:?}")]
    InvalidCid {
        /// The rejected identifier.
        cid: String,
    },

    /// The scheduler knows no source for the archive.
    #[error("CAR file {cid} not found")]
    NotFound {
        /// Content identifier being fetched.
        cid: String,
    },

    /// Every candidate source failed before a response was accepted.
    #[error("all {attempts} source(s) failed for CAR file {cid}")]
    AllSourcesFailed {
        /// Content identifier being fetched.
        cid: String,
        /// Number of sources tried.
        attempts: usize,
    },

    /// The source address does not form a valid URL.
    #[error("invalid source URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before a response arrived.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response from a source.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body broke off mid-transfer.
    #[error("transfer from {url} interrupted: {source}")]
    Stream {
        /// The URL being streamed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// File system error while writing the archive.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("cannot build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates a discovery error.
    pub fn discovery(cid: impl Into<String>, source: DiscoveryError) -> Self {
        Self::Discovery {
            cid: cid.into(),
            source,
        }
    }

    /// Creates an invalid-cid error.
    pub fn invalid_cid(cid: impl Into<String>) -> Self {
        Self::InvalidCid { cid: cid.into() }
    }

    /// Creates a not-found error.
    pub fn not_found(cid: impl Into<String>) -> Self {
        Self::NotFound { cid: cid.into() }
    }

    /// Creates an exhausted-sources error.
    pub fn all_sources_failed(cid: impl Into<String>, attempts: usize) -> Self {
        Self::AllSourcesFailed {
            cid: cid.into(),
            attempts,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a mid-transfer stream error.
    pub fn stream(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Stream {
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
