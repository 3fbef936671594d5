//! HTTP transport to source nodes.
//!
//! [`SourceClient`] opens one candidate source and streams an accepted
//! response body into a local file. Source nodes on the internal network
//! present self-signed certificates; whether to accept them is an explicit
//! [`TransportOptions::accept_invalid_certs`] decision.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DOWNLOAD_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::discovery::SourceEndpoint;
use crate::user_agent;

/// Transport settings for source node connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Skip TLS certificate verification for source nodes.
    pub accept_invalid_certs: bool,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-transfer timeout, body included.
    pub timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
        }
    }
}

/// HTTP client for source nodes, created once and shared across workers.
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    /// Builds a client with the given transport options.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be
    /// initialised.
    #[instrument(level = "debug")]
    pub fn new(options: &TransportOptions) -> Result<Self, DownloadError> {
        if options.accept_invalid_certs {
            debug!("source certificate verification disabled");
        }
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;
        Ok(Self { client })
    }

    /// Requests `cid` from `source`.
    ///
    /// Returns the response only for a success status.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`], [`DownloadError::Network`],
    /// [`DownloadError::Timeout`] or [`DownloadError::HttpStatus`].
    #[instrument(skip(self, source), fields(address = %source.address))]
    pub async fn open(
        &self,
        source: &SourceEndpoint,
        cid: &str,
    ) -> Result<reqwest::Response, DownloadError> {
        let url = source_url(&source.address, cid)?;
        debug!(url = %url, "requesting archive from source");

        let mut request = self.client.get(url.clone());
        if !source.token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", source.token));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url.as_str())
            } else {
                DownloadError::network(url.as_str(), e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }

    /// Streams an accepted response into `file_path`, returning bytes written.
    ///
    /// The file is created or truncated. A partially written file is removed
    /// when the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] for local write failures and
    /// [`DownloadError::Stream`] when the body breaks off.
    pub async fn write_to_file(
        &self,
        response: reqwest::Response,
        file_path: &Path,
    ) -> Result<u64, DownloadError> {
        let url = response.url().to_string();
        let mut file = File::create(file_path)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        let result = stream_to_file(&mut file, response, &url, file_path).await;
        if result.is_err() {
            debug!(path = %file_path.display(), "cleaning up partial file after error");
            if let Err(e) = tokio::fs::remove_file(file_path).await {
                warn!(path = %file_path.display(), error = %e, "failed to remove partial file");
            }
        }
        result
    }
}

/// Builds the archive URL for a source address.
///
/// Addresses without a scheme are served over HTTPS.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] if the result does not parse.
pub fn source_url(address: &str, cid: &str) -> Result<Url, DownloadError> {
    let scheme = if address.starts_with("http") { "" } else { "https://" };
    let raw = format!("{scheme}{}/ipfs/{cid}", address.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|_| DownloadError::invalid_url(raw.clone()))?;
    url.query_pairs_mut().append_pair("format", "car");
    Ok(url)
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::stream(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
