//! Multi-source archive retrieval.
//!
//! Candidates are tried strictly in the order discovery returns them, one at
//! a time. A candidate that fails to connect or answers with an error status
//! is skipped; the first accepted response is streamed to disk and decides
//! the outcome of the whole fetch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use super::client::SourceClient;
use super::error::DownloadError;
use crate::discovery::SourceDiscovery;
use crate::storage::archive_file_name;

/// A successfully stored archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    /// Path of the written `<cid>.car` file.
    pub path: PathBuf,
    /// Address of the source that served the archive.
    pub source: String,
    /// Number of sources tried, the winning one included.
    pub attempts: usize,
    /// Bytes actually written to disk.
    pub bytes_written: u64,
}

/// Checks that `cid` is safe to use as a file stem and URL path segment.
///
/// CIDs are multibase strings (base32, base36, base58btc); anything outside
/// ASCII alphanumerics could escape the bucket directory.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidCid`] for empty or non-alphanumeric input.
pub fn validate_cid(cid: &str) -> Result<(), DownloadError> {
    if cid.is_empty() || !cid.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DownloadError::invalid_cid(cid));
    }
    Ok(())
}

/// Downloads archives from whichever discovered source answers first.
///
/// Directory size bookkeeping is left to the caller.
pub struct ArchiveFetcher {
    discovery: Arc<dyn SourceDiscovery>,
    client: SourceClient,
}

impl std::fmt::Debug for ArchiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveFetcher")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl ArchiveFetcher {
    /// Creates a fetcher over an injected discovery capability.
    #[must_use]
    pub fn new(discovery: Arc<dyn SourceDiscovery>, client: SourceClient) -> Self {
        Self { discovery, client }
    }

    /// Fetches `cid` into `dir/<cid>.car`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidCid`] if `cid` could escape `dir`
    /// - [`DownloadError::Discovery`] if sources cannot be resolved
    /// - [`DownloadError::NotFound`] if no source is known
    /// - [`DownloadError::Io`] / [`DownloadError::Stream`] if the accepted
    ///   transfer fails; remaining sources are not tried
    /// - [`DownloadError::AllSourcesFailed`] if no source answered
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn fetch(
        &self,
        cid: &str,
        declared_size: u64,
        dir: &Path,
    ) -> Result<FetchedArchive, DownloadError> {
        validate_cid(cid)?;

        let sources = self
            .discovery
            .source_list(cid)
            .await
            .map_err(|e| DownloadError::discovery(cid, e))?;

        if sources.is_empty() {
            return Err(DownloadError::not_found(cid));
        }

        let start = Instant::now();
        let file_path = dir.join(archive_file_name(cid));

        for (index, source) in sources.iter().enumerate() {
            let attempt = index + 1;
            let response = match self.client.open(source, cid).await {
                Ok(response) => response,
                Err(error) => {
                    warn!(
                        address = %source.address,
                        attempt,
                        remaining = sources.len() - attempt,
                        error = %error,
                        "source failed, trying next"
                    );
                    continue;
                }
            };

            let bytes_written = self.client.write_to_file(response, &file_path).await?;

            info!(
                path = %file_path.display(),
                address = %source.address,
                declared_size,
                bytes_written,
                attempt,
                elapsed_ms = start.elapsed().as_millis(),
                "downloaded CAR file"
            );

            return Ok(FetchedArchive {
                path: file_path,
                source: source.address.clone(),
                attempts: attempt,
                bytes_written,
            });
        }

        Err(DownloadError::all_sources_failed(cid, sources.len()))
    }
}
