//! Result reporting to the storage API.
//!
//! Every job that a worker took ownership of is reported exactly once,
//! whether its backup succeeded or failed. Report failures are logged by the
//! caller and never retried.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::http_client::build_api_client;
use crate::job::Job;

/// Path of the backup result endpoint, relative to the storage API base URL.
pub const BACKUP_RESULT_PATH: &str = "/v1/storage/backup_result";

/// Errors that can occur while reporting results.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Transport failure.
    #[error("network error reporting to {url}: {source}")]
    Network {
        /// Result endpoint.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with something other than 200.
    #[error("result endpoint {url} returned HTTP {status}")]
    HttpStatus {
        /// Result endpoint.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// Sink for terminal job outcomes.
#[async_trait]
pub trait ResultReporter: Send + Sync {
    /// Reports a batch of finished jobs.
    async fn report(&self, jobs: &[Job]) -> Result<(), ReportError>;
}

/// Reports results with a bearer-authenticated POST of the job list.
#[derive(Debug, Clone)]
pub struct HttpResultReporter {
    client: Client,
    url: String,
    token: String,
}

impl HttpResultReporter {
    /// Creates a reporter for the storage API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ReportError> {
        let url = format!("{}{BACKUP_RESULT_PATH}", base_url.trim_end_matches('/'));
        let client = build_api_client().map_err(|source| ReportError::Network {
            url: url.clone(),
            source,
        })?;
        Ok(Self {
            client,
            url,
            token: token.into(),
        })
    }
}

#[async_trait]
impl ResultReporter for HttpResultReporter {
    #[instrument(skip(self, jobs), fields(count = jobs.len()))]
    async fn report(&self, jobs: &[Job]) -> Result<(), ReportError> {
        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .json(jobs)
            .send()
            .await
            .map_err(|source| ReportError::Network {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ReportError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        debug!("backup result reported");
        Ok(())
    }
}
