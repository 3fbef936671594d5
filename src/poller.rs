//! Periodic job polling.
//!
//! The [`Poller`] asks a [`JobSource`] for pending backups on a fixed
//! interval and pushes them one by one into the [`JobQueue`]. Submission
//! blocks while the queue is full, so a slow pool naturally throttles
//! polling: the next poll never starts before the previous batch is fully
//! enqueued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{EngineError, JobQueue};
use crate::http_client::build_api_client;
use crate::job::{Job, JobEnvelope, JobPage};

/// Path of the pending-jobs endpoint, relative to the storage API base URL.
pub const BACKUP_ASSETS_PATH: &str = "/v1/storage/backup_assets";

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that can occur while polling for jobs.
#[derive(Debug, Error)]
pub enum PollError {
    /// Transport failure.
    #[error("network error polling {url}: {source}")]
    Network {
        /// Job endpoint.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with something other than 200.
    #[error("job endpoint {url} returned HTTP {status}")]
    HttpStatus {
        /// Job endpoint.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The body is not a job envelope.
    #[error("invalid job list from {url}: {source}")]
    Decode {
        /// Job endpoint.
        url: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// The envelope carries a non-zero status code.
    #[error("job endpoint {url} returned code {code}")]
    Upstream {
        /// Job endpoint.
        url: String,
        /// Upstream status code.
        code: i64,
    },

    /// The dispatcher stopped accepting jobs.
    #[error(transparent)]
    Queue(#[from] EngineError),
}

/// Provider of pending backup jobs.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetches the current batch of pending jobs.
    async fn fetch_jobs(&self) -> Result<Vec<Job>, PollError>;
}

/// Lists pending jobs from the storage API.
#[derive(Debug, Clone)]
pub struct HttpJobSource {
    client: Client,
    url: String,
    token: String,
}

impl HttpJobSource {
    /// Creates a job source for the storage API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, PollError> {
        let url = format!("{}{BACKUP_ASSETS_PATH}", base_url.trim_end_matches('/'));
        let client = build_api_client().map_err(|source| PollError::Network {
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
impl JobSource for HttpJobSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_jobs(&self) -> Result<Vec<Job>, PollError> {
        let response = self
            .client
            .get(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(|source| PollError::Network {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PollError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let envelope: JobEnvelope = response.json().await.map_err(|source| PollError::Decode {
            url: self.url.clone(),
            source,
        })?;

        if envelope.code != 0 {
            return Err(PollError::Upstream {
                url: self.url.clone(),
                code: envelope.code,
            });
        }

        Ok(envelope.data.map(JobPage::into_jobs).unwrap_or_default())
    }
}

/// Interval-driven producer feeding the job queue.
pub struct Poller {
    source: Arc<dyn JobSource>,
    queue: JobQueue,
    interval: Duration,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Creates a poller that feeds `queue` from `source` every `interval`.
    #[must_use]
    pub fn new(source: Arc<dyn JobSource>, queue: JobQueue, interval: Duration) -> Self {
        Self {
            source,
            queue,
            interval,
        }
    }

    /// Fetches one batch and enqueues it in order, returning the batch size.
    ///
    /// # Errors
    ///
    /// Returns the job source's error, or [`PollError::Queue`] once the
    /// dispatcher is gone.
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        let jobs = self.source.fetch_jobs().await?;
        let count = jobs.len();
        info!(count, "fetched backup jobs");

        for job in jobs {
            debug!(cid = %job.cid, "enqueueing job");
            self.queue.submit(job).await?;
        }
        Ok(count)
    }

    /// Polls until `shutdown` changes or its sender is dropped.
    ///
    /// The first poll runs immediately. A poll still submitting when the
    /// signal arrives is abandoned; its remaining jobs come back on a later
    /// listing. Dropping the poller's queue handle on return lets the
    /// dispatcher drain once no other handles remain.
    #[instrument(skip_all, fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    _ = shutdown.changed() => break,
                    result = self.poll_once() => result,
                };

                match result {
                    Ok(_) => {}
                    Err(PollError::Queue(e)) => {
                        error!(error = %e, "dispatcher gone, stopping poller");
                        break;
                    }
                    Err(e) => warn!(error = %e, "get jobs failed"),
                }
            }
        }

        info!("poller stopped");
    }
}
