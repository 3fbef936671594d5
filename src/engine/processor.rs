//! Per-job backup lifecycle.
//!
//! claim cid -> allocate directory -> fetch archive -> record size ->
//! report -> release claim.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::pool::{JobHandler, JobOutcome};
use crate::dedup::InFlightRegistry;
use crate::download::{ArchiveFetcher, DownloadError, validate_cid};
use crate::job::Job;
use crate::report::ResultReporter;
use crate::storage::{AllocateError, DirectoryAllocator};

/// Why a single backup attempt failed.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// No storage directory could be chosen.
    #[error(transparent)]
    Allocate(#[from] AllocateError),

    /// The archive could not be retrieved.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Backs up one job per call and reports its outcome.
pub struct BackupProcessor {
    registry: Arc<InFlightRegistry>,
    allocator: Arc<DirectoryAllocator>,
    fetcher: ArchiveFetcher,
    reporter: Arc<dyn ResultReporter>,
}

impl std::fmt::Debug for BackupProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupProcessor")
            .field("allocator", &self.allocator)
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

impl BackupProcessor {
    /// Creates a processor over a shared registry, allocator and reporter.
    #[must_use]
    pub fn new(
        registry: Arc<InFlightRegistry>,
        allocator: Arc<DirectoryAllocator>,
        fetcher: ArchiveFetcher,
        reporter: Arc<dyn ResultReporter>,
    ) -> Self {
        Self {
            registry,
            allocator,
            fetcher,
            reporter,
        }
    }

    async fn store(&self, job: &Job) -> Result<PathBuf, ProcessError> {
        validate_cid(&job.cid)?;
        let declared_size = job.declared_size();
        let allocation = self.allocator.allocate(&job.bucket_key()).await?;

        self.fetcher
            .fetch(&job.cid, declared_size, &allocation.dir)
            .await?;

        let size = self
            .allocator
            .record_stored(&allocation.dir, declared_size)
            .await;
        info!(
            dir = %allocation.dir.display(),
            dir_size = size,
            "recorded stored archive"
        );
        Ok(allocation.dir)
    }
}

#[async_trait]
impl JobHandler for BackupProcessor {
    #[instrument(skip(self, job), fields(cid = %job.cid, bucket = %job.bucket_key()))]
    async fn handle(&self, mut job: Job) -> JobOutcome {
        let Some(_claim) = self.registry.try_claim(&job.cid) else {
            info!("cid is already downloading, dropping duplicate");
            return JobOutcome::Skipped;
        };

        let outcome = match self.store(&job).await {
            Ok(dir) => {
                job.mark_stored(&dir);
                JobOutcome::Completed
            }
            Err(e) => {
                error!(error = %e, "backup failed");
                job.mark_failed();
                JobOutcome::Failed
            }
        };

        if let Err(e) = self.reporter.report(std::slice::from_ref(&job)).await {
            warn!(error = %e, "failed to report backup result");
        }

        info!(event = job.event, path = %job.path, "job processed");
        outcome
    }
}
