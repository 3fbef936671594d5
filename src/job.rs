//! Backup job records exchanged with the storage API.
//!
//! A [`Job`] is created from the job source payload, mutated by the worker
//! that owns it (path on success, event code on failure), and echoed back to
//! the result endpoint exactly once.

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Event code reported upstream for a job whose backup attempt failed.
pub const ERROR_EVENT_ID: i64 = 99;

/// `chrono` format string for bucket keys (calendar day).
pub const BUCKET_KEY_FORMAT: &str = "%Y%m%d";

/// One archive backup task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Content identifier of the archive.
    pub cid: String,
    /// Declared archive size in bytes, as reported by the job source.
    #[serde(default)]
    pub total_size: i64,
    /// Reference timestamp the storage bucket is derived from.
    pub end_time: DateTime<FixedOffset>,
    /// Upstream status/event code.
    #[serde(default)]
    pub event: i64,
    /// Storage directory, populated once the archive is stored.
    #[serde(default)]
    pub path: String,
    /// Upstream fields this agent does not interpret; echoed back verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Creates a job with no upstream extras.
    #[must_use]
    pub fn new(cid: impl Into<String>, total_size: i64, end_time: DateTime<FixedOffset>) -> Self {
        Self {
            cid: cid.into(),
            total_size,
            end_time,
            event: 0,
            path: String::new(),
            extra: Map::new(),
        }
    }

    /// Returns the time-bucket key (`YYYYMMDD` in the timestamp's own offset).
    #[must_use]
    pub fn bucket_key(&self) -> String {
        self.end_time.format(BUCKET_KEY_FORMAT).to_string()
    }

    /// Declared size clamped to zero for negative upstream values.
    #[must_use]
    pub fn declared_size(&self) -> u64 {
        u64::try_from(self.total_size).unwrap_or(0)
    }

    /// Records a successful backup into `dir`.
    pub fn mark_stored(&mut self, dir: &Path) {
        self.path = dir.to_string_lossy().into_owned();
    }

    /// Records a failed backup attempt.
    pub fn mark_failed(&mut self) {
        self.event = ERROR_EVENT_ID;
    }

    /// Returns true when the job carries the failure event code.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.event == ERROR_EVENT_ID
    }
}

/// Response envelope of the job listing endpoint.
#[derive(Debug, Deserialize)]
pub struct JobEnvelope {
    /// Upstream status code; zero means success.
    #[serde(default, alias = "Code")]
    pub code: i64,
    /// Page payload; absent on upstream errors.
    #[serde(default, alias = "Data")]
    pub data: Option<JobPage>,
}

/// Page of pending jobs.
///
/// Records are kept raw so one malformed entry cannot sink the whole batch.
#[derive(Debug, Default, Deserialize)]
pub struct JobPage {
    #[serde(default)]
    pub list: Vec<Value>,
    #[serde(default)]
    pub total: i64,
}

impl JobPage {
    /// Decodes the listed records, skipping and logging those that are not jobs.
    #[must_use]
    pub fn into_jobs(self) -> Vec<Job> {
        self.list
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match serde_json::from_value::<Job>(raw) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed job record");
                    None
                }
            })
            .collect()
    }
}
