//! Bounded worker pool with a FIFO dispatcher.
//!
//! Producers hand jobs to a [`JobQueue`], a bounded channel that blocks them
//! once full. [`WorkerPool::run`] drains the channel in enqueue order and
//! starts each job only after acquiring one of N semaphore permits, so at
//! most N jobs are ever in progress. When every [`JobQueue`] handle is
//! dropped the dispatcher stops admitting work, waits for in-flight jobs and
//! returns the run's [`DispatchStats`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::error::EngineError;
use crate::job::Job;

/// Minimum allowed concurrency value.
pub(crate) const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub(crate) const MAX_CONCURRENCY: usize = 100;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default job queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Terminal outcome of one dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The archive was stored.
    Completed,
    /// The backup attempt failed and was reported as such.
    Failed,
    /// The job duplicated one already in flight and was dropped.
    Skipped,
}

/// Work performed for each dispatched job while it holds a worker slot.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Processes one job to completion.
    async fn handle(&self, job: Job) -> JobOutcome;
}

/// Counters for one dispatcher run.
///
/// Updated from concurrent worker tasks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl DispatchStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored archives.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of failed backups.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of duplicates dropped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Returns the total number of jobs dispatched.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed() + self.skipped()
    }

    fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed => &self.completed,
            JobOutcome::Failed => &self.failed,
            JobOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            failed: AtomicUsize::new(self.failed()),
            skipped: AtomicUsize::new(self.skipped()),
        }
    }
}

/// Producer handle for the job queue.
///
/// Cheap to clone. The dispatcher shuts down once every handle is dropped.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueues a job, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::QueueClosed`] if the dispatcher has stopped.
    pub async fn submit(&self, job: Job) -> Result<(), EngineError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Returns true once the dispatcher has stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Dispatcher plus N worker slots.
pub struct WorkerPool {
    handler: Arc<dyn JobHandler>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    receiver: mpsc::Receiver<Job>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.concurrency)
            .field("available", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool of `concurrency` workers fed by a queue of
    /// `queue_capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside 1..=100 and
    /// [`EngineError::InvalidQueueCapacity`] for a zero capacity.
    pub fn new(
        concurrency: usize,
        queue_capacity: usize,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(Self, JobQueue), EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        if queue_capacity == 0 {
            return Err(EngineError::InvalidQueueCapacity {
                value: queue_capacity,
            });
        }

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let pool = Self {
            handler,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            receiver,
        };
        Ok((pool, JobQueue { sender }))
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Dispatches jobs until the queue closes, then drains in-flight work.
    ///
    /// Individual job failures are counted, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the slot semaphore is
    /// closed.
    #[instrument(skip(self), fields(concurrency = self.concurrency))]
    pub async fn run(mut self) -> Result<DispatchStats, EngineError> {
        let stats = Arc::new(DispatchStats::new());
        let mut tasks = JoinSet::new();

        info!("dispatcher started");

        while let Some(job) = self.receiver.recv().await {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "worker task panicked");
                }
            }

            debug!(
                cid = %job.cid,
                available = self.semaphore.available_permits(),
                "dispatching job"
            );

            // Blocks while all N slots are busy; the queue fills up behind us.
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let handler = Arc::clone(&self.handler);
            let stats = Arc::clone(&stats);
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = handler.handle(job).await;
                stats.record(outcome);
            });
        }

        debug!(in_flight = tasks.len(), "job queue closed, draining workers");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task panicked");
            }
        }

        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            skipped = stats.skipped(),
            "dispatcher stopped"
        );

        Ok(Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;
    use tokio::sync::Mutex;

    use super::*;

    fn job(cid: &str) -> Job {
        let end_time = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        Job::new(cid, 1, end_time)
    }

    /// Tracks how many handlers run at once.
    #[derive(Default)]
    struct CountingHandler {
        running: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, job: Job) -> JobOutcome {
            self.seen.lock().await.push(job.cid.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if job.cid.ends_with('!') {
                JobOutcome::Failed
            } else {
                JobOutcome::Completed
            }
        }
    }

    #[test]
    fn test_pool_new_invalid_concurrency_zero() {
        let handler = Arc::new(CountingHandler::default());
        let result = WorkerPool::new(0, 1, handler);
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_pool_new_invalid_concurrency_too_high() {
        let handler = Arc::new(CountingHandler::default());
        let result = WorkerPool::new(101, 1, handler);
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_pool_new_rejects_zero_queue_capacity() {
        let handler = Arc::new(CountingHandler::default());
        let result = WorkerPool::new(4, 0, handler);
        assert!(matches!(
            result,
            Err(EngineError::InvalidQueueCapacity { value: 0 })
        ));
    }

    #[test]
    fn test_dispatch_stats_record() {
        let stats = DispatchStats::new();
        stats.record(JobOutcome::Completed);
        stats.record(JobOutcome::Completed);
        stats.record(JobOutcome::Failed);
        stats.record(JobOutcome::Skipped);

        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.total(), 4);
    }

    #[tokio::test]
    async fn test_run_never_exceeds_concurrency() {
        let handler = Arc::new(CountingHandler::default());
        let (pool, queue) = WorkerPool::new(3, 1, handler.clone()).unwrap();
        let dispatcher = tokio::spawn(pool.run());

        for i in 0..12 {
            queue.submit(job(&format!("bafy{i}"))).await.unwrap();
        }
        drop(queue);

        let stats = dispatcher.await.unwrap().unwrap();
        assert_eq!(stats.completed(), 12);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 3);
        assert_eq!(handler.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_admits_jobs_in_enqueue_order() {
        let handler = Arc::new(CountingHandler::default());
        let (pool, queue) = WorkerPool::new(1, 1, handler.clone()).unwrap();
        let dispatcher = tokio::spawn(pool.run());

        let cids: Vec<String> = (0..6).map(|i| format!("bafy{i}")).collect();
        for cid in &cids {
            queue.submit(job(cid)).await.unwrap();
        }
        drop(queue);
        dispatcher.await.unwrap().unwrap();

        assert_eq!(*handler.seen.lock().await, cids);
    }

    #[tokio::test]
    async fn test_run_drains_in_flight_jobs_and_counts_outcomes() {
        let handler = Arc::new(CountingHandler::default());
        let (pool, queue) = WorkerPool::new(4, 2, handler.clone()).unwrap();
        let dispatcher = tokio::spawn(pool.run());

        queue.submit(job("bafyok")).await.unwrap();
        queue.submit(job("bafybad!")).await.unwrap();
        drop(queue);

        let stats = dispatcher.await.unwrap().unwrap();
        assert_eq!(stats.completed(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(handler.seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_blocks_when_queue_full() {
        let handler = Arc::new(CountingHandler::default());
        let (pool, queue) = WorkerPool::new(1, 1, handler).unwrap();

        // Dispatcher not running: the first job fills the single slot.
        queue.submit(job("bafy0")).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), queue.submit(job("bafy1")));
        assert!(second.await.is_err(), "submit should block on a full queue");

        drop(pool);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.submit(job("bafy2")).await,
            Err(EngineError::QueueClosed)
        ));
    }
}
