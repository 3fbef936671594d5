//! Integration tests for the full backup pipeline.
//!
//! A single wiremock server plays storage API, scheduler and source node.
//! Jobs are polled, dispatched through the worker pool, stored under a temp
//! root and reported back.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use carfile_backup::dedup::InFlightRegistry;
use carfile_backup::discovery::{Scheduler, SchedulerClient, SchedulerDirectory};
use carfile_backup::download::{ArchiveFetcher, SourceClient, TransportOptions};
use carfile_backup::engine::{BackupProcessor, DispatchStats, WorkerPool};
use carfile_backup::poller::{BACKUP_ASSETS_PATH, HttpJobSource, Poller};
use carfile_backup::report::{BACKUP_RESULT_PATH, HttpResultReporter};
use carfile_backup::storage::DirectoryAllocator;
use carfile_backup::{ERROR_EVENT_ID, Job};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

const GIB: i64 = 1 << 30;
const AREA: &str = "area-1";

fn asset(cid: &str, total_size: i64, end_time: &str) -> Value {
    json!({
        "cid": cid,
        "total_size": total_size,
        "end_time": end_time,
        "event": 1,
        "path": "",
        "user_id": "u-1"
    })
}

async fn mount_job_list(server: &MockServer, assets: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(BACKUP_ASSETS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"list": assets, "total": 0}
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_scheduler(server: &MockServer, sources: Value) {
    Mock::given(method("POST"))
        .and(path("/rpc/v0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"SourceList": sources}
        })))
        .mount(server)
        .await;
}

async fn mount_source_node(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/ipfs/[a-z0-9]+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"car-bytes".to_vec())
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn mount_result_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(BACKUP_RESULT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Polls once and runs the pool until every polled job is processed.
async fn run_one_poll(
    server: &MockServer,
    allocator: Arc<DirectoryAllocator>,
    concurrency: usize,
) -> DispatchStats {
    let scheduler = Scheduler::new(
        AREA,
        SchedulerClient::new(format!("{}/rpc/v0", server.uri()), "sched-token").unwrap(),
    );
    let directory = SchedulerDirectory::new(vec![scheduler], AREA).unwrap();
    let client = SourceClient::new(&TransportOptions::default()).unwrap();
    let fetcher = ArchiveFetcher::new(Arc::new(directory), client);
    let reporter = HttpResultReporter::new(&server.uri(), "api-token").unwrap();

    let processor = BackupProcessor::new(
        Arc::new(InFlightRegistry::new(Duration::from_millis(50))),
        allocator,
        fetcher,
        Arc::new(reporter),
    );
    let (pool, queue) = WorkerPool::new(concurrency, 1, Arc::new(processor)).unwrap();
    let dispatcher = tokio::spawn(pool.run());

    let source = HttpJobSource::new(&server.uri(), "api-token").unwrap();
    let poller = Poller::new(Arc::new(source), queue, Duration::from_secs(60));
    poller.poll_once().await.unwrap();
    drop(poller);

    dispatcher.await.unwrap().unwrap()
}

async fn reported_jobs(server: &MockServer) -> Vec<Job> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|req| req.method.as_str() == "POST" && req.url.path() == BACKUP_RESULT_PATH)
        .flat_map(|req| serde_json::from_slice::<Vec<Job>>(&req.body).unwrap())
        .collect()
}

fn dir_string(root: &Path, name: &str) -> String {
    root.join(name).to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_two_jobs_same_day_share_first_directory() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    mount_job_list(
        &server,
        vec![
            asset("bafyone", GIB, "2024-01-01T10:00:00Z"),
            asset("bafytwo", 2 * GIB, "2024-01-01T11:00:00Z"),
        ],
    )
    .await;
    mount_scheduler(&server, json!([{"Address": server.uri(), "Tk": "node-tk"}])).await;
    mount_source_node(&server, Duration::ZERO).await;
    mount_result_endpoint(&server).await;

    let allocator = Arc::new(DirectoryAllocator::new(root.path(), 18 << 30));
    let stats = run_one_poll(&server, Arc::clone(&allocator), 2).await;

    assert_eq!(stats.completed(), 2);
    assert_eq!(stats.failed(), 0);

    let dir = root.path().join("20240101a");
    assert!(dir.join("bafyone.car").exists());
    assert!(dir.join("bafytwo.car").exists());
    assert_eq!(allocator.cached_size(&dir).await, Some(3 << 30));

    let reports = reported_jobs(&server).await;
    assert_eq!(reports.len(), 2);
    for job in &reports {
        assert_eq!(job.path, dir_string(root.path(), "20240101a"));
        assert_eq!(job.event, 1);
        assert_eq!(job.extra.get("user_id"), Some(&json!("u-1")));
    }
}

#[tokio::test]
async fn test_full_directory_rolls_over_to_next_suffix() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    mount_job_list(
        &server,
        vec![
            asset("bafya", 60, "2024-03-05T01:00:00Z"),
            asset("bafyb", 60, "2024-03-05T02:00:00Z"),
            asset("bafyc", 60, "2024-03-05T03:00:00Z"),
        ],
    )
    .await;
    mount_scheduler(&server, json!([{"Address": server.uri(), "Tk": ""}])).await;
    mount_source_node(&server, Duration::ZERO).await;
    mount_result_endpoint(&server).await;

    let allocator = Arc::new(DirectoryAllocator::new(root.path(), 100));
    let stats = run_one_poll(&server, Arc::clone(&allocator), 1).await;

    assert_eq!(stats.completed(), 3);
    let paths: Vec<String> = reported_jobs(&server)
        .await
        .into_iter()
        .map(|job| job.path)
        .collect();
    assert_eq!(
        paths,
        [
            dir_string(root.path(), "20240305a"),
            dir_string(root.path(), "20240305a"),
            dir_string(root.path(), "20240305b"),
        ]
    );
    assert_eq!(
        allocator.cached_size(&root.path().join("20240305a")).await,
        Some(120)
    );
}

#[tokio::test]
async fn test_duplicate_burst_downloads_once() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    let burst = (0..5)
        .map(|_| asset("bafydup", 10, "2024-01-01T00:00:00Z"))
        .collect();
    mount_job_list(&server, burst).await;
    mount_scheduler(&server, json!([{"Address": server.uri(), "Tk": ""}])).await;
    mount_source_node(&server, Duration::from_millis(300)).await;
    mount_result_endpoint(&server).await;

    let allocator = Arc::new(DirectoryAllocator::new(root.path(), 18 << 30));
    let stats = run_one_poll(&server, allocator, 4).await;

    assert_eq!(stats.completed(), 1);
    assert_eq!(stats.skipped(), 4);
    assert_eq!(reported_jobs(&server).await.len(), 1);
}

#[tokio::test]
async fn test_job_without_sources_is_reported_failed() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let root = TempDir::new().unwrap();
    mount_job_list(&server, vec![asset("bafymissing", 10, "2024-01-01T00:00:00Z")]).await;
    mount_scheduler(&server, json!([])).await;
    mount_result_endpoint(&server).await;

    let allocator = Arc::new(DirectoryAllocator::new(root.path(), 18 << 30));
    let stats = run_one_poll(&server, Arc::clone(&allocator), 2).await;

    assert_eq!(stats.failed(), 1);
    let reports = reported_jobs(&server).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].event, ERROR_EVENT_ID);
    assert!(reports[0].path.is_empty());
    assert!(!root.path().join("20240101a").join("bafymissing.car").exists());
    assert_eq!(
        allocator.cached_size(&root.path().join("20240101a")).await,
        Some(0)
    );
}
