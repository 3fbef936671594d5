//! CLI entry point for the carfile backup agent.

use std::sync::Arc;

use anyhow::{Context, Result};
use carfile_backup::config::{AgentConfig, config_path};
use carfile_backup::dedup::InFlightRegistry;
use carfile_backup::discovery::{Scheduler, SchedulerClient, SchedulerDirectory};
use carfile_backup::download::{ArchiveFetcher, SourceClient};
use carfile_backup::engine::{BackupProcessor, WorkerPool};
use carfile_backup::poller::{HttpJobSource, Poller};
use carfile_backup::report::HttpResultReporter;
use carfile_backup::storage::DirectoryAllocator;
use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(&args)?;
    info!(
        area_id = %config.area_id,
        output_root = %config.output_root.display(),
        concurrency = config.concurrency,
        "carfile backup agent starting"
    );

    std::fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "Failed to create output root '{}'",
            config.output_root.display()
        )
    })?;

    let directory = build_scheduler_directory(&config)?;
    let source_client = SourceClient::new(&config.transport_options())
        .context("Failed to build source node client")?;
    let fetcher = ArchiveFetcher::new(Arc::new(directory), source_client);
    let reporter = HttpResultReporter::new(&config.storage_api, config.token.clone())
        .context("Failed to build result reporter")?;
    let job_source = HttpJobSource::new(&config.storage_api, config.token.clone())
        .context("Failed to build job source")?;

    let processor = BackupProcessor::new(
        Arc::new(InFlightRegistry::new(config.settle_delay())),
        Arc::new(DirectoryAllocator::new(
            config.output_root.clone(),
            config.dir_size_threshold,
        )),
        fetcher,
        Arc::new(reporter),
    );

    let (pool, queue) =
        WorkerPool::new(config.concurrency, config.queue_capacity, Arc::new(processor))?;
    let dispatcher = tokio::spawn(pool.run());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight backups");
            let _ = shutdown_tx.send(true);
        }
    });

    Poller::new(Arc::new(job_source), queue, config.poll_interval())
        .run(shutdown_rx)
        .await;

    let stats = dispatcher.await.context("Dispatcher task panicked")??;
    info!(
        completed = stats.completed(),
        failed = stats.failed(),
        skipped = stats.skipped(),
        "carfile backup agent stopped"
    );

    Ok(())
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let path = config_path(args.config.as_deref())?;
    let mut config = if path.exists() {
        AgentConfig::load(&path)?
    } else if args.config.is_some() {
        anyhow::bail!("Config file '{}' does not exist", path.display());
    } else {
        warn!(path = %path.display(), "no config file found, using defaults");
        AgentConfig::default()
    };

    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_scheduler_directory(config: &AgentConfig) -> Result<SchedulerDirectory> {
    let mut schedulers = Vec::with_capacity(config.schedulers.len());
    for entry in &config.schedulers {
        let client = SchedulerClient::new(entry.url.clone(), entry.access_token.clone())
            .with_context(|| format!("Failed to build client for scheduler '{}'", entry.url))?;
        schedulers.push(Scheduler::new(entry.area_id.clone(), client));
    }
    SchedulerDirectory::new(schedulers, config.area_id.clone())
        .context("No scheduler available at startup")
}
