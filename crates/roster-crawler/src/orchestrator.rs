//! Crawl orchestrator.
//!
//! This module provides the `CrawlOrchestrator` which runs one crawl from
//! seed file to output file: it reads the seeds, drives the task queue over
//! listing and detail pages, and exports the collected records once every
//! task has settled.

use crate::aggregator::Aggregator;
use crate::error::Result;
use crate::queue::{QueueConfig, TaskFailure, TaskQueue};
use crate::seeds::read_seeds;
use crate::task::TaskRunner;
use roster_browser::PageSource;
use roster_core::{AppConfig, Task, Timestamp};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Summary of a finished crawl.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Listing URLs read from the seed file
    pub seeds: usize,
    /// Task invocations that succeeded
    pub completed: usize,
    /// Task invocations that failed
    pub failed: usize,
    /// Failed invocations that were re-queued
    pub retried: usize,
    /// Records written to the output file
    pub records: usize,
    /// Where the records were written
    pub output_path: PathBuf,
    /// Every failed invocation, in the order it was reported
    pub failures: Vec<TaskFailure<Task>>,
    /// When the crawl started
    pub started_at: Timestamp,
    /// When the output was written
    pub finished_at: Timestamp,
}

/// Runs a whole crawl against a page source.
pub struct CrawlOrchestrator {
    /// Validated crawl settings
    config: AppConfig,
    /// Where pages come from
    pages: Arc<dyn PageSource>,
}

impl CrawlOrchestrator {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(config: AppConfig, pages: Arc<dyn PageSource>) -> Self {
        Self { config, pages }
    }

    /// The settings this orchestrator crawls with.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Crawl every seed, then export the records.
    ///
    /// Per-task failures do not fail the crawl. The run fails, and writes no
    /// output, if the configuration is invalid, the seed file cannot be read,
    /// the retry budget runs out, or the output cannot be written.
    pub async fn run(&self) -> Result<CrawlReport> {
        self.config.validate()?;
        let started_at = Timestamp::now();
        let crawl = &self.config.crawl;

        let seeds = read_seeds(&crawl.input_path)?;
        info!(
            "Starting crawl of {} listing pages from {}",
            seeds.len(),
            crawl.input_path.display()
        );

        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(
            TaskQueue::new(QueueConfig {
                task_timeout: crawl.task_timeout(),
                retry_limit: crawl.retry_limit,
                retry_failed: crawl.retry_failed_tasks,
            })
            .with_failure_channel(failure_tx),
        );

        let seed_count = seeds.len();
        for seed in seeds {
            queue.enqueue(seed)?;
        }

        let aggregator = Arc::new(Aggregator::new());
        let runner = TaskRunner::new(
            &self.config,
            Arc::clone(&self.pages),
            Arc::clone(&aggregator),
            Arc::clone(&queue),
        );

        let outcome = queue
            .run(|task| runner.execute(task), crawl.max_concurrency)
            .await;
        queue.close().await;
        let stats = outcome?;

        let mut failures = Vec::new();
        while let Ok(failure) = failure_rx.try_recv() {
            failures.push(failure);
        }
        if !failures.is_empty() {
            warn!("{} task invocations failed during the crawl", failures.len());
        }

        let records = aggregator.export(&crawl.output_path)?;
        let finished_at = Timestamp::now();

        info!(
            "Crawl finished in {:?}: {} tasks completed, {} failed, {} records",
            finished_at.duration_since(&started_at),
            stats.completed,
            stats.failed,
            records
        );

        Ok(CrawlReport {
            seeds: seed_count,
            completed: stats.completed,
            failed: stats.failed,
            retried: stats.retried,
            records,
            output_path: crawl.output_path.clone(),
            failures,
            started_at,
            finished_at,
        })
    }
}
