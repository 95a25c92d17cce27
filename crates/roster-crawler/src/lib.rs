//! Roster Crawler - Directory crawl orchestration.
//!
//! This crate turns a list of listing-page URLs into a CSV of people. Listing
//! pages yield detail links; detail pages yield one record each. Pages are
//! driven through the `roster-browser` page capability.
//!
//! # Features
//!
//! - Bounded worker pool over a shared task queue that tasks may extend
//! - Per-task timeout, isolated failures and a process-wide retry budget
//! - Per-page hardening before every navigation
//! - Field extraction with merge and scoping options
//! - Ordered record collection with one-shot CSV export
//!
//! # Example
//!
//! ```rust,ignore
//! use roster_browser::BrowserEngine;
//! use roster_core::AppConfig;
//! use roster_crawler::CrawlOrchestrator;
//! use std::sync::Arc;
//!
//! let config = AppConfig::load()?;
//! let engine = Arc::new(BrowserEngine::launch(&config.browser, config.crawl.request_timeout()).await?);
//! let report = CrawlOrchestrator::new(config, engine).run().await?;
//! println!("{} records", report.records);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod aggregator;
#[allow(missing_docs)]
pub mod error;
pub mod extractor;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod queue;
pub mod seeds;
#[allow(missing_docs)]
pub mod task;

// Re-export commonly used types
pub use aggregator::Aggregator;
pub use error::{CrawlError, QueueError, Result};
pub use extractor::{extract, extract_all, ExtractOptions};
pub use orchestrator::{CrawlOrchestrator, CrawlReport};
pub use queue::{FailureKind, QueueConfig, RunStats, TaskFailure, TaskQueue};
pub use seeds::{read_seeds, read_seeds_from};
pub use task::{split_full_name, TaskRunner};
