use roster_browser::BrowserError;
use roster_core::{ConfigError, RosterError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed to new tasks")]
    Closed,

    #[error("retry budget of {limit} attempts exhausted, crawl aborted")]
    RetryBudgetExhausted { limit: u32 },
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("timed out during {stage} of {url} after {timeout:?}")]
    TaskTimeout {
        url: String,
        stage: &'static str,
        timeout: Duration,
    },

    #[error("required element {selector} never appeared on {url} within {timeout:?}")]
    MissingElement {
        url: String,
        selector: String,
        timeout: Duration,
    },

    #[error("failed to read seed file {}: {source}", .path.display())]
    SeedFile {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write output file {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("records were already exported")]
    AlreadyExported,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid task: {0}")]
    InvalidTask(#[from] RosterError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
