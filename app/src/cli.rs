use clap::Parser;
use roster_core::AppConfig;
use std::path::PathBuf;

/// Command-line arguments. Flags given here win over the config file and
/// environment.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "roster",
    version,
    about = "Crawl directory listing pages and export the people on them to CSV"
)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seed file; the first column of each row is a listing URL
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output CSV file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Maximum pages processed at once
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Navigation and element wait timeout in milliseconds; raises the task
    /// timeout to at least twice this value
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Hard bound on one task in milliseconds
    #[arg(long, value_name = "MS")]
    pub task_timeout_ms: Option<u64>,

    /// Retries shared by the whole crawl
    #[arg(long, value_name = "N")]
    pub retry_limit: Option<u32>,

    /// Cookie header sent with every request
    #[arg(long, value_name = "COOKIE")]
    pub cookie: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

impl Cli {
    /// Fold the flags that were given into `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.crawl.input_path.clone_from(input);
        }
        if let Some(output) = &self.output {
            config.crawl.output_path.clone_from(output);
        }
        if let Some(max) = self.max_concurrency {
            config.crawl.max_concurrency = max;
        }
        if let Some(timeout) = self.timeout_ms {
            config.crawl.set_navigation_timeout_ms(timeout);
        }
        if let Some(timeout) = self.task_timeout_ms {
            config.crawl.task_timeout_ms = timeout;
        }
        if let Some(limit) = self.retry_limit {
            config.crawl.retry_limit = limit;
        }
        if let Some(cookie) = &self.cookie {
            config.browser.cookie_header.clone_from(cookie);
        }
        if self.headful {
            config.browser.headless = false;
        }
    }
}
