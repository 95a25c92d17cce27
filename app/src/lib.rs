//! Roster - command-line entry point for the directory crawler.

pub mod cli;

pub use cli::Cli;

use anyhow::Context;
use roster_browser::{BrowserEngine, PageSource};
use roster_core::AppConfig;
use roster_crawler::{CrawlOrchestrator, CrawlReport};
use std::sync::Arc;
use tracing::{info, warn};

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,roster=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Resolve the effective configuration: file, then environment, then flags.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load_with_env(cli.config.as_deref())
        .context("failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Crawl with an already-open page source.
pub async fn crawl_with(config: AppConfig, pages: Arc<dyn PageSource>) -> anyhow::Result<CrawlReport> {
    let output = config.crawl.output_path.clone();
    let report = CrawlOrchestrator::new(config, pages)
        .run()
        .await
        .with_context(|| format!("crawl into {} failed", output.display()))?;

    for failure in &report.failures {
        warn!("Failed {}: {}", failure.task, failure.message);
    }
    Ok(report)
}

/// Launch Chromium, crawl, and shut the browser down.
pub async fn run(cli: Cli) -> anyhow::Result<CrawlReport> {
    info!("Starting Roster v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let engine = Arc::new(
        BrowserEngine::launch(&config.browser, config.crawl.request_timeout())
            .await
            .context("failed to launch browser")?,
    );

    let outcome = crawl_with(config, Arc::clone(&engine) as Arc<dyn PageSource>).await;

    if let Err(e) = engine.close().await {
        warn!("Browser shutdown failed: {}", e);
    }

    let report = outcome?;
    info!(
        "Exported {} records to {}",
        report.records,
        report.output_path.display()
    );
    Ok(report)
}
