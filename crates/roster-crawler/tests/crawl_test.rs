use roster_browser::scripted::{ScriptedBrowser, ScriptedDocument};
use roster_core::AppConfig;
use roster_crawler::{CrawlError, CrawlOrchestrator, QueueError};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const LISTINGS: [&str; 2] = [
    "https://directory.example.com/list?page=1",
    "https://directory.example.com/list?page=2",
];

fn config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.crawl.max_concurrency = 3;
    config.crawl.navigation_timeout_ms = 100;
    config.crawl.task_timeout_ms = 2_000;
    config.crawl.input_path = dir.join("urls.csv");
    config.crawl.output_path = dir.join("Data.csv");
    config
}

fn write_seeds(config: &AppConfig, urls: &[&str]) {
    std::fs::write(&config.crawl.input_path, urls.join("\n")).expect("write seeds");
}

fn detail_url(listing: usize, entry: usize) -> String {
    format!("https://directory.example.com/people/{listing}-{entry}")
}

/// Two listing pages with three people each.
fn directory(config: &AppConfig) -> ScriptedBrowser {
    let selectors = &config.selectors;
    let mut browser = ScriptedBrowser::new();

    for (listing, url) in LISTINGS.iter().enumerate() {
        let links: Vec<String> = (0..3)
            .map(|entry| format!("/people/{listing}-{entry}"))
            .collect();
        let links: Vec<&str> = links.iter().map(String::as_str).collect();
        browser = browser.with_document(
            url,
            ScriptedDocument::new().with_links(&selectors.detail_link, &links),
        );

        for entry in 0..3 {
            let name = format!("Person{listing}{entry} Example Name");
            let street = format!("{entry} Main St");
            browser = browser.with_document(
                &detail_url(listing, entry),
                ScriptedDocument::new()
                    .with_text(&selectors.name, &[name.as_str()])
                    .with_text(
                        &selectors.address_lines,
                        &[street.as_str(), "Springfield"],
                    )
                    .with_subresource("image", "https://cdn.example.com/photo.jpg")
                    .with_subresource("script", "https://www.google-analytics.com/analytics.js")
                    .with_subresource("document", &detail_url(listing, entry)),
            );
        }
    }
    browser
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .expect("open output");
    reader
        .records()
        .map(|row| row.expect("row").iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn test_crawl_writes_one_row_per_person() {
    let dir = TempDir::new().expect("temp dir");
    let config = config(dir.path());
    write_seeds(&config, &LISTINGS);
    let browser = directory(&config);

    let report = CrawlOrchestrator::new(config.clone(), Arc::new(browser.clone()))
        .run()
        .await
        .expect("crawl");

    assert_eq!(report.seeds, 2);
    assert_eq!(report.records, 6);
    assert_eq!(report.completed, 8);
    assert_eq!(report.failed, 0);
    assert!(report.failures.is_empty());
    assert!(report.finished_at >= report.started_at);

    let rows = read_rows(&config.crawl.output_path);
    assert_eq!(rows.len(), 7);
    assert_eq!(
        rows[0],
        vec!["Url", "FullName", "FirstName", "LastName", "Address", "City", "Province"]
    );

    let urls: HashSet<_> = rows[1..].iter().map(|row| row[0].clone()).collect();
    assert_eq!(urls.len(), 6);
    for listing in 0..2 {
        for entry in 0..3 {
            assert!(urls.contains(&detail_url(listing, entry)));
        }
    }

    for row in &rows[1..] {
        assert!(row[1].ends_with(" Example Name"));
        assert!(row[2].starts_with("Person"));
        assert_eq!(row[3], "Example Name");
        assert!(row[4].ends_with(" Main St Springfield"));
        assert_eq!(row[5], "");
        assert_eq!(row[6], "");
    }

    // One page per task, all released, never more open than workers
    assert_eq!(browser.sessions_opened(), 8);
    assert_eq!(browser.open_pages(), 0);
    assert!(browser.peak_open_pages() <= 3);

    for session in browser.sessions() {
        assert!(session.closed);
        assert!(session.intercepting);
        assert!(session.user_agent.is_some());
        assert!(session.blocked_requests.iter().all(|url| !url.contains(".example.com/people")));
        if session.navigations[0].contains("/people/") {
            assert_eq!(session.blocked_requests.len(), 2);
            assert_eq!(session.allowed_requests.len(), 1);
        }
    }
}

#[tokio::test]
async fn test_failed_detail_is_reported_without_stopping_crawl() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config(dir.path());
    config.crawl.retry_failed_tasks = false;
    write_seeds(&config, &LISTINGS);
    let broken = detail_url(1, 2);
    let browser = directory(&config).with_document(
        &broken,
        ScriptedDocument::new().failing("net::ERR_CONNECTION_RESET"),
    );

    let report = CrawlOrchestrator::new(config.clone(), Arc::new(browser.clone()))
        .run()
        .await
        .expect("crawl");

    assert_eq!(report.records, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].task.url(), broken);
    assert!(report.failures[0].message.contains("ERR_CONNECTION_RESET"));

    let rows = read_rows(&config.crawl.output_path);
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|row| row[0] != broken));
    assert_eq!(browser.open_pages(), 0);
}

#[tokio::test]
async fn test_exhausted_retry_budget_aborts_without_output() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config(dir.path());
    config.crawl.retry_limit = 2;
    write_seeds(&config, &[LISTINGS[0], "https://unreachable.example.com/list"]);
    let browser = directory(&config);

    let err = CrawlOrchestrator::new(config.clone(), Arc::new(browser.clone()))
        .run()
        .await
        .expect_err("budget exhausted");

    assert!(matches!(
        err,
        CrawlError::Queue(QueueError::RetryBudgetExhausted { limit: 2 })
    ));
    assert!(!config.crawl.output_path.exists());
    assert_eq!(browser.open_pages(), 0);
}

#[tokio::test]
async fn test_missing_seed_file_fails_before_crawling() {
    let dir = TempDir::new().expect("temp dir");
    let config = config(dir.path());
    let browser = directory(&config);

    let err = CrawlOrchestrator::new(config.clone(), Arc::new(browser.clone()))
        .run()
        .await
        .expect_err("no seed file");

    assert!(matches!(err, CrawlError::SeedFile { .. }));
    assert_eq!(browser.sessions_opened(), 0);
    assert!(!config.crawl.output_path.exists());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config(dir.path());
    config.crawl.max_concurrency = 0;

    let err = CrawlOrchestrator::new(config, Arc::new(ScriptedBrowser::new()))
        .run()
        .await
        .expect_err("invalid config");
    assert!(matches!(err, CrawlError::Config(_)));
}

#[tokio::test]
async fn test_task_timeout_shorter_than_navigation_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config(dir.path());
    config.crawl.navigation_timeout_ms = 1_000;
    config.crawl.task_timeout_ms = 300;
    write_seeds(&config, &LISTINGS);

    let browser = ScriptedBrowser::new();
    let err = CrawlOrchestrator::new(config.clone(), Arc::new(browser.clone()))
        .run()
        .await
        .expect_err("task timeout below navigation timeout");
    assert!(matches!(err, CrawlError::Config(_)));
    assert_eq!(browser.sessions_opened(), 0);
    assert!(!config.crawl.output_path.exists());
}

#[tokio::test]
async fn test_empty_seed_file_writes_header_only() {
    let dir = TempDir::new().expect("temp dir");
    let config = config(dir.path());
    write_seeds(&config, &[]);

    let report = CrawlOrchestrator::new(config.clone(), Arc::new(ScriptedBrowser::new()))
        .run()
        .await
        .expect("crawl");
    assert_eq!(report.records, 0);
    assert_eq!(read_rows(&config.crawl.output_path).len(), 1);
}
