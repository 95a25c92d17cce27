//! Per-URL crawl logic.
//!
//! A listing task collects detail links and enqueues one detail task per
//! link. A detail task extracts one [`Record`] and hands it to the
//! [`Aggregator`]. Both open their own page, harden it before navigating,
//! and close it on every path out.

use crate::aggregator::Aggregator;
use crate::error::{CrawlError, Result};
use crate::extractor::{extract, extract_all, ExtractOptions};
use crate::queue::TaskQueue;
use roster_browser::{BrowserError, BrowserPage, PageHardening, PageSource};
use roster_core::{AppConfig, Record, SelectorConfig, Task, TaskKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Split a full name at its first whitespace run.
///
/// A name with no space is entirely the first name. Everything after the
/// first token, rejoined with single spaces, is the last name.
#[must_use]
pub fn split_full_name(full_name: &str) -> (String, String) {
    if !full_name.contains(' ') {
        return (full_name.to_string(), String::new());
    }

    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// A page that is closed when dropped, unless released first.
struct PageLease {
    page: Option<Box<dyn BrowserPage>>,
}

impl PageLease {
    fn new(page: Box<dyn BrowserPage>) -> Self {
        Self { page: Some(page) }
    }

    fn page(&self) -> Result<&dyn BrowserPage> {
        self.page
            .as_deref()
            .ok_or(CrawlError::Browser(BrowserError::PageClosed))
    }

    async fn release(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        // Cancelled mid-task; finish closing in the background.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("Background page close failed: {}", e);
                }
            });
        }
    }
}

/// Executes crawl tasks against pages from a [`PageSource`].
pub struct TaskRunner {
    pages: Arc<dyn PageSource>,
    hardening: PageHardening,
    selectors: SelectorConfig,
    navigation_timeout: Duration,
    extra_headers: HashMap<String, String>,
    aggregator: Arc<Aggregator>,
    queue: Arc<TaskQueue<Task>>,
    seen_details: Option<Mutex<HashSet<String>>>,
}

impl TaskRunner {
    pub fn new(
        config: &AppConfig,
        pages: Arc<dyn PageSource>,
        aggregator: Arc<Aggregator>,
        queue: Arc<TaskQueue<Task>>,
    ) -> Self {
        let mut extra_headers = HashMap::new();
        if !config.browser.cookie_header.is_empty() {
            extra_headers.insert("Cookie".to_string(), config.browser.cookie_header.clone());
        }

        Self {
            pages,
            hardening: PageHardening::from_config(config),
            selectors: config.selectors.clone(),
            navigation_timeout: config.crawl.navigation_timeout(),
            extra_headers,
            aggregator,
            queue,
            seen_details: config
                .crawl
                .dedupe_detail_urls
                .then(|| Mutex::new(HashSet::new())),
        }
    }

    /// Run one task on a fresh page. The page is closed whatever the outcome.
    pub async fn execute(&self, task: Task) -> Result<()> {
        let lease = PageLease::new(self.pages.new_page().await?);
        let outcome = self.visit(lease.page()?, &task).await;
        lease.release().await;
        outcome
    }

    async fn visit(&self, page: &dyn BrowserPage, task: &Task) -> Result<()> {
        self.hardening.harden(page).await?;
        if !self.extra_headers.is_empty() {
            page.set_extra_headers(&self.extra_headers).await?;
        }

        debug!("Visiting {}", task);
        page.navigate(task.url(), self.navigation_timeout)
            .await
            .map_err(|e| match e {
                BrowserError::Timeout { timeout, .. } => CrawlError::TaskTimeout {
                    url: task.url().to_string(),
                    stage: "navigation",
                    timeout,
                },
                other => other.into(),
            })?;

        match task.kind() {
            TaskKind::Listing => self.crawl_listing(page, task).await,
            TaskKind::Detail => self.crawl_detail(page, task).await,
        }
    }

    async fn wait_for(&self, page: &dyn BrowserPage, task: &Task, selector: &str) -> Result<()> {
        page.wait_for_selector(selector, self.navigation_timeout)
            .await
            .map_err(|e| match e {
                BrowserError::Timeout { timeout, .. } => CrawlError::MissingElement {
                    url: task.url().to_string(),
                    selector: selector.to_string(),
                    timeout,
                },
                other => other.into(),
            })
    }

    async fn crawl_listing(&self, page: &dyn BrowserPage, task: &Task) -> Result<()> {
        let selector = &self.selectors.detail_link;
        self.wait_for(page, task, selector).await?;

        let hrefs = extract_all(page, selector, "href", None).await?;
        info!("Listing Urls found: {}", hrefs.len());

        let base = Url::parse(task.url()).ok();
        let mut enqueued = 0;
        for href in hrefs {
            let resolved = match base.as_ref().map(|base| base.join(&href)) {
                Some(Ok(url)) => url.to_string(),
                Some(Err(e)) => {
                    warn!("Skipping detail link {} on {}: {}", href, task.url(), e);
                    continue;
                }
                None => href,
            };

            if !self.first_visit(&resolved) {
                debug!("Already queued {}", resolved);
                continue;
            }

            match Task::detail(resolved) {
                Ok(detail) => {
                    self.queue.enqueue(detail)?;
                    enqueued += 1;
                }
                Err(e) => warn!("Skipping detail link on {}: {}", task.url(), e),
            }
        }

        debug!("Enqueued {} detail tasks from {}", enqueued, task.url());
        Ok(())
    }

    fn first_visit(&self, url: &str) -> bool {
        match &self.seen_details {
            Some(seen) => seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(url.to_string()),
            None => true,
        }
    }

    async fn crawl_detail(&self, page: &dyn BrowserPage, task: &Task) -> Result<()> {
        self.wait_for(page, task, &self.selectors.name).await?;

        let full_name = extract(
            page,
            &self.selectors.name,
            "textContent",
            ExtractOptions::default(),
        )
        .await?;

        let address = extract(
            page,
            &self.selectors.address_lines,
            "textContent",
            ExtractOptions::merged(&self.selectors.address_separator),
        )
        .await?;

        let (first_name, last_name) = split_full_name(&full_name);
        debug!("Extracted {} from {}", full_name, task.url());

        self.aggregator.append(Record::new(
            task.url(),
            full_name,
            first_name,
            last_name,
            address,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use roster_browser::scripted::{ScriptedBrowser, ScriptedDocument};
    use tokio_test::assert_ok;

    const LISTING: &str = "https://example.com/list/1";
    const DETAIL: &str = "https://example.com/p/1";

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.crawl.navigation_timeout_ms = 50;
        config
    }

    fn detail_document(config: &AppConfig, name: &str, lines: &[&str]) -> ScriptedDocument {
        ScriptedDocument::new()
            .with_text(&config.selectors.name, &[name])
            .with_text(&config.selectors.address_lines, lines)
    }

    struct Harness {
        browser: ScriptedBrowser,
        aggregator: Arc<Aggregator>,
        queue: Arc<TaskQueue<Task>>,
        runner: TaskRunner,
    }

    fn harness(config: &AppConfig, browser: ScriptedBrowser) -> Harness {
        let aggregator = Arc::new(Aggregator::new());
        let queue = Arc::new(TaskQueue::new(QueueConfig::default()));
        let runner = TaskRunner::new(
            config,
            Arc::new(browser.clone()),
            Arc::clone(&aggregator),
            Arc::clone(&queue),
        );
        Harness {
            browser,
            aggregator,
            queue,
            runner,
        }
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(
            split_full_name("Jane Doe"),
            ("Jane".to_string(), "Doe".to_string())
        );
        assert_eq!(
            split_full_name("Madonna"),
            ("Madonna".to_string(), String::new())
        );
        assert_eq!(
            split_full_name("Mary Jane Watson"),
            ("Mary".to_string(), "Jane Watson".to_string())
        );
        assert_eq!(split_full_name(""), (String::new(), String::new()));
    }

    #[tokio::test]
    async fn test_detail_task_appends_record() {
        let config = test_config();
        let browser = ScriptedBrowser::new().with_document(
            DETAIL,
            detail_document(&config, "  Jane Doe ", &["123 Main St", "Springfield"]),
        );
        let h = harness(&config, browser);

        h.runner
            .execute(Task::detail(DETAIL).expect("task"))
            .await
            .expect("execute");

        let records = h.aggregator.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_url, DETAIL);
        assert_eq!(records[0].full_name, "Jane Doe");
        assert_eq!(records[0].first_name, "Jane");
        assert_eq!(records[0].last_name, "Doe");
        assert_eq!(records[0].address, "123 Main St Springfield");
        assert_eq!(records[0].city, "");
        assert_eq!(records[0].province, "");

        let session = h.browser.session(0).expect("session");
        assert!(session.user_agent.is_some());
        assert!(session.intercepting);
        assert!(!session.init_scripts.is_empty());
        assert_eq!(session.navigations, vec![DETAIL.to_string()]);
        assert!(session.closed);
        assert_eq!(h.browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_listing_task_enqueues_resolved_detail_links() {
        let config = test_config();
        let browser = ScriptedBrowser::new().with_document(
            LISTING,
            ScriptedDocument::new().with_links(
                &config.selectors.detail_link,
                &["/p/1", "https://example.com/p/2", "/p/1", "p/3"],
            ),
        );
        let h = harness(&config, browser);

        assert_ok!(h.runner.execute(Task::listing(LISTING).expect("task")).await);

        // Duplicate link collapsed
        assert_eq!(h.queue.pending(), 3);
        assert!(h.aggregator.is_empty());
        assert_eq!(h.browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_listing_without_dedupe_enqueues_every_link() {
        let mut config = test_config();
        config.crawl.dedupe_detail_urls = false;
        let browser = ScriptedBrowser::new().with_document(
            LISTING,
            ScriptedDocument::new()
                .with_links(&config.selectors.detail_link, &["/p/1", "/p/1"]),
        );
        let h = harness(&config, browser);

        h.runner
            .execute(Task::listing(LISTING).expect("task"))
            .await
            .expect("execute");
        assert_eq!(h.queue.pending(), 2);
    }

    #[tokio::test]
    async fn test_missing_element_fails_and_closes_page() {
        let config = test_config();
        let browser =
            ScriptedBrowser::new().with_document(LISTING, ScriptedDocument::new());
        let h = harness(&config, browser);

        let err = h
            .runner
            .execute(Task::listing(LISTING).expect("task"))
            .await
            .expect_err("no links");
        assert!(matches!(err, CrawlError::MissingElement { .. }));
        assert_eq!(h.queue.pending(), 0);
        assert_eq!(h.browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_navigation_timeout_is_reported() {
        let config = test_config();
        let browser = ScriptedBrowser::new().with_document(
            DETAIL,
            detail_document(&config, "Jane Doe", &["1 Main St"])
                .with_load_delay(Duration::from_secs(10)),
        );
        let h = harness(&config, browser);

        let err = h
            .runner
            .execute(Task::detail(DETAIL).expect("task"))
            .await
            .expect_err("should time out");
        assert!(matches!(
            err,
            CrawlError::TaskTimeout {
                stage: "navigation",
                ..
            }
        ));
        assert!(h.aggregator.is_empty());
        assert_eq!(h.browser.open_pages(), 0);
    }

    #[tokio::test]
    async fn test_hardening_rejection_fails_task() {
        let config = test_config();
        let browser = ScriptedBrowser::new()
            .with_document(DETAIL, detail_document(&config, "Jane Doe", &[]))
            .rejecting_init_scripts();
        let h = harness(&config, browser);

        let err = h
            .runner
            .execute(Task::detail(DETAIL).expect("task"))
            .await
            .expect_err("hardening rejected");
        assert!(matches!(
            err,
            CrawlError::Browser(BrowserError::HardeningRejected {
                step: "init_script",
                ..
            })
        ));
        // Never navigated
        let session = h.browser.session(0).expect("session");
        assert!(session.navigations.is_empty());
        assert!(session.closed);
    }

    #[tokio::test]
    async fn test_cookie_header_is_sent() {
        let mut config = test_config();
        config.browser.cookie_header = "session=abc".to_string();
        let browser = ScriptedBrowser::new()
            .with_document(DETAIL, detail_document(&config, "Jane Doe", &["1 Main St"]));
        let h = harness(&config, browser);

        assert_ok!(h.runner.execute(Task::detail(DETAIL).expect("task")).await);

        let session = h.browser.session(0).expect("session");
        assert_eq!(
            session.extra_headers.get("Cookie").map(String::as_str),
            Some("session=abc")
        );
    }

    #[tokio::test]
    async fn test_cancelled_task_still_closes_page() {
        let config = test_config();
        let browser = ScriptedBrowser::new().with_document(
            DETAIL,
            detail_document(&config, "Jane Doe", &[]).with_load_delay(Duration::from_millis(40)),
        );
        let h = harness(&config, browser);

        let outcome = tokio::time::timeout(
            Duration::from_millis(5),
            h.runner.execute(Task::detail(DETAIL).expect("task")),
        )
        .await;
        assert!(outcome.is_err());

        // Background close runs on the next scheduler turns
        for _ in 0..10 {
            if h.browser.open_pages() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.browser.open_pages(), 0);
    }
}
