use crate::error::Result;
use crate::hardening::RequestFilter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The page capability the crawler drives.
///
/// One value is one browser tab. Selectors are XPath expressions. Every
/// method may suspend on browser I/O.
#[async_trait::async_trait]
pub trait BrowserPage: Send + Sync {
    /// Override the browser identity string for this page
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Set the viewport dimensions
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Send these headers with every request the page makes
    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<()>;

    /// Register a script that runs before any page script on every navigation
    async fn add_init_script(&self, source: &str) -> Result<()>;

    /// Intercept every outgoing request, aborting those the filter blocks
    async fn set_request_interception(&self, filter: Arc<RequestFilter>) -> Result<()>;

    /// Navigate to a URL and wait for the document to load
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Wait until at least one node matches the selector
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Resolve the selector (inside the first `scope` match, if given) and read
    /// `field` off every matched node, in document order.
    ///
    /// `None` marks a node on which the field is absent. No match yields an
    /// empty list.
    async fn query_field_all(
        &self,
        selector: &str,
        scope: Option<&str>,
        field: &str,
    ) -> Result<Vec<Option<String>>>;

    /// Evaluate a script expression in the page and return its JSON value
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Close the tab. The page must not be used afterwards.
    async fn close(&self) -> Result<()>;
}

/// A source of fresh, unconfigured pages.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Open a new page
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;
}
