use crate::actions::{BrowserPage, PageSource};
use crate::error::{BrowserError, Result};
use crate::hardening::RequestFilter;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use roster_core::BrowserConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Interval between checks while waiting for a selector.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Browser automation engine.
///
/// Owns one Chromium process; every [`new_page`](PageSource::new_page) opens
/// a fresh tab in it.
pub struct BrowserEngine {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl BrowserEngine {
    /// Launch Chromium with the configured switches.
    ///
    /// `request_timeout` bounds every CDP command, navigation included, so it
    /// must not be shorter than the navigation timeout handed to
    /// [`BrowserPage::navigate`].
    pub async fn launch(config: &BrowserConfig, request_timeout: Duration) -> Result<Self> {
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .request_timeout(request_timeout)
            .args(config.launch_args.iter().map(String::as_str));
        if !config.headless {
            builder = builder.with_head();
        }
        let chromium_config = builder
            .build()
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        // Spawn browser handler
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("Browser handler event error: {}", e);
                }
            }
        });

        debug!(
            "Launched browser (headless: {}, request timeout: {:?})",
            config.headless, request_timeout
        );

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handle)),
        })
    }

    /// Shut the browser down. Pages opened from this engine become unusable.
    pub async fn close(&self) -> Result<()> {
        if let Some(mut browser) = self.browser.lock().await.take() {
            browser
                .close()
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
            if let Err(e) = browser.wait().await {
                warn!("Browser process did not exit cleanly: {}", e);
            }
        }
        if let Some(handle) = self.handler.lock().await.take() {
            handle.abort();
        }
        debug!("Browser closed");
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageSource for BrowserEngine {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::PageClosed)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(Box::new(ChromiumPage::new(page)))
    }
}

/// One Chromium tab.
pub struct ChromiumPage {
    page: Page,
    interceptor: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumPage {
    fn new(page: Page) -> Self {
        Self {
            page,
            interceptor: Mutex::new(None),
        }
    }

    async fn count_matches(&self, selector: &str) -> Result<u64> {
        let expression = format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
            js_string(selector)
        );
        let value = self.evaluate(&expression).await?;
        match_count(selector, &value)
    }
}

fn match_count(selector: &str, value: &serde_json::Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        BrowserError::EvaluationError(format!(
            "match count for {selector} is not a number: {value}"
        ))
    })
}

/// Classify a failed `goto`. The CDP handler ends commands that outlive the
/// launch request timeout with `CdpError::Timeout`.
fn navigation_failure(url: &str, error: CdpError, timeout: Duration) -> BrowserError {
    match error {
        CdpError::Timeout => BrowserError::Timeout {
            what: format!("navigation to {url}"),
            timeout,
        },
        other => BrowserError::NavigationError(format!("{url}: {other}")),
    }
}

/// Quote a Rust string as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Script returning `field` of every node `selector` matches, inside the
/// first `scope` match when given.
fn query_script(selector: &str, scope: Option<&str>, field: &str) -> String {
    let scope = scope.map_or_else(|| "null".to_string(), js_string);
    format!(
        r"(() => {{
  const scopeXPath = {scope};
  let root = document;
  if (scopeXPath !== null) {{
    root = document.evaluate(scopeXPath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    if (!root) return [];
  }}
  const snapshot = document.evaluate({selector}, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
  const values = [];
  for (let i = 0; i < snapshot.snapshotLength; i++) {{
    const value = snapshot.snapshotItem(i)[{field}];
    values.push(value === undefined || value === null ? null : String(value));
  }}
  return values;
}})()",
        selector = js_string(selector),
        field = js_string(field),
    )
}

/// Map the CDP resource type onto the lowercase names the filter expects.
fn resource_type_name(event: &EventRequestPaused) -> String {
    event.resource_type.as_ref().to_ascii_lowercase()
}

#[async_trait::async_trait]
impl BrowserPage for ChromiumPage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        let headers = serde_json::to_value(headers)
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn set_request_interception(&self, filter: Arc<RequestFilter>) -> Result<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let page = self.page.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let outcome = if filter.should_block(&resource_type_name(&event), &event.request.url)
                {
                    trace!("Blocked request {}", event.request.url);
                    page.execute(FailRequestParams::new(request_id, ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                } else {
                    page.execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    trace!("Interception reply failed: {}", e);
                }
            }
        });

        if let Some(previous) = self.interceptor.lock().await.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(navigation_failure(url, e, timeout)),
            Err(_) => Err(BrowserError::Timeout {
                what: format!("navigation to {url}"),
                timeout,
            }),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count_matches(selector).await? > 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() + SELECTOR_POLL_INTERVAL > deadline {
                return Err(BrowserError::Timeout {
                    what: selector.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn query_field_all(
        &self,
        selector: &str,
        scope: Option<&str>,
        field: &str,
    ) -> Result<Vec<Option<String>>> {
        let value = self.evaluate(&query_script(selector, scope, field)).await?;
        serde_json::from_value(value).map_err(|e| BrowserError::EvaluationError(e.to_string()))
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| BrowserError::EvaluationError(e.to_string()))?;
        result
            .into_value::<serde_json::Value>()
            .map_err(|e| BrowserError::EvaluationError(format!("{expression}: {e}")))
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.interceptor.lock().await.take() {
            handle.abort();
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }
}
