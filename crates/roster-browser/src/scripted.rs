//! In-memory page backend.
//!
//! `ScriptedBrowser` serves canned documents keyed by URL and records what
//! each page was asked to do, so code that drives pages can be exercised
//! without a Chromium install. Selectors are looked up verbatim; nothing is
//! parsed or rendered.

use crate::actions::{BrowserPage, PageSource};
use crate::error::{BrowserError, Result};
use crate::hardening::RequestFilter;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Node = HashMap<String, String>;

/// Canned content for one URL.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDocument {
    nodes: HashMap<String, Vec<Node>>,
    evaluations: HashMap<String, Value>,
    subresources: Vec<(String, String)>,
    load_delay: Option<Duration>,
    navigation_error: Option<String>,
}

impl ScriptedDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one node matching `selector`, with the given field values.
    #[must_use]
    pub fn with_node(mut self, selector: &str, fields: &[(&str, &str)]) -> Self {
        let node = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.nodes.entry(selector.to_string()).or_default().push(node);
        self
    }

    /// Append one node per text, each carrying `textContent`.
    #[must_use]
    pub fn with_text(self, selector: &str, texts: &[&str]) -> Self {
        texts.iter().fold(self, |doc, text| {
            doc.with_node(selector, &[("textContent", *text)])
        })
    }

    /// Like [`with_text`](Self::with_text) for nodes resolved inside `scope`.
    #[must_use]
    pub fn with_scoped_text(self, scope: &str, selector: &str, texts: &[&str]) -> Self {
        self.with_text(&scoped_key(Some(scope), selector), texts)
    }

    /// Append one anchor per href.
    #[must_use]
    pub fn with_links(self, selector: &str, hrefs: &[&str]) -> Self {
        hrefs.iter().fold(self, |doc, href| {
            doc.with_node(selector, &[("href", *href), ("textContent", "View Details")])
        })
    }

    /// Result returned when `expression` is evaluated on this document.
    #[must_use]
    pub fn with_evaluation(mut self, expression: &str, value: Value) -> Self {
        self.evaluations.insert(expression.to_string(), value);
        self
    }

    /// A sub-request the document issues while loading.
    #[must_use]
    pub fn with_subresource(mut self, resource_type: &str, url: &str) -> Self {
        self.subresources
            .push((resource_type.to_string(), url.to_string()));
        self
    }

    /// Delay before the document finishes loading.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Make every navigation to this document fail.
    #[must_use]
    pub fn failing(mut self, reason: &str) -> Self {
        self.navigation_error = Some(reason.to_string());
        self
    }
}

fn scoped_key(scope: Option<&str>, selector: &str) -> String {
    match scope {
        Some(scope) => format!("{scope} >> {selector}"),
        None => selector.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What one page was asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLog {
    pub user_agent: Option<String>,
    pub viewport: Option<(u32, u32)>,
    pub extra_headers: HashMap<String, String>,
    pub init_scripts: Vec<String>,
    pub intercepting: bool,
    pub navigations: Vec<String>,
    pub allowed_requests: Vec<String>,
    pub blocked_requests: Vec<String>,
    pub closed: bool,
}

/// Page source over a fixed set of documents.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBrowser {
    documents: Arc<HashMap<String, ScriptedDocument>>,
    sessions: Arc<Mutex<Vec<Arc<Mutex<SessionLog>>>>>,
    open_pages: Arc<AtomicUsize>,
    peak_open_pages: Arc<AtomicUsize>,
    reject_init_scripts: bool,
}

impl ScriptedBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, url: &str, document: ScriptedDocument) -> Self {
        Arc::make_mut(&mut self.documents).insert(url.to_string(), document);
        self
    }

    /// Pages refuse init scripts, as a browser rejecting injection would.
    #[must_use]
    pub fn rejecting_init_scripts(mut self) -> Self {
        self.reject_init_scripts = true;
        self
    }

    /// Number of pages opened so far.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Log of the `index`-th page opened.
    #[must_use]
    pub fn session(&self, index: usize) -> Option<SessionLog> {
        lock(&self.sessions)
            .get(index)
            .map(|log| lock(log).clone())
    }

    /// Logs of every page opened, in opening order.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionLog> {
        lock(&self.sessions)
            .iter()
            .map(|log| lock(log).clone())
            .collect()
    }

    /// Pages currently open.
    #[must_use]
    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    /// Highest number of pages open at the same time.
    #[must_use]
    pub fn peak_open_pages(&self) -> usize {
        self.peak_open_pages.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageSource for ScriptedBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let log = Arc::new(Mutex::new(SessionLog::default()));
        lock(&self.sessions).push(Arc::clone(&log));

        let open = self.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open_pages.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(ScriptedPage {
            documents: Arc::clone(&self.documents),
            log,
            current: Mutex::new(None),
            filter: Mutex::new(None),
            reject_init_scripts: self.reject_init_scripts,
            closed: AtomicBool::new(false),
            open_pages: Arc::clone(&self.open_pages),
        }))
    }
}

/// One page of a [`ScriptedBrowser`].
#[derive(Debug)]
pub struct ScriptedPage {
    documents: Arc<HashMap<String, ScriptedDocument>>,
    log: Arc<Mutex<SessionLog>>,
    current: Mutex<Option<String>>,
    filter: Mutex<Option<Arc<RequestFilter>>>,
    reject_init_scripts: bool,
    closed: AtomicBool,
    open_pages: Arc<AtomicUsize>,
}

impl ScriptedPage {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrowserError::PageClosed)
        } else {
            Ok(())
        }
    }

    fn current_document(&self) -> Option<&ScriptedDocument> {
        let current = lock(&self.current).clone()?;
        self.documents.get(&current)
    }
}

#[async_trait::async_trait]
impl BrowserPage for ScriptedPage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.ensure_open()?;
        lock(&self.log).user_agent = Some(user_agent.to_string());
        Ok(())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.ensure_open()?;
        lock(&self.log).viewport = Some((width, height));
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.ensure_open()?;
        lock(&self.log).extra_headers.clone_from(headers);
        Ok(())
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.ensure_open()?;
        if self.reject_init_scripts {
            return Err(BrowserError::ChromiumError(
                "script injection refused".to_string(),
            ));
        }
        lock(&self.log).init_scripts.push(source.to_string());
        Ok(())
    }

    async fn set_request_interception(&self, filter: Arc<RequestFilter>) -> Result<()> {
        self.ensure_open()?;
        *lock(&self.filter) = Some(filter);
        lock(&self.log).intercepting = true;
        Ok(())
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        lock(&self.log).navigations.push(url.to_string());

        let document = self.documents.get(url).ok_or_else(|| {
            BrowserError::NavigationError(format!("net::ERR_NAME_NOT_RESOLVED at {url}"))
        })?;

        if let Some(reason) = &document.navigation_error {
            return Err(BrowserError::NavigationError(reason.clone()));
        }

        if let Some(delay) = document.load_delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(BrowserError::Timeout {
                    what: format!("navigation to {url}"),
                    timeout,
                });
            }
            tokio::time::sleep(delay).await;
        }

        let filter = lock(&self.filter).clone();
        if let Some(filter) = filter {
            let mut log = lock(&self.log);
            for (resource_type, request_url) in &document.subresources {
                if filter.should_block(resource_type, request_url) {
                    log.blocked_requests.push(request_url.clone());
                } else {
                    log.allowed_requests.push(request_url.clone());
                }
            }
        }

        *lock(&self.current) = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let present = self
            .current_document()
            .and_then(|doc| doc.nodes.get(selector))
            .is_some_and(|nodes| !nodes.is_empty());

        if present {
            return Ok(());
        }

        tokio::time::sleep(timeout).await;
        Err(BrowserError::Timeout {
            what: selector.to_string(),
            timeout,
        })
    }

    async fn query_field_all(
        &self,
        selector: &str,
        scope: Option<&str>,
        field: &str,
    ) -> Result<Vec<Option<String>>> {
        self.ensure_open()?;
        let key = scoped_key(scope, selector);
        Ok(self
            .current_document()
            .and_then(|doc| doc.nodes.get(&key))
            .map(|nodes| nodes.iter().map(|node| node.get(field).cloned()).collect())
            .unwrap_or_default())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.ensure_open()?;
        self.current_document()
            .and_then(|doc| doc.evaluations.get(expression).cloned())
            .ok_or_else(|| {
                BrowserError::EvaluationError(format!("no scripted result for '{expression}'"))
            })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrowserError::PageClosed);
        }
        lock(&self.log).closed = true;
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
