//! Per-page hardening against automation fingerprinting.
//!
//! Every page gets a fresh identity (user agent, jittered viewport), a set
//! of declarative environment overrides installed as pre-navigation
//! scripts, a fixed geolocation, and request interception that drops
//! heavy resources and tracker traffic.

use crate::actions::BrowserPage;
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use roster_core::{AppConfig, BrowserConfig, FilterConfig};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Makes `navigator.permissions.query` answer notification queries the way a
/// regular browser does instead of reporting the automation default.
const PERMISSIONS_PATCH: &str = r"(() => {
  const originalQuery = window.navigator.permissions.query;
  window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : originalQuery(parameters)
  );
})();";

/// Replacement for one property the page can read, e.g. `navigator.webdriver`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentOverride {
    /// Dotted path: owner object, then the property to redefine
    pub path: String,
    /// JSON value the property getter returns
    pub value: Value,
}

impl EnvironmentOverride {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    /// Render as a script that redefines the property with a getter.
    ///
    /// Returns `None` for a path without an owner (no dot).
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let (owner, property) = self.path.rsplit_once('.')?;
        if owner.is_empty() || property.is_empty() {
            return None;
        }
        let property = Value::String(property.to_string());
        Some(format!(
            "try {{ Object.defineProperty({owner}, {property}, {{ get: () => ({value}), configurable: true }}); }} catch (e) {{}}",
            value = self.value
        ))
    }
}

/// The overrides a human-operated browser would present.
#[must_use]
pub fn default_overrides() -> Vec<EnvironmentOverride> {
    vec![
        EnvironmentOverride::new("navigator.webdriver", json!(false)),
        EnvironmentOverride::new("navigator.plugins", json!([1, 2, 3, 4, 5])),
        EnvironmentOverride::new("navigator.languages", json!(["en-US", "en"])),
        EnvironmentOverride::new("window.chrome", json!({ "runtime": {} })),
    ]
}

/// Fixed position reported to `navigator.geolocation.getCurrentPosition`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeolocationOverride {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub delay_ms: u64,
}

impl Default for GeolocationOverride {
    fn default() -> Self {
        Self {
            latitude: 23.129_163,
            longitude: 113.264_435,
            accuracy: 21.0,
            delay_ms: 1000,
        }
    }
}

impl GeolocationOverride {
    #[must_use]
    pub fn render(&self) -> String {
        let coords = json!({
            "accuracy": self.accuracy,
            "altitude": null,
            "altitudeAccuracy": null,
            "heading": null,
            "latitude": self.latitude,
            "longitude": self.longitude,
            "speed": null,
        });
        format!(
            "navigator.geolocation.getCurrentPosition = function (cb) {{ setTimeout(() => {{ cb({{ coords: {coords} }}); }}, {delay}); }};",
            delay = self.delay_ms
        )
    }
}

/// Decides which outgoing requests a page aborts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    blocked_types: HashSet<String>,
    denylist: Vec<String>,
}

impl RequestFilter {
    pub fn new<T, D>(blocked_types: T, denylist: D) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            blocked_types: blocked_types
                .into_iter()
                .map(|t| normalize_resource_type(t.as_ref()))
                .collect(),
            denylist: denylist
                .into_iter()
                .map(|d| d.as_ref().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(&config.blocked_resource_types, &config.tracker_denylist)
    }

    /// Whether a request for `url` of the given resource type is aborted.
    ///
    /// The resource type is matched case-insensitively; the URL is matched
    /// with its query and fragment stripped.
    #[must_use]
    pub fn should_block(&self, resource_type: &str, url: &str) -> bool {
        if self
            .blocked_types
            .contains(&normalize_resource_type(resource_type))
        {
            return true;
        }

        let bare = strip_query_and_fragment(url);
        self.denylist.iter().any(|entry| bare.contains(entry.as_str()))
    }
}

/// Lowercase a resource type and fold the CDP spellings onto the names
/// used in configuration.
fn normalize_resource_type(resource_type: &str) -> String {
    let lower = resource_type.trim().to_ascii_lowercase();
    match lower.as_str() {
        "ping" => "beacon".to_string(),
        "cspviolationreport" => "csp_report".to_string(),
        _ => lower,
    }
}

fn strip_query_and_fragment(url: &str) -> &str {
    let url = url.split('?').next().unwrap_or(url);
    url.split('#').next().unwrap_or(url)
}

/// Hardening applied to each page before its first navigation.
#[derive(Debug, Clone)]
pub struct PageHardening {
    browser: BrowserConfig,
    overrides: Vec<EnvironmentOverride>,
    geolocation: GeolocationOverride,
    filter: Arc<RequestFilter>,
}

impl PageHardening {
    #[must_use]
    pub fn new(browser: BrowserConfig, filter: RequestFilter) -> Self {
        Self {
            browser,
            overrides: default_overrides(),
            geolocation: GeolocationOverride::default(),
            filter: Arc::new(filter),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.browser.clone(),
            RequestFilter::from_config(&config.filter),
        )
    }

    /// Replace the environment override set.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<EnvironmentOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn with_geolocation(mut self, geolocation: GeolocationOverride) -> Self {
        self.geolocation = geolocation;
        self
    }

    #[must_use]
    pub fn filter(&self) -> &Arc<RequestFilter> {
        &self.filter
    }

    /// Pre-navigation scripts, in installation order.
    #[must_use]
    pub fn init_scripts(&self) -> Vec<String> {
        let mut scripts: Vec<String> = self
            .overrides
            .iter()
            .filter_map(EnvironmentOverride::render)
            .collect();
        scripts.push(PERMISSIONS_PATCH.to_string());
        scripts.push(self.geolocation.render());
        scripts
    }

    /// Configure a fresh page. Returns the identity the page was given.
    ///
    /// Any rejected step fails the whole call; the page should then be
    /// discarded.
    pub async fn harden(&self, page: &dyn BrowserPage) -> Result<FingerprintConfig> {
        let fingerprint = FingerprintConfig::randomized(&self.browser);

        page.set_user_agent(&fingerprint.user_agent)
            .await
            .map_err(|e| rejected("user_agent", &e))?;

        for script in self.init_scripts() {
            page.add_init_script(&script)
                .await
                .map_err(|e| rejected("init_script", &e))?;
        }

        page.set_viewport(fingerprint.viewport_width, fingerprint.viewport_height)
            .await
            .map_err(|e| rejected("viewport", &e))?;

        page.set_request_interception(Arc::clone(&self.filter))
            .await
            .map_err(|e| rejected("request_interception", &e))?;

        debug!(
            "Hardened page: viewport {}x{}, ua {}",
            fingerprint.viewport_width, fingerprint.viewport_height, fingerprint.user_agent
        );

        Ok(fingerprint)
    }
}

fn rejected(step: &'static str, err: &BrowserError) -> BrowserError {
    BrowserError::HardeningRejected {
        step,
        reason: err.to_string(),
    }
}
