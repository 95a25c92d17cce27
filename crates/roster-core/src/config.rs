//! Configuration management for roster.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Slack added on top of the navigation timeout for CDP commands, so the
/// navigation bound fires before the protocol layer gives up.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Main application configuration.
///
/// This is loaded from `~/.config/roster/config.toml` (or platform equivalent)
/// unless an explicit path is given. If the file doesn't exist, default values
/// are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Crawl scheduling and I/O paths
    pub crawl: CrawlConfig,
    /// Browser launch and per-page identity settings
    pub browser: BrowserConfig,
    /// Request interception rules
    pub filter: FilterConfig,
    /// XPath selectors for the two page kinds
    pub selectors: SelectorConfig,
}

impl AppConfig {
    /// Load configuration from the default location, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, falling back to defaults if not found.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `ROSTER_MAX_CONCURRENCY`: Override the worker count
    /// - `ROSTER_NAVIGATION_TIMEOUT_MS`: Override the navigation/wait timeout
    /// - `ROSTER_RETRY_LIMIT`: Override the process-wide retry budget
    /// - `ROSTER_HEADLESS`: Override browser headless mode (true/false)
    /// - `ROSTER_COOKIE`: Override the static cookie header
    pub fn load_with_env(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("ROSTER_MAX_CONCURRENCY") {
            if let Ok(max) = val.parse() {
                self.crawl.max_concurrency = max;
                tracing::debug!("Override crawl.max_concurrency from env: {}", max);
            }
        }

        if let Some(val) = lookup("ROSTER_NAVIGATION_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.crawl.set_navigation_timeout_ms(ms);
                tracing::debug!("Override crawl.navigation_timeout_ms from env: {}", ms);
            }
        }

        if let Some(val) = lookup("ROSTER_TASK_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.crawl.task_timeout_ms = ms;
                tracing::debug!("Override crawl.task_timeout_ms from env: {}", ms);
            }
        }

        if let Some(val) = lookup("ROSTER_RETRY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.crawl.retry_limit = limit;
                tracing::debug!("Override crawl.retry_limit from env: {}", limit);
            }
        }

        if let Some(val) = lookup("ROSTER_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("ROSTER_COOKIE") {
            tracing::debug!("Override browser.cookie_header from env");
            self.browser.cookie_header = val;
        }
    }

    /// Check that the configuration can drive a crawl.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.crawl.max_concurrency == 0 {
            return Err(invalid("crawl.max_concurrency", "must be at least 1"));
        }
        if self.crawl.navigation_timeout_ms == 0 {
            return Err(invalid("crawl.navigation_timeout_ms", "must be non-zero"));
        }
        if self.crawl.task_timeout_ms == 0 {
            return Err(invalid("crawl.task_timeout_ms", "must be non-zero"));
        }
        if self.crawl.task_timeout_ms < self.crawl.min_task_timeout_ms() {
            return Err(invalid(
                "crawl.task_timeout_ms",
                "must cover a navigation plus an element wait (twice navigation_timeout_ms)",
            ));
        }
        if self.browser.base_viewport_width == 0 || self.browser.base_viewport_height == 0 {
            return Err(invalid("browser.base_viewport", "dimensions must be non-zero"));
        }

        let selectors = [
            ("selectors.detail_link", &self.selectors.detail_link),
            ("selectors.name", &self.selectors.name),
            ("selectors.address_lines", &self.selectors.address_lines),
        ];
        for (field, value) in selectors {
            if value.trim().is_empty() {
                return Err(invalid(field, "selector must not be empty"));
            }
        }

        Ok(())
    }

    /// Save configuration to a file, creating parent directories as needed.
    pub fn save_to(&self, config_path: &Path) -> ConfigResult<()> {
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/roster/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "roster", "roster").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Crawl scheduling and I/O settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum number of tasks executing at once
    pub max_concurrency: usize,
    /// Bound on each navigation and element wait, in milliseconds
    pub navigation_timeout_ms: u64,
    /// Hard bound on a whole task, in milliseconds. At least twice
    /// `navigation_timeout_ms`.
    pub task_timeout_ms: u64,
    /// Process-wide retry budget shared by all tasks
    pub retry_limit: u32,
    /// Re-enqueue failed tasks while the retry budget lasts
    pub retry_failed_tasks: bool,
    /// Seed file (first column of each row is a listing URL)
    pub input_path: PathBuf,
    /// Output file for the extracted records
    pub output_path: PathBuf,
    /// Visit each detail URL at most once per crawl
    pub dedupe_detail_urls: bool,
}

impl CrawlConfig {
    /// Navigation/wait timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Whole-task timeout as a `Duration`.
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Smallest task timeout that fits one navigation and one element wait.
    #[must_use]
    pub fn min_task_timeout_ms(&self) -> u64 {
        self.navigation_timeout_ms.saturating_mul(2)
    }

    /// Set the navigation timeout, raising the task timeout when it would no
    /// longer fit a navigation and an element wait.
    pub fn set_navigation_timeout_ms(&mut self, ms: u64) {
        self.navigation_timeout_ms = ms;
        let min = self.min_task_timeout_ms();
        if self.task_timeout_ms < min {
            tracing::debug!(
                "Raising crawl.task_timeout_ms from {} to {}",
                self.task_timeout_ms,
                min
            );
            self.task_timeout_ms = min;
        }
    }

    /// Timeout for individual browser protocol commands.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.navigation_timeout() + REQUEST_TIMEOUT_MARGIN
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            navigation_timeout_ms: 120_000,
            task_timeout_ms: 240_000,
            retry_limit: 100,
            retry_failed_tasks: true,
            input_path: PathBuf::from("urls.csv"),
            output_path: PathBuf::from("Data.csv"),
            dedupe_detail_urls: true,
        }
    }
}

/// Browser launch and page identity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Viewport width before jitter
    pub base_viewport_width: u32,
    /// Viewport height before jitter
    pub base_viewport_height: u32,
    /// Upper bound (exclusive) of the random jitter added to each dimension
    pub viewport_jitter: u32,
    /// Extra command-line switches passed to Chromium
    pub launch_args: Vec<String>,
    /// Static `Cookie` header sent with every page request (empty = none)
    pub cookie_header: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            base_viewport_width: 1024,
            base_viewport_height: 768,
            viewport_jitter: 100,
            launch_args: [
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
                "--disable-accelerated-2d-canvas",
                "--disable-gpu",
                "--window-size=1920x1080",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            cookie_header: String::new(),
        }
    }
}

/// Request interception rules applied to every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Resource types that are never fetched
    pub blocked_resource_types: Vec<String>,
    /// URL substrings of trackers and analytics hosts that are never fetched
    pub tracker_denylist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            blocked_resource_types: [
                "image",
                "media",
                "font",
                "texttrack",
                "object",
                "beacon",
                "csp_report",
                "imageset",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            tracker_denylist: [
                "quantserve",
                "adzerk",
                "doubleclick",
                "adition",
                "exelator",
                "sharethrough",
                "cdn.api.twitter",
                "google-analytics",
                "googletagmanager",
                "google",
                "fontawesome",
                "facebook",
                "analytics",
                "optimizely",
                "clicktale",
                "mixpanel",
                "zedo",
                "clicksor",
                "tiqcdn",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

/// XPath selectors used by the listing and detail stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Links from a listing page to its detail pages
    pub detail_link: String,
    /// Element holding the person's full name on a detail page
    pub name: String,
    /// Sibling nodes whose text forms the address
    pub address_lines: String,
    /// Separator placed between address lines
    pub address_separator: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            detail_link: r#"//li/a[text()="View Details"]"#.to_string(),
            name: r#"//div[@class="address"]/h2"#.to_string(),
            address_lines: r#"//div[@class="address"]/h2/following::div[1]//div[2]/p"#
                .to_string(),
            address_separator: " ".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.crawl.max_concurrency, 10);
        assert_eq!(config.crawl.navigation_timeout_ms, 120_000);
        assert_eq!(config.crawl.task_timeout_ms, 240_000);
        assert_eq!(config.crawl.retry_limit, 100);
        assert!(config.crawl.retry_failed_tasks);
        assert_eq!(config.crawl.input_path, PathBuf::from("urls.csv"));
        assert_eq!(config.crawl.output_path, PathBuf::from("Data.csv"));
        assert!(config.browser.headless);
        assert!(config.browser.cookie_header.is_empty());
        assert!(config
            .filter
            .blocked_resource_types
            .contains(&"image".to_string()));
        assert!(config.filter.tracker_denylist.contains(&"doubleclick".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[crawl]"));
        assert!(toml_str.contains("[browser]"));
        assert!(toml_str.contains("[filter]"));
        assert!(toml_str.contains("[selectors]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.crawl.max_concurrency = 4;
        config.browser.cookie_header = "PHPSESSID=abc".to_string();

        config.save_to(&config_path).expect("save config");
        let loaded = AppConfig::load_from(&config_path).expect("load config");

        assert_eq!(loaded.crawl.max_concurrency, 4);
        assert_eq!(loaded.browser.cookie_header, "PHPSESSID=abc");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded =
            AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load defaults");
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ROSTER_MAX_CONCURRENCY", "3"),
            ("ROSTER_NAVIGATION_TIMEOUT_MS", "5000"),
            ("ROSTER_RETRY_LIMIT", "not-a-number"),
            ("ROSTER_HEADLESS", "false"),
            ("ROSTER_COOKIE", "a=1; b=2"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.crawl.max_concurrency, 3);
        assert_eq!(config.crawl.navigation_timeout(), Duration::from_secs(5));
        // Unparseable values leave the default in place
        assert_eq!(config.crawl.retry_limit, 100);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.cookie_header, "a=1; b=2");
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[crawl]
max_concurrency = 2
output_path = "people.csv"

[selectors]
name = "//h1"
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.crawl.max_concurrency, 2);
        assert_eq!(config.crawl.output_path, PathBuf::from("people.csv"));
        assert_eq!(config.selectors.name, "//h1");
        // These should be defaults
        assert_eq!(config.crawl.retry_limit, 100);
        assert_eq!(config.selectors.address_separator, " ");
        assert!(config.browser.headless);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.crawl.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.selectors.detail_link = "  ".to_string();
        let err = config.validate().expect_err("empty selector");
        assert!(err.to_string().contains("selectors.detail_link"));

        let mut config = AppConfig::default();
        config.browser.base_viewport_height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_task_timeout_shorter_than_navigate_and_wait() {
        let mut config = AppConfig::default();
        config.crawl.navigation_timeout_ms = 1_000;
        config.crawl.task_timeout_ms = 300;
        let err = config.validate().expect_err("task shorter than navigation");
        assert!(err.to_string().contains("crawl.task_timeout_ms"));

        // Room for the navigation but not the element wait after it
        config.crawl.task_timeout_ms = 1_500;
        assert!(config.validate().is_err());

        config.crawl.task_timeout_ms = 2_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_longer_navigation_timeout_raises_task_timeout() {
        let mut crawl = CrawlConfig::default();
        crawl.set_navigation_timeout_ms(300_000);
        assert_eq!(crawl.navigation_timeout_ms, 300_000);
        assert_eq!(crawl.task_timeout_ms, 600_000);

        // A shorter navigation leaves a roomier task timeout alone
        crawl.set_navigation_timeout_ms(1_000);
        assert_eq!(crawl.task_timeout_ms, 600_000);
    }

    #[test]
    fn test_env_navigation_override_keeps_config_valid() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| {
            (key == "ROSTER_NAVIGATION_TIMEOUT_MS").then(|| "300000".to_string())
        });
        assert_eq!(config.crawl.task_timeout_ms, 600_000);
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| match key {
            "ROSTER_NAVIGATION_TIMEOUT_MS" => Some("300000".to_string()),
            "ROSTER_TASK_TIMEOUT_MS" => Some("400000".to_string()),
            _ => None,
        });
        assert_eq!(config.crawl.task_timeout_ms, 400_000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_outlasts_navigation() {
        let mut crawl = CrawlConfig::default();
        assert!(crawl.request_timeout() > crawl.navigation_timeout());
        assert!(crawl.request_timeout() >= Duration::from_secs(120));

        crawl.set_navigation_timeout_ms(300_000);
        assert!(crawl.request_timeout() > Duration::from_secs(300));
    }
}
