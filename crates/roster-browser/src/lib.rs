//! Browser pages for the roster crawler.
//!
//! Provides the page capability the crawler drives, a Chromium-backed
//! implementation, and per-page hardening against automation fingerprinting.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hardening;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use actions::{BrowserPage, PageSource};
pub use engine::{BrowserEngine, ChromiumPage};
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
pub use hardening::{EnvironmentOverride, GeolocationOverride, PageHardening, RequestFilter};
