use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("page evaluation failed: {0}")]
    EvaluationError(String),

    #[error("hardening step '{step}' rejected: {reason}")]
    HardeningRejected { step: &'static str, reason: String },

    #[error("page already closed")]
    PageClosed,
}

impl BrowserError {
    /// Whether the error is a navigation or wait deadline being exceeded.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
