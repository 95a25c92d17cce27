//! Shared types used across the roster crawler.
//!
//! A crawl is a stream of [`Task`]s, each visiting one page, and produces
//! one [`Record`] per successfully processed detail page.

use crate::error::RosterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column header written above the exported records, in row order.
pub const RECORD_COLUMNS: [&str; 7] = [
    "Url",
    "FullName",
    "FirstName",
    "LastName",
    "Address",
    "City",
    "Province",
];

/// The two page kinds a crawl visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A directory page enumerating links to detail pages
    Listing,
    /// A page holding one person's name and address
    Detail,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing => write!(f, "listing"),
            Self::Detail => write!(f, "detail"),
        }
    }
}

/// One unit of crawl work: a page URL and what to do with it.
///
/// Tasks are immutable once created. The URL is validated on construction
/// and kept exactly as given (no normalization), so it can be written back
/// out verbatim as a record's source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    url: String,
    kind: TaskKind,
}

impl Task {
    /// Create a task for the given URL and kind.
    ///
    /// # Errors
    /// Returns error if the URL is empty or not a well-formed absolute URL.
    pub fn new(url: impl Into<String>, kind: TaskKind) -> Result<Self, RosterError> {
        let url = url.into().trim().to_string();
        Self::validate(&url)?;
        Ok(Self { url, kind })
    }

    /// Create a listing task.
    pub fn listing(url: impl Into<String>) -> Result<Self, RosterError> {
        Self::new(url, TaskKind::Listing)
    }

    /// Create a detail task.
    pub fn detail(url: impl Into<String>) -> Result<Self, RosterError> {
        Self::new(url, TaskKind::Detail)
    }

    /// The page URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The page kind.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    fn validate(url: &str) -> Result<(), RosterError> {
        if url.is_empty() {
            return Err(RosterError::Validation("task URL is empty".to_string()));
        }

        let parsed = url::Url::parse(url)
            .map_err(|e| RosterError::Validation(format!("invalid task URL '{url}': {e}")))?;

        if parsed.cannot_be_a_base() {
            return Err(RosterError::Validation(format!(
                "invalid task URL '{url}': not a hierarchical URL"
            )));
        }

        Ok(())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.url)
    }
}

/// A person extracted from one detail page.
///
/// City and province are carried for the export layout and are always
/// empty for now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// URL of the detail page the record came from
    pub source_url: String,
    /// Name as displayed on the page
    pub full_name: String,
    /// First whitespace-delimited token of the full name
    pub first_name: String,
    /// Remaining tokens of the full name
    pub last_name: String,
    /// Address lines joined into one string
    pub address: String,
    /// City (unused)
    pub city: String,
    /// Province (unused)
    pub province: String,
}

impl Record {
    /// Build a record with empty city and province.
    #[must_use]
    pub fn new(
        source_url: impl Into<String>,
        full_name: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            full_name: full_name.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            address: address.into(),
            city: String::new(),
            province: String::new(),
        }
    }

    /// Field values in [`RECORD_COLUMNS`] order.
    #[must_use]
    pub fn to_row(&self) -> [&str; 7] {
        [
            &self.source_url,
            &self.full_name,
            &self.first_name,
            &self.last_name,
            &self.address,
            &self.city,
            &self.province,
        ]
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Time elapsed between `earlier` and this timestamp, clamped at zero.
    #[must_use]
    pub fn duration_since(&self, earlier: &Timestamp) -> std::time::Duration {
        (self.0 - earlier.0).to_std().unwrap_or_default()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
