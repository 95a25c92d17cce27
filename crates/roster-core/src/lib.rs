//! Roster Core - Foundation crate for the roster directory crawler.
//!
//! This crate provides the shared types, error handling and configuration
//! management that the browser and crawler crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Crawl tasks, extracted records and timestamps
//!
//! # Example
//!
//! ```rust
//! use roster_core::{AppConfig, Task, TaskKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.crawl.max_concurrency, 10);
//!
//! let task = Task::listing("https://example.com/directory?page=1")?;
//! assert_eq!(task.kind(), TaskKind::Listing);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BrowserConfig, CrawlConfig, FilterConfig, SelectorConfig};
pub use error::{ConfigError, ConfigResult, RosterError};
pub use types::{Record, Task, TaskKind, Timestamp, RECORD_COLUMNS};
