//! Record collection and CSV export.

use crate::error::{CrawlError, Result};
use roster_core::{Record, RECORD_COLUMNS};
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Append-only record store shared by every task of a crawl.
///
/// Records keep their append order. The store is exported once, after the
/// crawl has drained.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Mutex<Vec<Record>>,
    exported: AtomicBool,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, record: Record) {
        self.lock().push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the collected records.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Write the header row and every record as CSV.
    pub fn write_to<W: io::Write>(&self, writer: W) -> std::result::Result<usize, csv::Error> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(RECORD_COLUMNS)?;

        let records = self.lock();
        for record in records.iter() {
            csv.write_record(record.to_row())?;
        }
        csv.flush()?;
        Ok(records.len())
    }

    /// Export the collected records to `path`, replacing any existing file.
    ///
    /// Returns the number of records written. Only the first call writes.
    ///
    /// # Errors
    /// `CrawlError::AlreadyExported` on a repeat call, `CrawlError::Output`
    /// if the file cannot be created or written.
    pub fn export(&self, path: &Path) -> Result<usize> {
        if self.exported.swap(true, Ordering::SeqCst) {
            return Err(CrawlError::AlreadyExported);
        }

        let output = |source: csv::Error| CrawlError::Output {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(|e| output(e.into()))?;
        let written = self.write_to(file).map_err(output)?;

        info!("Wrote {} records to {}", written, path.display());
        Ok(written)
    }
}
