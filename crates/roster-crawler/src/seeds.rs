//! Seed file reading.

use crate::error::{CrawlError, Result};
use roster_core::Task;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Read listing tasks from a headerless CSV file.
///
/// The first column of every row is a listing URL; further columns are
/// ignored. Blank or malformed URLs are skipped with a warning.
///
/// # Errors
/// `CrawlError::SeedFile` if the file cannot be opened or parsed.
pub fn read_seeds(path: &Path) -> Result<Vec<Task>> {
    let seed_error = |source: csv::Error| CrawlError::SeedFile {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| seed_error(e.into()))?;
    let tasks = read_seeds_from(file).map_err(seed_error)?;
    debug!("Read {} seed URLs from {}", tasks.len(), path.display());
    Ok(tasks)
}

/// Read listing tasks from any CSV source.
pub fn read_seeds_from<R: Read>(reader: R) -> std::result::Result<Vec<Task>, csv::Error> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut tasks = Vec::new();
    for (line, row) in csv.records().enumerate() {
        let row = row?;
        let Some(url) = row.get(0).filter(|url| !url.is_empty()) else {
            continue;
        };

        match Task::listing(url) {
            Ok(task) => tasks.push(task),
            Err(e) => warn!("Skipping seed row {}: {}", line + 1, e),
        }
    }
    Ok(tasks)
}
