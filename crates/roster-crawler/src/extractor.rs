//! Field extraction from loaded pages.

use roster_browser::{BrowserPage, Result};

/// How [`extract`] resolves a selector to one string.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    /// Resolve the selector inside the first match of this selector
    pub scope: Option<&'a str>,
    /// Which match to read when not merging
    pub index: usize,
    /// Join every match instead of reading one
    pub merge: bool,
    /// Joiner used when merging
    pub separator: &'a str,
}

impl Default for ExtractOptions<'_> {
    fn default() -> Self {
        Self {
            scope: None,
            index: 0,
            merge: false,
            separator: "",
        }
    }
}

impl<'a> ExtractOptions<'a> {
    /// Join all matches with `separator`.
    #[must_use]
    pub fn merged(separator: &'a str) -> Self {
        Self {
            merge: true,
            separator,
            ..Self::default()
        }
    }

    /// Read the `index`-th match.
    #[must_use]
    pub fn at(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Resolve inside the first match of `scope`.
    #[must_use]
    pub fn within(mut self, scope: &'a str) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Read `field` from the nodes `selector` matches and reduce them to one string.
///
/// Merged values are joined in document order, with absent fields contributing
/// an empty string, and are not trimmed. A single value is trimmed. No match,
/// an out-of-range index, or an absent field yields `""`.
pub async fn extract(
    page: &dyn BrowserPage,
    selector: &str,
    field: &str,
    options: ExtractOptions<'_>,
) -> Result<String> {
    let values = page.query_field_all(selector, options.scope, field).await?;

    if options.merge {
        return Ok(values
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect::<Vec<_>>()
            .join(options.separator));
    }

    Ok(values
        .into_iter()
        .nth(options.index)
        .flatten()
        .map(|value| value.trim().to_string())
        .unwrap_or_default())
}

/// Every present, non-blank value of `field` across the matches, trimmed.
pub async fn extract_all(
    page: &dyn BrowserPage,
    selector: &str,
    field: &str,
    scope: Option<&str>,
) -> Result<Vec<String>> {
    let values = page.query_field_all(selector, scope, field).await?;
    Ok(values
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect())
}
