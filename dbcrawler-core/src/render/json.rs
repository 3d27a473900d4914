//! JSON report.

use serde::Serialize;

use crate::crawler::{CrawlOutcome, CrawlStatus};
use crate::diagnostics::Diagnostic;
use crate::error::{CrawlError, Result};
use crate::models::Catalog;

#[derive(Serialize)]
struct JsonReport<'a> {
    format_version: &'static str,
    status: CrawlStatus,
    catalog: &'a Catalog,
    diagnostics: &'a [Diagnostic],
}

/// Serializes the frozen model and diagnostics as pretty-printed JSON.
///
/// Arenas are already in canonical order, so equal models produce equal
/// documents.
pub fn render_json(outcome: &CrawlOutcome) -> Result<String> {
    let report = JsonReport {
        format_version: "1.0",
        status: outcome.status,
        catalog: &outcome.catalog,
        diagnostics: &outcome.diagnostics,
    };
    let mut json = serde_json::to_string_pretty(&report).map_err(|e| {
        CrawlError::Serialization {
            context: "Failed to serialize crawl report".to_string(),
            source: e,
        }
    })?;
    json.push('\n');
    Ok(json)
}
