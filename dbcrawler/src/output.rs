//! Report output.
//!
//! The rendered report is written once, either to a file or to stdout.

use std::path::Path;

use dbcrawler_core::error::{CrawlError, Result};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Writes the whole report to `path`, or to stdout when no path is given.
pub async fn write_report(report: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, report)
                .await
                .map_err(|e| CrawlError::Io {
                    context: format!("Failed to write to {}", path.display()),
                    source: e,
                })?;
            info!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(report.as_bytes())
                .await
                .map_err(|e| CrawlError::Io {
                    context: "Failed to write to stdout".to_string(),
                    source: e,
                })?;
            stdout.flush().await.map_err(|e| CrawlError::Io {
                context: "Failed to flush stdout".to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}
