//! Report rendering.
//!
//! Rendering is a pure function of a [`CrawlOutcome`]: the same model and
//! options always produce the same bytes.
//!
//! # Module Structure
//! - `text`: Line-oriented report for humans and diffs
//! - `json`: Machine-readable report
//! - `portable`: Identifier normalization for cross-product comparison

use std::fmt;
use std::str::FromStr;

use crate::crawler::CrawlOutcome;
use crate::error::{CrawlError, Result};

mod json;
pub mod portable;
mod text;

pub use json::render_json;
pub use portable::normalize;
pub use text::{TextReport, UNRESOLVED_MARKER};

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(CrawlError::configuration(format!(
                "Unknown output format '{}'; expected text or json",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    /// Normalize identifiers and drop product details. Text output only;
    /// JSON always carries the names as the database reports them.
    pub portable_names: bool,
}

/// Renders a crawl result into a complete document.
pub fn render(outcome: &CrawlOutcome, options: &RenderOptions) -> Result<String> {
    match options.format {
        OutputFormat::Text => {
            Ok(TextReport::new(&outcome.catalog, &outcome.diagnostics, options.portable_names)
                .to_string())
        }
        OutputFormat::Json => render_json(outcome),
    }
}
