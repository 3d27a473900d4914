//! Non-fatal findings recorded during a crawl.

use std::fmt;

use serde::Serialize;

use crate::error::CrawlError;
use crate::info_level::MetadataCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The provider cannot report a requested category; its phase was skipped
    CapabilityGap,
    /// One object could not be read; it was left out of the model
    ObjectRetrieval,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::CapabilityGap => write!(f, "capability gap"),
            DiagnosticKind::ObjectRetrieval => write!(f, "retrieval failed"),
        }
    }
}

/// A recorded gap in the crawled metadata.
///
/// Field order defines the stable report order: phase, kind, object, message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Diagnostic {
    pub category: MetadataCategory,
    pub kind: DiagnosticKind,
    /// Qualified name of the affected object, if the gap is object-scoped
    pub object: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn capability_gap(category: MetadataCategory, product: &str) -> Self {
        Self {
            category,
            kind: DiagnosticKind::CapabilityGap,
            object: None,
            message: format!("not supported by {}", product),
        }
    }

    pub fn object_retrieval(
        category: MetadataCategory,
        object: impl Into<String>,
        error: &CrawlError,
    ) -> Self {
        Self {
            category,
            kind: DiagnosticKind::ObjectRetrieval,
            object: Some(object.into()),
            message: error_chain(error),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.category)?;
        if let Some(object) = &self.object {
            write!(f, " {}", object)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Flattens an error and its sources into one line.
fn error_chain(error: &CrawlError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_gap_display() {
        let diagnostic = Diagnostic::capability_gap(MetadataCategory::Sequences, "SQLite");
        assert_eq!(
            diagnostic.to_string(),
            "[capability gap] sequences: not supported by SQLite"
        );
    }

    #[test]
    fn test_object_retrieval_includes_cause() {
        let error = CrawlError::collection_failed(
            "list_columns for 'books.authors'",
            std::io::Error::other("permission denied for table authors"),
        );
        let diagnostic =
            Diagnostic::object_retrieval(MetadataCategory::Columns, "books.authors", &error);

        assert_eq!(diagnostic.object.as_deref(), Some("books.authors"));
        assert!(diagnostic.message.ends_with("permission denied for table authors"));
        assert!(diagnostic.to_string().starts_with("[retrieval failed] columns books.authors: "));
    }

    #[test]
    fn test_sort_follows_phase_order() {
        let error = CrawlError::query_failed("timeout");
        let mut diagnostics = vec![
            Diagnostic::capability_gap(MetadataCategory::Synonyms, "X"),
            Diagnostic::object_retrieval(MetadataCategory::Indexes, "s.b", &error),
            Diagnostic::object_retrieval(MetadataCategory::Indexes, "s.a", &error),
            Diagnostic::capability_gap(MetadataCategory::Columns, "X"),
        ];
        diagnostics.sort();

        let order: Vec<_> = diagnostics
            .iter()
            .map(|d| (d.category, d.object.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                (MetadataCategory::Columns, None),
                (MetadataCategory::Indexes, Some("s.a".to_string())),
                (MetadataCategory::Indexes, Some("s.b".to_string())),
                (MetadataCategory::Synonyms, None),
            ]
        );
    }
}
