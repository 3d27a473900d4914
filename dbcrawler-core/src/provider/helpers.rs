//! Helper utilities shared by the sqlx-based providers.

use sqlx::{ColumnIndex, Decode, Row, Type};

use crate::error::{CrawlError, Result};

/// Extension trait for extracting typed values from database rows
/// with consistent error handling.
///
/// # Example
/// ```rust,ignore
/// let name: String = row.get_field("column_name", "books.authors")?;
/// let remarks: Option<String> = row.get_field("remarks", "books.authors")?;
/// ```
pub(crate) trait RowExt: Row {
    /// Extracts a typed field from the row, naming `object` in the error.
    fn get_field<'r, T>(&'r self, field_name: &str, object: &str) -> Result<T>
    where
        T: Decode<'r, Self::Database> + Type<Self::Database>;
}

impl<R> RowExt for R
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
{
    fn get_field<'r, T>(&'r self, field_name: &str, object: &str) -> Result<T>
    where
        T: Decode<'r, Self::Database> + Type<Self::Database>,
    {
        self.try_get(field_name)
            .map_err(|e| CrawlError::parse_field(field_name, Some(object), e))
    }
}

/// Quotes an identifier for interpolation into metadata queries.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Classifies a sqlx error raised while reading metadata for `context`.
///
/// Transport failures mean the connection is gone and abort the crawl;
/// permission and query failures only affect the object being read.
pub(crate) fn map_sqlx_error(context: impl Into<String>, error: sqlx::Error) -> CrawlError {
    let context = context.into();
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => CrawlError::connection_lost(context, error),
        sqlx::Error::Database(db_err) if is_privilege_error(db_err.code().as_deref()) => {
            CrawlError::insufficient_privileges(context)
        }
        _ => CrawlError::collection_failed(context, error),
    }
}

/// SQLSTATE 42501 (PostgreSQL) and SQLITE_AUTH (23) both mean access denied.
fn is_privilege_error(code: Option<&str>) -> bool {
    matches!(code, Some("42501") | Some("23"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_fatal() {
        let error = map_sqlx_error("listing tables", sqlx::Error::PoolTimedOut);
        assert!(error.is_fatal());

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let error = map_sqlx_error("listing tables", sqlx::Error::Io(io));
        assert!(matches!(error, CrawlError::Connection { .. }));
    }

    #[test]
    fn test_query_errors_are_recoverable() {
        let error = map_sqlx_error("columns of books.authors", sqlx::Error::RowNotFound);
        assert!(!error.is_fatal());
        assert!(error.to_string().contains("books.authors"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("books"), "\"books\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_privilege_codes() {
        assert!(is_privilege_error(Some("42501")));
        assert!(!is_privilege_error(Some("42P01")));
        assert!(!is_privilege_error(None));
    }
}
