//! SQLite connection handling.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db`, `sqlite://./relative.db`
//!   or a bare path ending in `.db`, `.sqlite` or `.sqlite3`
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! File databases are never created by the crawler and are opened
//! read-only unless the configuration says otherwise.

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::config::ConnectionConfig;
use crate::error::{CrawlError, Result};

/// Whether the connection string names an in-memory database.
pub(crate) fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Normalizes connection string to SQLite URL format.
pub(crate) fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}

/// Opens the pool backing one crawl.
///
/// An in-memory database exists per connection, so it is limited to a
/// single pooled connection.
pub(crate) async fn connect(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<SqlitePool> {
    let normalized = normalize_connection_string(connection_string);

    let options = SqliteConnectOptions::from_str(&normalized)
        .map_err(|e| {
            CrawlError::configuration(format!("Invalid SQLite connection string: {}", e))
        })?
        .read_only(config.read_only)
        .create_if_missing(false)
        .busy_timeout(config.query_timeout);

    let max_connections = if is_in_memory(connection_string) {
        1
    } else {
        config.max_connections.max(1)
    };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect_with(options)
        .await
        .map_err(CrawlError::connection_failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_connection_string() {
        assert_eq!(normalize_connection_string(":memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_connection_string("sqlite:///path/db.sqlite"),
            "sqlite:///path/db.sqlite"
        );
        assert_eq!(
            normalize_connection_string("/path/to/db.sqlite"),
            "sqlite:///path/to/db.sqlite"
        );
    }

    #[test]
    fn test_is_in_memory() {
        assert!(is_in_memory(":memory:"));
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file?mode=memory"));
        assert!(!is_in_memory("sqlite:///var/data/app.db"));
    }

    #[tokio::test]
    async fn test_missing_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");

        let result = connect(path.to_str().unwrap(), &ConnectionConfig::default()).await;

        assert!(matches!(result, Err(CrawlError::Connection { .. })));
        assert!(!path.exists());
    }
}
