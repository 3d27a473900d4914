//! Connectivity providers and factory.
//!
//! A [`ConnectivityProvider`] describes one database product: which
//! metadata categories it can report and how to open a connection. The
//! [`MetadataConnection`] it opens answers one narrow question per call and
//! returns raw rows in no particular order.
//!
//! # Module Structure
//! - `rows`: Raw row types shared by all providers
//! - `snapshot`: In-memory provider backed by a JSON snapshot
//! - `sqlite`, `postgres`: sqlx-based providers (feature-gated)

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::{CrawlError, Result};
use crate::info_level::MetadataCategory;
use crate::models::{DatabaseInfo, DatabaseType, ObjectName, TableName};

pub mod rows;
pub mod snapshot;

#[cfg(any(feature = "postgresql", feature = "sqlite"))]
mod helpers;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use rows::{
    ColumnRow, ConstraintKind, ConstraintRow, ForeignKeyColumnRow, ForeignKeyRow,
    IndexColumnRow, IndexRow, ParameterRow, PrivilegeRow, RoutineRow, SchemaRow, SequenceRow,
    SynonymRow, TableRow,
};
pub use snapshot::{
    DatabaseSnapshot, Operation, RecordedCall, RowOrder, SnapshotProvider, SnapshotRoutine,
    SnapshotSchema, SnapshotTable,
};

/// A database product the crawler can read metadata from.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn ConnectivityProvider>`.
#[async_trait]
pub trait ConnectivityProvider: Send + Sync {
    /// Product name used in logs and capability diagnostics.
    fn product(&self) -> &str;

    /// Whether the provider can report the given category at all.
    fn supports(&self, category: MetadataCategory) -> bool;

    /// Opens the connection used for a whole crawl.
    ///
    /// # Errors
    /// Returns `CrawlError::Connection` if the database cannot be reached.
    async fn open_connection(&self) -> Result<Box<dyn MetadataConnection>>;
}

/// A live metadata connection.
///
/// List methods for optional categories default to an unsupported error so
/// providers only implement what they can report. The crawler consults
/// [`ConnectivityProvider::supports`] before calling them.
#[async_trait]
pub trait MetadataConnection: Send + Sync {
    async fn database_info(&self) -> Result<DatabaseInfo>;

    async fn list_schemas(&self) -> Result<Vec<SchemaRow>>;

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRow>>;

    async fn list_columns(&self, table: &TableName) -> Result<Vec<ColumnRow>>;

    /// Primary key, unique and check constraints of a table.
    async fn list_constraints(&self, table: &TableName) -> Result<Vec<ConstraintRow>>;

    async fn list_foreign_keys(&self, table: &TableName) -> Result<Vec<ForeignKeyRow>>;

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexRow>>;

    async fn list_routines(&self, _schema: &str) -> Result<Vec<RoutineRow>> {
        Err(unsupported(MetadataCategory::Routines))
    }

    /// Parameters of the routine whose specific name is `routine.name`.
    async fn list_routine_parameters(&self, _routine: &ObjectName) -> Result<Vec<ParameterRow>> {
        Err(unsupported(MetadataCategory::RoutineParameters))
    }

    async fn list_sequences(&self, _schema: &str) -> Result<Vec<SequenceRow>> {
        Err(unsupported(MetadataCategory::Sequences))
    }

    async fn list_synonyms(&self, _schema: &str) -> Result<Vec<SynonymRow>> {
        Err(unsupported(MetadataCategory::Synonyms))
    }

    async fn list_table_privileges(&self, _table: &TableName) -> Result<Vec<PrivilegeRow>> {
        Err(unsupported(MetadataCategory::TablePrivileges))
    }

    /// Column privileges of a table; each row names its column.
    async fn list_column_privileges(&self, _table: &TableName) -> Result<Vec<PrivilegeRow>> {
        Err(unsupported(MetadataCategory::ColumnPrivileges))
    }

    async fn count_rows(&self, _table: &TableName) -> Result<u64> {
        Err(unsupported(MetadataCategory::TableRowCounts))
    }

    /// Releases the connection. Called exactly once per crawl.
    async fn close(&self);
}

fn unsupported(category: MetadataCategory) -> CrawlError {
    CrawlError::unsupported_feature(category.as_str(), "this connection")
}

/// Factory function to create providers based on connection string.
///
/// # Security
/// - Automatically detects database type from connection string
/// - Sanitizes connection string in all error messages
/// - Enforces read-only mode by default
///
/// # Errors
/// Returns error if:
/// - Connection string format is invalid
/// - Database type is not supported
/// - Required features are not compiled in
pub fn create_provider(
    connection_string: &str,
    config: ConnectionConfig,
) -> Result<Box<dyn ConnectivityProvider>> {
    config.validate()?;
    let database_type = detect_database_type(connection_string)?;

    match database_type {
        #[cfg(feature = "postgresql")]
        DatabaseType::PostgreSQL => Ok(Box::new(postgres::PostgresProvider::new(
            connection_string,
            config,
        ))),
        #[cfg(not(feature = "postgresql"))]
        DatabaseType::PostgreSQL => {
            let _ = config;
            Err(CrawlError::unsupported_feature(
                "PostgreSQL provider",
                "Compile with --features postgresql to enable PostgreSQL support",
            ))
        }
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => Ok(Box::new(sqlite::SqliteProvider::new(
            connection_string,
            config,
        ))),
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => {
            let _ = config;
            Err(CrawlError::unsupported_feature(
                "SQLite provider",
                "Compile with --features sqlite to enable SQLite support",
            ))
        }
    }
}

/// Detects database type from connection string.
///
/// # Errors
/// Returns error if connection string format is unrecognized
pub fn detect_database_type(connection_string: &str) -> Result<DatabaseType> {
    if connection_string.starts_with("postgres://")
        || connection_string.starts_with("postgresql://")
    {
        Ok(DatabaseType::PostgreSQL)
    } else if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(DatabaseType::SQLite)
    } else {
        Err(CrawlError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}
