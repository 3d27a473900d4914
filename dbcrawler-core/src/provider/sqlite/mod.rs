//! SQLite provider.
//!
//! # SQLite System Tables
//! - `pragma_database_list`: attached databases, reported as schemas
//! - `<schema>.sqlite_master`: tables and views
//! - `pragma_table_info`: columns and primary key positions
//! - `pragma_foreign_key_list`: foreign keys
//! - `pragma_index_list` / `pragma_index_xinfo`: indexes and unique constraints
//!
//! SQLite has no routines, sequences, synonyms or privileges; those
//! categories are reported unsupported.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ConnectivityProvider, MetadataConnection};
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::info_level::MetadataCategory;

mod connection;
mod metadata;

use metadata::SqliteConnection;

/// Provider for SQLite database files.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    connection_string: String,
    config: ConnectionConfig,
}

impl SqliteProvider {
    /// Creates a provider; nothing is opened until [`ConnectivityProvider::open_connection`].
    pub fn new(connection_string: &str, config: ConnectionConfig) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            config,
        }
    }

    /// Checks if the connection is to an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        connection::is_in_memory(&self.connection_string)
    }
}

#[async_trait]
impl ConnectivityProvider for SqliteProvider {
    fn product(&self) -> &str {
        "SQLite"
    }

    fn supports(&self, category: MetadataCategory) -> bool {
        matches!(
            category,
            MetadataCategory::Tables
                | MetadataCategory::Columns
                | MetadataCategory::PrimaryKeys
                | MetadataCategory::ForeignKeys
                | MetadataCategory::TableConstraints
                | MetadataCategory::Indexes
                | MetadataCategory::TableRowCounts
        )
    }

    async fn open_connection(&self) -> Result<Box<dyn MetadataConnection>> {
        debug!("Opening SQLite database ({})", self.config);
        let pool = connection::connect(&self.connection_string, &self.config).await?;
        info!("Connected to SQLite ({})", self.config);

        Ok(Box::new(SqliteConnection::new(
            pool,
            self.config.database.clone(),
        )))
    }
}
