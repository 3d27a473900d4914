//! PostgreSQL provider.
//!
//! Metadata comes from `pg_catalog`, with `information_schema` used for
//! routine parameters and privileges. Every category except synonyms is
//! supported; PostgreSQL has no synonyms.
//!
//! # Security
//! - All sessions run with `default_transaction_read_only` by default
//! - Connection strings are redacted before they reach logs

use async_trait::async_trait;
use tracing::{debug, info};

use super::{ConnectivityProvider, MetadataConnection};
use crate::config::ConnectionConfig;
use crate::error::{Result, redact_database_url};
use crate::info_level::MetadataCategory;

mod connection;
mod metadata;

use metadata::PostgresConnection;

/// Provider for PostgreSQL servers.
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    connection_string: String,
    config: ConnectionConfig,
}

impl PostgresProvider {
    /// Creates a provider; nothing is opened until [`ConnectivityProvider::open_connection`].
    pub fn new(connection_string: &str, config: ConnectionConfig) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            config,
        }
    }
}

#[async_trait]
impl ConnectivityProvider for PostgresProvider {
    fn product(&self) -> &str {
        "PostgreSQL"
    }

    fn supports(&self, category: MetadataCategory) -> bool {
        category != MetadataCategory::Synonyms
    }

    async fn open_connection(&self) -> Result<Box<dyn MetadataConnection>> {
        debug!(
            "Connecting to {}",
            redact_database_url(&self.connection_string)
        );
        let pool = connection::connect(&self.connection_string, &self.config).await?;
        info!("Connected to PostgreSQL ({})", self.config);
        Ok(Box::new(PostgresConnection::new(pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let provider = PostgresProvider::new(
            "postgres://localhost/books",
            ConnectionConfig::from_url("postgres://localhost/books"),
        );

        assert_eq!(provider.product(), "PostgreSQL");
        assert!(!provider.supports(MetadataCategory::Synonyms));
        for category in MetadataCategory::ALL {
            if category != MetadataCategory::Synonyms {
                assert!(provider.supports(category), "{} should be supported", category);
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_connecting() {
        let provider = PostgresProvider::new("postgres://", ConnectionConfig::default());
        let result = provider.open_connection().await;
        assert!(matches!(
            result,
            Err(crate::error::CrawlError::Configuration { .. })
        ));
    }
}
