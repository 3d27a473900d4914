//! Metadata crawler.
//!
//! Drives a [`ConnectivityProvider`] through a fixed sequence of phases,
//! filtering every object through the configured inclusion rules and
//! handing the collected rows to [`SchemaModelBuilder`]. Within a phase,
//! per-object calls run concurrently up to
//! [`CrawlConfig::max_concurrent_queries`]; the builder restores a canonical
//! order so concurrency never shows in the result.
//!
//! # Failure Model
//! - Unsupported categories are skipped and recorded as capability gaps
//! - A failed per-object retrieval is recorded and the object is omitted
//! - Connection loss, model inconsistencies and cancellation abort the crawl

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::builder::SchemaModelBuilder;
use crate::config::CrawlConfig;
use crate::diagnostics::Diagnostic;
use crate::error::{CrawlError, Result};
use crate::models::Catalog;
use crate::provider::{ConnectivityProvider, MetadataConnection};

mod dispatch;
mod phases;

use phases::PhaseRunner;

/// Overall result of a completed crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Every requested category was retrieved without gaps
    Success,
    /// The model is usable but diagnostics record what is missing
    PartialSuccess,
}

/// A frozen model plus the diagnostics gathered while building it.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub catalog: Catalog,
    /// Sorted by phase, kind, object and message
    pub diagnostics: Vec<Diagnostic>,
    pub status: CrawlStatus,
}

impl CrawlOutcome {
    fn new(catalog: Catalog, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort();
        diagnostics.dedup();
        let status = if diagnostics.is_empty() {
            CrawlStatus::Success
        } else {
            CrawlStatus::PartialSuccess
        };
        Self {
            catalog,
            diagnostics,
            status,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.status == CrawlStatus::PartialSuccess
    }
}

/// Crawls one database with one immutable configuration.
pub struct MetadataCrawler<'a> {
    provider: &'a dyn ConnectivityProvider,
    config: &'a CrawlConfig,
    cancellation: CancellationToken,
}

impl<'a> MetadataCrawler<'a> {
    pub fn new(provider: &'a dyn ConnectivityProvider, config: &'a CrawlConfig) -> Self {
        Self {
            provider,
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Uses an external token so callers can stop the crawl between phases.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Runs every enabled phase and freezes the result.
    ///
    /// The connection is opened once and closed on every exit path.
    ///
    /// # Errors
    /// Returns a fatal [`CrawlError`]: connection failures, model
    /// consistency violations or [`CrawlError::Cancelled`].
    pub async fn crawl(&self) -> Result<CrawlOutcome> {
        if self.cancellation.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        info!(
            "Starting {} metadata crawl at info level '{}'",
            self.provider.product(),
            self.config.info_level().level()
        );
        let connection = self.provider.open_connection().await?;

        let result = self.run_phases(connection.as_ref()).await;
        connection.close().await;
        debug!("Connection released");

        match &result {
            Ok(outcome) => info!(
                "Crawl finished: {} schemas, {} tables, {} diagnostics",
                outcome.catalog.schemas().len(),
                outcome.catalog.table_count(),
                outcome.diagnostics.len()
            ),
            Err(CrawlError::Cancelled) => warn!("Crawl cancelled"),
            Err(e) => error!("Crawl failed: {}", e),
        }
        result
    }

    async fn run_phases(&self, conn: &dyn MetadataConnection) -> Result<CrawlOutcome> {
        let mut runner = PhaseRunner {
            conn,
            provider: self.provider,
            config: self.config,
            token: &self.cancellation,
            diagnostics: Vec::new(),
        };

        let database_info = conn.database_info().await?;
        debug!("Connected to {}", database_info.product_name);
        let mut builder = SchemaModelBuilder::new(database_info);

        runner.checkpoint()?;
        runner.schemas(&mut builder).await?;
        runner.checkpoint()?;
        runner.tables(&mut builder).await?;
        runner.checkpoint()?;
        runner.columns(&mut builder).await?;
        runner.checkpoint()?;
        runner.keys(&mut builder).await?;
        runner.checkpoint()?;
        runner.indexes(&mut builder).await?;
        runner.checkpoint()?;
        runner.routines(&mut builder).await?;
        runner.checkpoint()?;
        runner.sequences(&mut builder).await?;
        runner.checkpoint()?;
        runner.synonyms(&mut builder).await?;
        runner.checkpoint()?;
        runner.privileges(&mut builder).await?;
        runner.checkpoint()?;
        runner.row_counts(&mut builder).await?;
        runner.checkpoint()?;

        let catalog = builder.finalize()?;
        Ok(CrawlOutcome::new(catalog, runner.diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlOptions;
    use crate::info_level::{InfoLevel, MetadataCategory};
    use crate::models::DatabaseInfo;
    use crate::provider::{
        DatabaseSnapshot, Operation, SnapshotProvider, SnapshotSchema, SnapshotTable, TableRow,
    };

    fn table(name: &str) -> SnapshotTable {
        SnapshotTable {
            table: TableRow {
                name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn snapshot() -> DatabaseSnapshot {
        DatabaseSnapshot {
            database_info: DatabaseInfo {
                product_name: "TestDB".to_string(),
                ..Default::default()
            },
            schemas: vec![SnapshotSchema {
                name: "app".to_string(),
                tables: vec![table("users"), table("orders")],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn config(level: InfoLevel) -> CrawlConfig {
        CrawlOptions {
            info_level: Some(level.as_str().to_string()),
            ..Default::default()
        }
        .into_config()
        .unwrap()
    }

    #[tokio::test]
    async fn test_crawl_success_releases_connection() {
        let provider = SnapshotProvider::new(snapshot());
        let config = config(InfoLevel::Standard);

        let outcome = MetadataCrawler::new(&provider, &config).crawl().await.unwrap();

        assert_eq!(outcome.status, CrawlStatus::Success);
        assert_eq!(outcome.catalog.table_count(), 2);
        assert_eq!(provider.connections_opened(), 1);
        assert_eq!(provider.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_minimum_level_skips_columns() {
        let provider = SnapshotProvider::new(snapshot());
        let config = config(InfoLevel::Minimum);

        MetadataCrawler::new(&provider, &config).crawl().await.unwrap();

        assert!(
            provider
                .calls()
                .iter()
                .all(|call| call.operation != Operation::ListColumns)
        );
    }

    #[tokio::test]
    async fn test_unsupported_category_is_partial_success() {
        let provider =
            SnapshotProvider::new(snapshot()).with_unsupported(MetadataCategory::Indexes);
        let config = config(InfoLevel::Standard);

        let outcome = MetadataCrawler::new(&provider, &config).crawl().await.unwrap();

        assert!(outcome.is_partial());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].category, MetadataCategory::Indexes);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_opens_nothing() {
        let provider = SnapshotProvider::new(snapshot());
        let config = config(InfoLevel::Standard);
        let token = CancellationToken::new();
        token.cancel();

        let result = MetadataCrawler::new(&provider, &config)
            .with_cancellation(token)
            .crawl()
            .await;

        assert!(matches!(result, Err(CrawlError::Cancelled)));
        assert_eq!(provider.connections_opened(), 0);
    }
}
