//! Crawl and connection-test commands.

use dbcrawler_core::config::CrawlOptions;
use dbcrawler_core::error::{CrawlError, Result, redact_database_url};
use dbcrawler_core::provider::{
    ConnectivityProvider, DatabaseSnapshot, SnapshotProvider, create_provider,
};
use dbcrawler_core::render::{OutputFormat, RenderOptions, render};
use dbcrawler_core::{CrawlStatus, MetadataCrawler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{CrawlArgs, SourceArgs, output};

/// Builds the provider named by the source flags.
async fn open_source(source: &SourceArgs) -> Result<Box<dyn ConnectivityProvider>> {
    if let Some(path) = &source.snapshot {
        if source.database_url.is_some() {
            warn!("Both --snapshot and a database URL given; using the snapshot");
        }
        info!("Source: snapshot {}", path.display());
        let snapshot = DatabaseSnapshot::load(path).await?;
        return Ok(Box::new(SnapshotProvider::new(snapshot)));
    }

    let database_url = source.database_url.as_deref().ok_or_else(|| {
        CrawlError::configuration(
            "Database URL is required (--database-url, DATABASE_URL or --snapshot)",
        )
    })?;
    info!("Source: {}", redact_database_url(database_url));
    create_provider(database_url, source.connection_config(database_url))
}

/// Resolves the effective crawl options: config file first, flags on top.
pub async fn load_options(args: &CrawlArgs) -> Result<CrawlOptions> {
    let flags = args.to_options()?;
    match &args.config {
        Some(path) => {
            info!("Loading crawl options from {}", path.display());
            Ok(CrawlOptions::load(path).await?.merge(flags))
        }
        None => Ok(flags),
    }
}

/// Crawls the configured source and writes the rendered report.
///
/// Options are validated before any connection is opened.
///
/// # Errors
/// Returns configuration, connection, model and cancellation errors, and
/// failures writing the report.
pub async fn run_crawl(args: &CrawlArgs, token: CancellationToken) -> Result<CrawlStatus> {
    let config = load_options(args).await?.into_config()?;
    if config.portable_names() && args.format == OutputFormat::Json {
        return Err(CrawlError::configuration(
            "Portable names apply to text reports only; drop --portable-names or use --format text",
        ));
    }
    let provider = open_source(&args.source).await?;

    let outcome = MetadataCrawler::new(provider.as_ref(), &config)
        .with_cancellation(token)
        .crawl()
        .await?;

    let report = render(
        &outcome,
        &RenderOptions {
            format: args.format,
            portable_names: config.portable_names(),
        },
    )?;
    output::write_report(&report, args.output.as_deref()).await?;

    if outcome.is_partial() {
        warn!(
            "Crawl completed with {} diagnostics",
            outcome.diagnostics.len()
        );
    } else {
        info!("Crawl completed");
    }
    Ok(outcome.status)
}

/// Opens a connection, reads the product details and closes it again.
///
/// # Errors
/// Returns the connection or query error that made the test fail.
pub async fn test_connection(source: &SourceArgs) -> Result<String> {
    info!("Testing database connection...");
    let provider = open_source(source).await?;

    let connection = provider.open_connection().await?;
    let result = connection.database_info().await;
    connection.close().await;
    let database_info = result?;

    info!("Connection test successful");
    Ok(match database_info.product_version {
        Some(version) => format!(
            "Connection to {} {} successful",
            database_info.product_name, version
        ),
        None => format!("Connection to {} successful", database_info.product_name),
    })
}
