//! PostgreSQL connection pool setup.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{CrawlError, Result};

/// Validates a PostgreSQL connection string without opening anything.
///
/// # Errors
/// Returns a configuration error when the string is not a
/// `postgres://` or `postgresql://` URL with a host.
pub(crate) fn validate_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string)
        .map_err(|_| CrawlError::configuration("Invalid PostgreSQL connection string format"))?;

    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(CrawlError::configuration(
            "Connection string must use postgres:// or postgresql:// scheme",
        ));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(CrawlError::configuration(
            "PostgreSQL connection string must name a host",
        ));
    }

    Ok(())
}

/// Creates the pool used for one crawl.
///
/// Session settings are applied to every pooled connection:
/// - `statement_timeout` from the configured query timeout
/// - `application_name` for connection tracking
/// - `default_transaction_read_only` when read-only mode is on
pub(crate) async fn connect(connection_string: &str, config: &ConnectionConfig) -> Result<PgPool> {
    use sqlx::Executor;

    validate_connection_string(connection_string)?;

    let statement_timeout_ms = config.query_timeout.as_millis();
    let application_name = config.application_name.replace('\'', "''");
    let read_only = config.read_only;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            let application_name = application_name.clone();
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {}", statement_timeout_ms).as_str())
                    .await?;
                conn.execute(format!("SET application_name = '{}'", application_name).as_str())
                    .await?;
                if read_only {
                    conn.execute("SET default_transaction_read_only = on").await?;
                }
                Ok(())
            })
        })
        .connect(connection_string)
        .await
        .map_err(CrawlError::connection_failed)
}
