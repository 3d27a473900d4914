//! Crawler scenarios against the snapshot provider.
//!
//! This test suite covers:
//! - Inclusion filtering across schemas, tables and columns
//! - Capability gaps and per-object retrieval failures
//! - Unresolved references to excluded objects
//! - Determinism under shuffled row order and varying concurrency
//! - Cancellation and connection loss

use dbcrawler_core::provider::{DatabaseSnapshot, Operation, RowOrder, SnapshotProvider};
use dbcrawler_core::{
    CrawlError, CrawlOptions, CrawlOutcome, CrawlStatus, DiagnosticKind, MetadataCategory,
    MetadataCrawler, OutputFormat, RenderOptions, Result, render,
};
use tokio_util::sync::CancellationToken;

const BOOKSTORE: &str = include_str!("fixtures/bookstore.json");

fn bookstore() -> DatabaseSnapshot {
    DatabaseSnapshot::from_json_str(BOOKSTORE).expect("fixture should parse")
}

fn options(level: &str) -> CrawlOptions {
    CrawlOptions {
        info_level: Some(level.to_string()),
        ..Default::default()
    }
}

async fn crawl(provider: &SnapshotProvider, options: CrawlOptions) -> Result<CrawlOutcome> {
    let config = options.into_config()?;
    MetadataCrawler::new(provider, &config).crawl().await
}

fn text(outcome: &CrawlOutcome) -> String {
    render(outcome, &RenderOptions::default()).expect("text rendering should succeed")
}

// =============================================================================
// Inclusion rules
// =============================================================================

#[tokio::test]
async fn test_schema_inclusion_pattern_keeps_only_books() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(
        &provider,
        CrawlOptions {
            schema_inclusion_pattern: Some("^books$".to_string()),
            ..options("standard")
        },
    )
    .await?;

    let schemas: Vec<&str> = outcome
        .catalog
        .schemas()
        .iter()
        .map(|schema| schema.name.as_str())
        .collect();
    assert_eq!(schemas, vec!["books"]);

    // Excluded schemas are never descended into
    assert!(provider.calls().iter().all(|call| {
        call.operation != Operation::ListTables || call.object == "books"
    }));
    Ok(())
}

#[tokio::test]
async fn test_table_and_column_rules() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(
        &provider,
        CrawlOptions {
            table_exclusion_pattern: Some(r"books\.author_titles".to_string()),
            column_exclusion_pattern: Some(r".*\.born".to_string()),
            ..options("standard")
        },
    )
    .await?;

    assert!(outcome.catalog.find_table("books", "author_titles").is_none());
    let authors = outcome
        .catalog
        .find_table("books", "authors")
        .expect("authors should be crawled");
    let columns: Vec<&str> = authors.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "name"]);

    // An excluded table is never queried for columns
    assert!(provider.calls().iter().all(|call| {
        call.operation != Operation::ListColumns || call.object != "books.author_titles"
    }));
    Ok(())
}

#[tokio::test]
async fn test_exclusion_wins_over_inclusion() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(
        &provider,
        CrawlOptions {
            schema_inclusion_pattern: Some("books|sales".to_string()),
            schema_exclusion_pattern: Some("sales".to_string()),
            ..options("minimum")
        },
    )
    .await?;

    assert!(outcome.catalog.schema("books").is_some());
    assert!(outcome.catalog.schema("sales").is_none());
    assert!(outcome.catalog.schema("legacy").is_none());
    Ok(())
}

// =============================================================================
// Info levels
// =============================================================================

#[tokio::test]
async fn test_minimum_level_reads_names_only() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(&provider, options("minimum")).await?;

    assert_eq!(outcome.status, CrawlStatus::Success);
    assert_eq!(outcome.catalog.table_count(), 5);
    assert!(outcome.catalog.tables().all(|table| table.columns.is_empty()));
    assert!(outcome.catalog.routines().all(|r| r.parameters.is_empty()));
    assert!(
        provider
            .calls()
            .iter()
            .all(|call| call.operation != Operation::ListColumns
                && call.operation != Operation::ListRoutineParameters)
    );
    Ok(())
}

#[tokio::test]
async fn test_maximum_level_reads_everything() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(&provider, options("maximum")).await?;

    assert_eq!(outcome.status, CrawlStatus::Success, "{:?}", outcome.diagnostics);
    let report = text(&outcome);

    assert!(report.contains("    grant INSERT to editor by owner with grant option\n"));
    assert!(report.contains("      grant UPDATE to editor\n"));
    assert!(report.contains("    rows 42\n"));
    assert!(report.contains("  sequence books.titles_id_seq increment 1 min 1 max 2147483647 no cycle\n"));
    assert!(report.contains("  synonym books.writers -> books.authors\n"));
    assert!(report.contains("    constraint titles_price_check check (price) CHECK (price >= 0)\n"));
    Ok(())
}

#[tokio::test]
async fn test_overloaded_routines_stay_distinct() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(&provider, options("standard")).await?;
    let report = text(&outcome);

    assert_eq!(outcome.catalog.routines().count(), 3);
    assert!(report.contains(
        "  function books.title_count specific title_count_16401 returns bigint\n    parameter in author integer\n"
    ));
    assert!(report.contains(
        "  function books.title_count specific title_count_16402 returns bigint\n    parameter in author text\n    parameter in since date\n"
    ));
    assert!(report.contains("    parameter out changed integer\n"));
    Ok(())
}

// =============================================================================
// Capability gaps and failures
// =============================================================================

#[tokio::test]
async fn test_unsupported_sequences_at_maximum() -> Result<()> {
    let provider =
        SnapshotProvider::new(bookstore()).with_unsupported(MetadataCategory::Sequences);
    let outcome = crawl(&provider, options("maximum")).await?;

    assert_eq!(outcome.status, CrawlStatus::PartialSuccess);
    assert_eq!(outcome.diagnostics.len(), 1);
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::CapabilityGap);
    assert_eq!(diagnostic.category, MetadataCategory::Sequences);

    assert_eq!(outcome.catalog.sequences().count(), 0);
    assert!(
        provider
            .calls()
            .iter()
            .all(|call| call.operation != Operation::ListSequences)
    );

    let report = text(&outcome);
    assert!(!report.contains("  sequence "));
    assert!(report.ends_with(
        "\ndiagnostics\n  [capability gap] sequences: not supported by PostgreSQL\n"
    ));
    Ok(())
}

#[tokio::test]
async fn test_failed_object_is_omitted_and_reported() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore())
        .fail_on(Operation::ListColumns, "books.titles");
    let outcome = crawl(&provider, options("standard")).await?;

    assert!(outcome.is_partial());
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::ObjectRetrieval);
    assert_eq!(diagnostic.category, MetadataCategory::Columns);
    assert_eq!(diagnostic.object.as_deref(), Some("books.titles"));

    // The rest of the phase still ran
    let authors = outcome.catalog.find_table("books", "authors").expect("authors");
    assert_eq!(authors.columns.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_table_without_columns_is_complete() -> Result<()> {
    let snapshot = DatabaseSnapshot::from_json_str(
        r#"{
            "database_info": { "product_name": "PostgreSQL" },
            "schemas": [
                { "name": "events", "tables": [
                    { "name": "heartbeat" },
                    { "name": "ticks", "columns": [
                        { "name": "at", "ordinal_position": 1, "data_type": "timestamptz" }
                    ] }
                ] }
            ]
        }"#,
    )?;
    let provider = SnapshotProvider::new(snapshot);
    let outcome = crawl(&provider, options("standard")).await?;

    assert_eq!(outcome.status, CrawlStatus::Success, "{:?}", outcome.diagnostics);
    let heartbeat = outcome
        .catalog
        .find_table("events", "heartbeat")
        .expect("zero-column table stays in the model");
    assert!(heartbeat.columns.is_empty());
    assert!(text(&outcome).contains("  table events.heartbeat\n\n  table events.ticks\n"));
    Ok(())
}

#[tokio::test]
async fn test_foreign_key_to_excluded_schema_is_unresolved() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let outcome = crawl(
        &provider,
        CrawlOptions {
            schema_exclusion_pattern: Some("legacy".to_string()),
            ..options("standard")
        },
    )
    .await?;

    let orders = outcome.catalog.find_table("sales", "orders").expect("orders");
    assert_eq!(orders.columns.len(), 4);
    let customer_fk = orders
        .foreign_keys
        .iter()
        .find(|fk| fk.name == "orders_customer_fk")
        .expect("customer fk");
    assert!(!customer_fk.is_resolved());

    let report = text(&outcome);
    assert!(report.contains(
        "    foreign key orders_customer_fk (customer_id) -> legacy.customers (id) <unresolved> on update no action on delete no action\n"
    ));
    assert!(report.contains(
        "    foreign key orders_title_fk (title_id) -> books.titles (id) on update cascade on delete restrict\n"
    ));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_table_is_fatal() {
    let mut snapshot = bookstore();
    let duplicate = snapshot.schemas[0].tables[0].clone();
    snapshot.schemas[0].tables.push(duplicate);
    let provider = SnapshotProvider::new(snapshot);

    let result = crawl(&provider, options("minimum")).await;

    assert!(matches!(result, Err(CrawlError::ModelConsistency { .. })));
    assert_eq!(provider.open_connections(), 0);
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn test_connection_loss_aborts_and_releases() {
    let provider = SnapshotProvider::new(bookstore())
        .lose_connection_on(Operation::ListIndexes, "books.titles");

    let result = crawl(&provider, options("standard")).await;

    assert!(matches!(result, Err(CrawlError::Connection { .. })));
    assert_eq!(provider.connections_opened(), 1);
    assert_eq!(provider.open_connections(), 0);
}

#[tokio::test]
async fn test_refused_connection_is_fatal() {
    let provider = SnapshotProvider::new(bookstore()).refuse_connections();
    let result = crawl(&provider, options("standard")).await;
    assert!(matches!(result, Err(CrawlError::Connection { .. })));
}

#[tokio::test]
async fn test_cancellation_mid_crawl() {
    let token = CancellationToken::new();
    let provider = SnapshotProvider::new(bookstore()).cancel_on(
        Operation::ListColumns,
        "books.authors",
        token.clone(),
    );
    let config = options("maximum").into_config().unwrap();

    let result = MetadataCrawler::new(&provider, &config)
        .with_cancellation(token)
        .crawl()
        .await;

    assert!(matches!(result, Err(CrawlError::Cancelled)));
    assert_eq!(provider.open_connections(), 0);
    // No phase after columns was started
    assert!(
        provider
            .calls()
            .iter()
            .all(|call| call.operation != Operation::ListConstraints)
    );
}

// =============================================================================
// Determinism
// =============================================================================

#[tokio::test]
async fn test_output_independent_of_row_order_and_concurrency() -> Result<()> {
    let baseline = crawl(&SnapshotProvider::new(bookstore()), options("maximum")).await?;
    let expected_text = text(&baseline);
    let json_options = RenderOptions {
        format: OutputFormat::Json,
        portable_names: false,
    };
    let expected_json = render(&baseline, &json_options)?;

    for (seed, concurrency) in [(1_u64, 1_usize), (7, 3), (42, 50)] {
        let provider = SnapshotProvider::new(bookstore())
            .with_row_order(RowOrder::Shuffled { seed });
        let outcome = crawl(
            &provider,
            CrawlOptions {
                max_concurrent_queries: Some(concurrency),
                ..options("maximum")
            },
        )
        .await?;

        assert_eq!(text(&outcome), expected_text, "seed {}", seed);
        assert_eq!(render(&outcome, &json_options)?, expected_json, "seed {}", seed);
    }

    let reversed = SnapshotProvider::new(bookstore()).with_row_order(RowOrder::Reversed);
    assert_eq!(text(&crawl(&reversed, options("maximum")).await?), expected_text);
    Ok(())
}

#[tokio::test]
async fn test_report_header_and_order() -> Result<()> {
    let provider = SnapshotProvider::new(bookstore());
    let report = text(&crawl(&provider, options("minimum")).await?);

    assert!(report.starts_with("database PostgreSQL 16.2\ncatalog bookstore\n"));
    let books = report.find("schema books").expect("books");
    let legacy = report.find("schema legacy").expect("legacy");
    let sales = report.find("schema sales").expect("sales");
    assert!(books < legacy && legacy < sales);

    let authors = report.find("  table books.authors").expect("authors");
    let titles = report.find("  table books.titles").expect("titles");
    let view = report.find("  view books.author_titles").expect("view");
    assert!(view < authors && authors < titles);
    Ok(())
}
