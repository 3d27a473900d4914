//! SQLite end-to-end crawl tests.
//!
//! Each test builds a database file in a temporary directory with a
//! writable pool, then crawls it read-only through `create_provider`.

#![cfg(feature = "sqlite")]

use std::path::Path;

use dbcrawler_core::{
    ConnectionConfig, CrawlOptions, CrawlOutcome, DiagnosticKind, MetadataCategory,
    MetadataCrawler, RenderOptions, Result, create_provider, render,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

const SCHEMA: &[&str] = &[
    "CREATE TABLE authors (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        born DATE
    )",
    "CREATE TABLE titles (
        id INTEGER PRIMARY KEY,
        author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        price NUMERIC DEFAULT 0
    )",
    "CREATE INDEX titles_author_idx ON titles(author_id, title DESC)",
    "CREATE TABLE reviews (
        title_id INTEGER NOT NULL REFERENCES titles,
        reviewer TEXT NOT NULL,
        PRIMARY KEY (title_id, reviewer)
    )",
    "CREATE VIEW author_titles AS
        SELECT a.name AS author, t.title AS title
        FROM authors a JOIN titles t ON t.author_id = a.id",
    "INSERT INTO authors (id, name) VALUES (1, 'Le Guin'), (2, 'Pratchett')",
    "INSERT INTO titles (id, author_id, title) VALUES (1, 1, 'The Dispossessed')",
];

/// Creates `bookstore.db` in `dir` and returns its path.
async fn create_database(dir: &Path) -> String {
    create_database_with(dir, SCHEMA).await
}

async fn create_database_with(dir: &Path, statements: &[&str]) -> String {
    let path = dir.join("bookstore.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("fixture database should open");

    for statement in statements {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("fixture statement should run");
    }
    pool.close().await;

    path.to_str().expect("temp path is UTF-8").to_string()
}

async fn crawl(database: &str, level: &str) -> Result<CrawlOutcome> {
    let provider = create_provider(database, ConnectionConfig::from_url(database))?;
    let config = CrawlOptions {
        info_level: Some(level.to_string()),
        ..Default::default()
    }
    .into_config()?;
    MetadataCrawler::new(provider.as_ref(), &config).crawl().await
}

#[tokio::test]
async fn test_sqlite_standard_crawl() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let database = create_database(dir.path()).await;

    let outcome = crawl(&database, "standard").await?;

    assert_eq!(outcome.catalog.database_info().product_name, "SQLite");
    assert_eq!(
        outcome.catalog.database_info().catalog_name.as_deref(),
        Some("bookstore")
    );
    let schemas: Vec<&str> = outcome
        .catalog
        .schemas()
        .iter()
        .map(|schema| schema.name.as_str())
        .collect();
    assert_eq!(schemas, vec!["main"]);
    assert_eq!(outcome.catalog.table_count(), 4);

    // Routines are requested at standard but SQLite has none
    assert!(outcome.is_partial());
    assert!(
        outcome
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::CapabilityGap)
    );
    assert!(
        outcome
            .diagnostics
            .iter()
            .any(|d| d.category == MetadataCategory::Routines)
    );

    let report = render(&outcome, &RenderOptions::default())?;
    assert!(report.contains("  table main.authors\n    column id INTEGER not null pk\n"));
    assert!(report.contains("    column name TEXT not null\n"));
    assert!(report.contains("    column born DATE null\n"));
    assert!(report.contains("    primary key pk_authors (id)\n"));
    assert!(report.contains("    unique index sqlite_autoindex_authors_1 (name asc)\n"));
    assert!(report.contains("    index titles_author_idx (author_id asc, title desc)\n"));
    assert!(report.contains(
        "    foreign key fk_titles_0 (author_id) -> main.authors (id) on update no action on delete cascade\n"
    ));
    assert!(report.contains("  view main.author_titles\n"));
    Ok(())
}

#[tokio::test]
async fn test_sqlite_tables_resembling_internal_names_are_kept() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let database = create_database_with(
        dir.path(),
        &[
            "CREATE TABLE books (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT)",
            "CREATE TABLE SQLiteStats (name TEXT)",
            "CREATE TABLE sqlite3x (id INTEGER)",
            "INSERT INTO books (title) VALUES ('Mort')",
        ],
    )
    .await;

    let outcome = crawl(&database, "standard").await?;

    let mut tables: Vec<&str> = outcome
        .catalog
        .tables()
        .map(|table| table.name.table.as_str())
        .collect();
    tables.sort_unstable();
    // AUTOINCREMENT creates the internal sqlite_sequence table
    assert_eq!(tables, vec!["SQLiteStats", "books", "sqlite3x"]);
    assert!(
        outcome
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::CapabilityGap)
    );
    Ok(())
}

#[tokio::test]
async fn test_sqlite_implicit_foreign_key_targets_primary_key() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let database = create_database(dir.path()).await;

    let outcome = crawl(&database, "standard").await?;

    let reviews = outcome
        .catalog
        .find_table("main", "reviews")
        .expect("reviews should be crawled");
    let primary_key = reviews.primary_key.as_ref().expect("composite key");
    let key_columns: Vec<&str> = primary_key
        .columns
        .iter()
        .map(|c| c.name.column.as_str())
        .collect();
    assert_eq!(key_columns, vec!["title_id", "reviewer"]);

    let foreign_key = &reviews.foreign_keys[0];
    assert!(foreign_key.is_resolved());
    assert_eq!(
        foreign_key.column_pairs[0].primary_key_column.name.column,
        "id"
    );
    Ok(())
}

#[tokio::test]
async fn test_sqlite_maximum_crawl_counts_rows() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let database = create_database(dir.path()).await;

    let outcome = crawl(&database, "maximum").await?;

    let authors = outcome.catalog.find_table("main", "authors").expect("authors");
    assert_eq!(authors.row_count, Some(2));
    let view = outcome
        .catalog
        .find_table("main", "author_titles")
        .expect("view");
    assert_eq!(view.row_count, None);

    let report = render(&outcome, &RenderOptions::default())?;
    assert!(report.contains("    constraint sqlite_autoindex_authors_1 unique (name)\n"));
    for category in [
        MetadataCategory::Routines,
        MetadataCategory::Sequences,
        MetadataCategory::Synonyms,
        MetadataCategory::TablePrivileges,
    ] {
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| d.category == category && d.kind == DiagnosticKind::CapabilityGap),
            "missing capability gap for {}",
            category
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_sqlite_crawl_is_repeatable() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    let database = create_database(dir.path()).await;

    let first = render(&crawl(&database, "maximum").await?, &RenderOptions::default())?;
    let second = render(&crawl(&database, "maximum").await?, &RenderOptions::default())?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_missing_file_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");
    let database = path.to_str().unwrap();

    let result = crawl(database, "standard").await;

    assert!(matches!(result, Err(dbcrawler_core::CrawlError::Connection { .. })));
    assert!(!path.exists());
}
