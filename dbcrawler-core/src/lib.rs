//! Core library for dbcrawler.
//!
//! dbcrawler reads the structural metadata of a relational database
//! (schemas, tables, columns, keys, indexes, routines, sequences, synonyms,
//! privileges) through a pluggable provider, filters it with regex inclusion
//! rules, assembles it into an immutable [`Catalog`], and renders it as a
//! deterministic text or JSON report suitable for diffing.
//!
//! # Guarantees
//! - Read-only: providers only run catalog queries
//! - Deterministic: the rendered report does not depend on retrieval order
//!   or concurrency
//! - No credentials in logs or error messages
//!
//! # Example
//! ```rust
//! use dbcrawler_core::{CrawlOptions, MetadataCrawler, RenderOptions, render};
//! use dbcrawler_core::provider::{DatabaseSnapshot, SnapshotProvider};
//!
//! # tokio_test_block_on(async {
//! let snapshot = DatabaseSnapshot::from_json_str(r#"{
//!     "database_info": { "product_name": "Snapshot" },
//!     "schemas": [{ "name": "books", "tables": [{ "name": "authors" }] }]
//! }"#)?;
//! let provider = SnapshotProvider::new(snapshot);
//! let config = CrawlOptions::default().into_config()?;
//!
//! let outcome = MetadataCrawler::new(&provider, &config).crawl().await?;
//! let report = render(&outcome, &RenderOptions::default())?;
//! assert!(report.contains("table books.authors"));
//! # Ok::<(), dbcrawler_core::CrawlError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! # Module Structure
//! - `config`: crawl options and connection settings
//! - `info_level`, `inclusion`: what to retrieve and which objects to keep
//! - `provider`: the provider seam plus snapshot, SQLite and PostgreSQL providers
//! - `crawler`: phase-ordered retrieval with bounded concurrency
//! - `builder`, `models`: model assembly and the frozen catalog
//! - `render`: text and JSON reports

pub mod builder;
pub mod config;
pub mod crawler;
pub mod diagnostics;
pub mod error;
pub mod inclusion;
pub mod info_level;
pub mod logging;
pub mod models;
pub mod provider;
pub mod render;

pub use builder::SchemaModelBuilder;
pub use config::{ConnectionConfig, CrawlConfig, CrawlOptions};
pub use crawler::{CrawlOutcome, CrawlStatus, MetadataCrawler};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{CrawlError, Result};
pub use inclusion::{InclusionRule, InclusionRules, RuleCategory};
pub use info_level::{InfoLevel, MetadataCategory, SchemaInfoLevel};
pub use models::{Catalog, DatabaseInfo, DatabaseType, Schema, Table, TableName};
pub use provider::{ConnectivityProvider, MetadataConnection, create_provider};
pub use render::{OutputFormat, RenderOptions, render};
