//! Command-line front end for dbcrawler.
//!
//! The binary in `main.rs` only parses arguments, sets up logging and
//! cancellation, and maps the result to an exit code. Everything else lives
//! here so it can be tested without spawning a process.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dbcrawler_core::config::{ConnectionConfig, CrawlOptions};
use dbcrawler_core::error::{CrawlError, Result};
use dbcrawler_core::info_level::{InfoLevel, MetadataCategory, SchemaInfoLevel};
use dbcrawler_core::render::OutputFormat;
use dbcrawler_core::CrawlStatus;
use tokio_util::sync::CancellationToken;

pub mod crawl;
pub mod output;

/// Exit code for a crawl that completed with diagnostics.
pub const EXIT_PARTIAL: u8 = 2;

/// Exit code for a fatal error.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, Parser)]
#[command(name = "dbcrawler")]
#[command(about = "Database metadata crawler")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "
dbcrawler - Deterministic database metadata reports

Reads schemas, tables, columns, keys, indexes, routines, sequences, synonyms
and privileges through a read-only connection and renders them as a stable,
diff-friendly text or JSON report.

SUPPORTED SOURCES:
- PostgreSQL (postgres:// or postgresql://)
- SQLite (sqlite:// or .db/.sqlite/.sqlite3 files)
- JSON metadata snapshots (--snapshot)

EXIT CODES:
  0  crawl completed
  2  crawl completed with diagnostics (partial success)
  1  fatal error

EXAMPLES:
  dbcrawler --database-url postgres://reader@localhost/books
  dbcrawler --info-level maximum --include-schemas '^books$' --database-url sqlite:///data/books.db
  dbcrawler crawl --snapshot books.json --portable-names --format json -o books.json
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Crawl options used when no subcommand is given
    #[command(flatten)]
    pub crawl: CrawlArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl a database and render its metadata (default)
    Crawl(CrawlArgs),
    /// Test database connectivity
    Test(TestArgs),
    /// List info-level presets and the categories they retrieve
    InfoLevels,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Where metadata is read from.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Database connection string (credentials are redacted in logs)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Crawl a JSON metadata snapshot instead of a live database; takes
    /// precedence over --database-url
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Per-query timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub query_timeout: Option<u64>,
}

impl SourceArgs {
    /// Connection settings derived from the URL and timeout flags.
    pub fn connection_config(&self, database_url: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::from_url(database_url);
        if let Some(secs) = self.connect_timeout {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.query_timeout {
            config = config.with_query_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct CrawlArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// JSON crawl options file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Detail level: minimum, standard, detailed, maximum or custom
    #[arg(long, value_name = "LEVEL")]
    pub info_level: Option<String>,

    /// Schemas to include (regex over the schema name)
    #[arg(long, value_name = "REGEX")]
    pub include_schemas: Option<String>,

    /// Schemas to exclude (regex over the schema name)
    #[arg(long, value_name = "REGEX")]
    pub exclude_schemas: Option<String>,

    /// Tables to include (regex over schema.table)
    #[arg(long, value_name = "REGEX")]
    pub include_tables: Option<String>,

    /// Tables to exclude (regex over schema.table)
    #[arg(long, value_name = "REGEX")]
    pub exclude_tables: Option<String>,

    /// Columns to include (regex over schema.table.column)
    #[arg(long, value_name = "REGEX")]
    pub include_columns: Option<String>,

    /// Columns to exclude (regex over schema.table.column)
    #[arg(long, value_name = "REGEX")]
    pub exclude_columns: Option<String>,

    /// Routines to include (regex over schema.routine)
    #[arg(long, value_name = "REGEX")]
    pub include_routines: Option<String>,

    /// Routines to exclude (regex over schema.routine)
    #[arg(long, value_name = "REGEX")]
    pub exclude_routines: Option<String>,

    /// Sequences to include (regex over schema.sequence)
    #[arg(long, value_name = "REGEX")]
    pub include_sequences: Option<String>,

    /// Sequences to exclude (regex over schema.sequence)
    #[arg(long, value_name = "REGEX")]
    pub exclude_sequences: Option<String>,

    /// Synonyms to include (regex over schema.synonym)
    #[arg(long, value_name = "REGEX")]
    pub include_synonyms: Option<String>,

    /// Synonyms to exclude (regex over schema.synonym)
    #[arg(long, value_name = "REGEX")]
    pub exclude_synonyms: Option<String>,

    /// Turn metadata categories on regardless of the info level
    #[arg(long, value_name = "CATEGORY", value_delimiter = ',')]
    pub enable: Vec<MetadataCategory>,

    /// Turn metadata categories off regardless of the info level
    #[arg(long, value_name = "CATEGORY", value_delimiter = ',')]
    pub disable: Vec<MetadataCategory>,

    /// Normalize identifiers so reports compare across database products
    /// (text format only)
    #[arg(long)]
    pub portable_names: bool,

    /// Report format
    #[arg(long, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Maximum concurrent metadata queries within a phase (1-50)
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,
}

impl CrawlArgs {
    /// Maps the command-line flags onto crawl options.
    ///
    /// Only flags that were given are set, so the result can be layered over
    /// a config file with [`CrawlOptions::merge`].
    ///
    /// # Errors
    /// Returns a configuration error when a category is both enabled and
    /// disabled.
    pub fn to_options(&self) -> Result<CrawlOptions> {
        if let Some(category) = self.enable.iter().find(|c| self.disable.contains(c)) {
            return Err(CrawlError::configuration(format!(
                "Category '{}' is both enabled and disabled",
                category
            )));
        }

        let info_level_overrides = self
            .enable
            .iter()
            .map(|category| (*category, true))
            .chain(self.disable.iter().map(|category| (*category, false)))
            .collect();

        Ok(CrawlOptions {
            info_level: self.info_level.clone(),
            schema_inclusion_pattern: self.include_schemas.clone(),
            schema_exclusion_pattern: self.exclude_schemas.clone(),
            table_inclusion_pattern: self.include_tables.clone(),
            table_exclusion_pattern: self.exclude_tables.clone(),
            column_inclusion_pattern: self.include_columns.clone(),
            column_exclusion_pattern: self.exclude_columns.clone(),
            routine_inclusion_pattern: self.include_routines.clone(),
            routine_exclusion_pattern: self.exclude_routines.clone(),
            sequence_inclusion_pattern: self.include_sequences.clone(),
            sequence_exclusion_pattern: self.exclude_sequences.clone(),
            synonym_inclusion_pattern: self.include_synonyms.clone(),
            synonym_exclusion_pattern: self.exclude_synonyms.clone(),
            info_level_overrides,
            max_concurrent_queries: self.max_concurrency,
            portable_names: self.portable_names.then_some(true),
        })
    }
}

#[derive(Debug, Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

/// Maps a completed crawl to the process exit code.
pub fn exit_code(status: CrawlStatus) -> u8 {
    match status {
        CrawlStatus::Success => 0,
        CrawlStatus::PartialSuccess => EXIT_PARTIAL,
    }
}

/// Runs the parsed command and returns the exit code.
///
/// # Errors
/// Returns any fatal [`CrawlError`]; partial success is not an error.
pub async fn run(cli: &Cli, token: CancellationToken) -> Result<u8> {
    match &cli.command {
        Some(Command::Crawl(args)) => crawl::run_crawl(args, token).await.map(exit_code),
        Some(Command::Test(args)) => {
            let message = crawl::test_connection(&args.source).await?;
            output::write_report(&format!("{}\n", message), None).await?;
            Ok(0)
        }
        Some(Command::InfoLevels) => {
            output::write_report(&describe_info_levels(), None).await?;
            Ok(0)
        }
        None => crawl::run_crawl(&cli.crawl, token).await.map(exit_code),
    }
}

/// Lists each preset with the categories it retrieves.
pub fn describe_info_levels() -> String {
    let mut text = String::new();
    for level in InfoLevel::PRESETS {
        let categories: Vec<&str> = SchemaInfoLevel::preset(level)
            .enabled()
            .map(MetadataCategory::as_str)
            .collect();
        text.push_str(&format!("{:<9} {}\n", level.as_str(), categories.join(", ")));
    }
    text.push_str("custom    none until enabled with --enable\n");
    text
}
