//! Configuration types.
//!
//! - `CrawlOptions` / `CrawlConfig`: what a crawl retrieves and filters
//! - `ConnectionConfig`: connection pool and session settings for SQL providers
//!
//! # Security
//! These configuration structs intentionally do NOT store passwords or credentials.

mod connection;
mod crawl;

pub use connection::ConnectionConfig;
pub use crawl::{
    CrawlConfig, CrawlOptions, DEFAULT_MAX_CONCURRENT_QUERIES, MAX_CONCURRENT_QUERIES_LIMIT,
};
