//! Crawl configuration.
//!
//! `CrawlOptions` is the serializable, partially-specified form read from a
//! JSON file or assembled from CLI flags. It is validated once into an
//! immutable `CrawlConfig` before any connection is opened.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CrawlError, Result};
use crate::inclusion::{InclusionRule, InclusionRules, RuleCategory};
use crate::info_level::{InfoLevel, MetadataCategory, SchemaInfoLevel};

/// Default bound on concurrent per-object retrievals within a phase.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 5;

/// Upper bound on concurrent per-object retrievals within a phase.
pub const MAX_CONCURRENT_QUERIES_LIMIT: usize = 50;

/// User-facing crawl options.
///
/// Every field is optional so option sets from several sources can be
/// layered with [`CrawlOptions::merge`].
///
/// # Example
/// ```rust
/// use dbcrawler_core::config::CrawlOptions;
///
/// let options = CrawlOptions::from_json_str(
///     r#"{ "infoLevel": "maximum", "schemaInclusionPattern": "books" }"#,
/// )
/// .unwrap();
/// let config = options.into_config().unwrap();
///
/// assert!(config.rules().schemas.included("books"));
/// assert!(!config.rules().schemas.included("sales"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CrawlOptions {
    pub info_level: Option<String>,
    pub schema_inclusion_pattern: Option<String>,
    pub schema_exclusion_pattern: Option<String>,
    pub table_inclusion_pattern: Option<String>,
    pub table_exclusion_pattern: Option<String>,
    pub column_inclusion_pattern: Option<String>,
    pub column_exclusion_pattern: Option<String>,
    pub routine_inclusion_pattern: Option<String>,
    pub routine_exclusion_pattern: Option<String>,
    pub sequence_inclusion_pattern: Option<String>,
    pub sequence_exclusion_pattern: Option<String>,
    pub synonym_inclusion_pattern: Option<String>,
    pub synonym_exclusion_pattern: Option<String>,
    pub info_level_overrides: BTreeMap<MetadataCategory, bool>,
    pub max_concurrent_queries: Option<usize>,
    pub portable_names: Option<bool>,
}

impl CrawlOptions {
    /// Parses options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CrawlError::Serialization {
            context: "Failed to parse crawl options".to_string(),
            source: e,
        })
    }

    /// Loads options from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CrawlError::Io {
                context: format!("Failed to read options file: {}", path.display()),
                source: e,
            })?;
        Self::from_json_str(&json)
    }

    /// Layers `overrides` on top of `self`; set values in `overrides` win.
    #[must_use]
    pub fn merge(self, overrides: CrawlOptions) -> Self {
        let mut info_level_overrides = self.info_level_overrides;
        info_level_overrides.extend(overrides.info_level_overrides);

        Self {
            info_level: overrides.info_level.or(self.info_level),
            schema_inclusion_pattern: overrides
                .schema_inclusion_pattern
                .or(self.schema_inclusion_pattern),
            schema_exclusion_pattern: overrides
                .schema_exclusion_pattern
                .or(self.schema_exclusion_pattern),
            table_inclusion_pattern: overrides
                .table_inclusion_pattern
                .or(self.table_inclusion_pattern),
            table_exclusion_pattern: overrides
                .table_exclusion_pattern
                .or(self.table_exclusion_pattern),
            column_inclusion_pattern: overrides
                .column_inclusion_pattern
                .or(self.column_inclusion_pattern),
            column_exclusion_pattern: overrides
                .column_exclusion_pattern
                .or(self.column_exclusion_pattern),
            routine_inclusion_pattern: overrides
                .routine_inclusion_pattern
                .or(self.routine_inclusion_pattern),
            routine_exclusion_pattern: overrides
                .routine_exclusion_pattern
                .or(self.routine_exclusion_pattern),
            sequence_inclusion_pattern: overrides
                .sequence_inclusion_pattern
                .or(self.sequence_inclusion_pattern),
            sequence_exclusion_pattern: overrides
                .sequence_exclusion_pattern
                .or(self.sequence_exclusion_pattern),
            synonym_inclusion_pattern: overrides
                .synonym_inclusion_pattern
                .or(self.synonym_inclusion_pattern),
            synonym_exclusion_pattern: overrides
                .synonym_exclusion_pattern
                .or(self.synonym_exclusion_pattern),
            info_level_overrides,
            max_concurrent_queries: overrides
                .max_concurrent_queries
                .or(self.max_concurrent_queries),
            portable_names: overrides.portable_names.or(self.portable_names),
        }
    }

    fn patterns(&self, category: RuleCategory) -> (Option<&str>, Option<&str>) {
        let (include, exclude) = match category {
            RuleCategory::Schemas => (
                &self.schema_inclusion_pattern,
                &self.schema_exclusion_pattern,
            ),
            RuleCategory::Tables => (&self.table_inclusion_pattern, &self.table_exclusion_pattern),
            RuleCategory::Columns => (
                &self.column_inclusion_pattern,
                &self.column_exclusion_pattern,
            ),
            RuleCategory::Routines => (
                &self.routine_inclusion_pattern,
                &self.routine_exclusion_pattern,
            ),
            RuleCategory::Sequences => (
                &self.sequence_inclusion_pattern,
                &self.sequence_exclusion_pattern,
            ),
            RuleCategory::Synonyms => (
                &self.synonym_inclusion_pattern,
                &self.synonym_exclusion_pattern,
            ),
        };
        (include.as_deref(), exclude.as_deref())
    }

    /// Validates the options into an immutable [`CrawlConfig`].
    ///
    /// # Errors
    /// Returns `CrawlError::InvalidPattern` for a pattern that does not
    /// compile and `CrawlError::Configuration` for an unknown info level,
    /// an out-of-range concurrency bound or conflicting switches.
    pub fn into_config(self) -> Result<CrawlConfig> {
        let level = self
            .info_level
            .as_deref()
            .map(str::parse::<InfoLevel>)
            .transpose()?
            .unwrap_or_default();
        let info_level = SchemaInfoLevel::preset(level).with_overrides(&self.info_level_overrides);

        let mut rules = InclusionRules::default();
        for category in RuleCategory::ALL {
            let (include, exclude) = self.patterns(category);
            *rules.rule_mut(category) = InclusionRule::new(category, include, exclude)?;
        }

        CrawlConfig::new(info_level, rules)?
            .with_max_concurrent_queries(
                self.max_concurrent_queries
                    .unwrap_or(DEFAULT_MAX_CONCURRENT_QUERIES),
            )
            .map(|config| config.with_portable_names(self.portable_names.unwrap_or(false)))
    }
}

/// Validated, immutable configuration for one crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    info_level: SchemaInfoLevel,
    rules: InclusionRules,
    max_concurrent_queries: usize,
    portable_names: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            info_level: SchemaInfoLevel::default(),
            rules: InclusionRules::default(),
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            portable_names: false,
        }
    }
}

impl CrawlConfig {
    /// Creates a config from an info level and inclusion rules.
    ///
    /// # Errors
    /// Returns error if the info level switches conflict.
    pub fn new(info_level: SchemaInfoLevel, rules: InclusionRules) -> Result<Self> {
        info_level.validate()?;
        Ok(Self {
            info_level,
            rules,
            ..Default::default()
        })
    }

    /// Builder method to set max concurrent queries with validation.
    pub fn with_max_concurrent_queries(mut self, max: usize) -> Result<Self> {
        if max == 0 || max > MAX_CONCURRENT_QUERIES_LIMIT {
            return Err(CrawlError::configuration(format!(
                "max_concurrent_queries must be between 1 and {}",
                MAX_CONCURRENT_QUERIES_LIMIT
            )));
        }
        self.max_concurrent_queries = max;
        Ok(self)
    }

    /// Builder method to toggle portable naming in rendered output.
    pub fn with_portable_names(mut self, portable_names: bool) -> Self {
        self.portable_names = portable_names;
        self
    }

    pub fn info_level(&self) -> &SchemaInfoLevel {
        &self.info_level
    }

    pub fn rules(&self) -> &InclusionRules {
        &self.rules
    }

    pub fn max_concurrent_queries(&self) -> usize {
        self.max_concurrent_queries
    }

    pub fn portable_names(&self) -> bool {
        self.portable_names
    }

    pub fn is_enabled(&self, category: MetadataCategory) -> bool {
        self.info_level.is_enabled(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlOptions::default().into_config().unwrap();
        assert_eq!(config.info_level().level(), InfoLevel::Standard);
        assert_eq!(config.max_concurrent_queries(), DEFAULT_MAX_CONCURRENT_QUERIES);
        assert!(!config.portable_names());
        assert!(config.rules().schemas.is_include_all());
    }

    #[test]
    fn test_camel_case_options() {
        let options = CrawlOptions::from_json_str(
            r#"{
                "infoLevel": "detailed",
                "tableExclusionPattern": ".*\\.tmp_.*",
                "infoLevelOverrides": { "sequences": false, "table_row_counts": true },
                "maxConcurrentQueries": 8,
                "portableNames": true
            }"#,
        )
        .unwrap();
        let config = options.into_config().unwrap();

        assert_eq!(config.info_level().level(), InfoLevel::Detailed);
        assert!(!config.is_enabled(MetadataCategory::Sequences));
        assert!(config.is_enabled(MetadataCategory::TableRowCounts));
        assert!(!config.rules().tables.included("books.tmp_load"));
        assert_eq!(config.max_concurrent_queries(), 8);
        assert!(config.portable_names());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let error = CrawlOptions::from_json_str(r#"{ "schemaPattern": "books" }"#).unwrap_err();
        assert!(matches!(error, CrawlError::Serialization { .. }));
    }

    #[test]
    fn test_invalid_info_level() {
        let options = CrawlOptions {
            info_level: Some("verbose".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            options.into_config(),
            Err(CrawlError::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_fails_validation() {
        let options = CrawlOptions {
            routine_inclusion_pattern: Some("[".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            options.into_config(),
            Err(CrawlError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_concurrency_bounds() {
        for bad in [0, 51] {
            let options = CrawlOptions {
                max_concurrent_queries: Some(bad),
                ..Default::default()
            };
            assert!(options.into_config().is_err(), "{} accepted", bad);
        }
        let options = CrawlOptions {
            max_concurrent_queries: Some(50),
            ..Default::default()
        };
        assert!(options.into_config().is_ok());
    }

    #[test]
    fn test_conflicting_overrides() {
        let options = CrawlOptions {
            info_level: Some("custom".to_string()),
            info_level_overrides: BTreeMap::from([(MetadataCategory::Indexes, true)]),
            ..Default::default()
        };
        assert!(matches!(
            options.into_config(),
            Err(CrawlError::Configuration { .. })
        ));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = CrawlOptions {
            info_level: Some("maximum".to_string()),
            schema_inclusion_pattern: Some("books".to_string()),
            info_level_overrides: BTreeMap::from([(MetadataCategory::Synonyms, false)]),
            ..Default::default()
        };
        let flags = CrawlOptions {
            schema_inclusion_pattern: Some("sales".to_string()),
            info_level_overrides: BTreeMap::from([(MetadataCategory::Indexes, false)]),
            ..Default::default()
        };
        let merged = file.merge(flags);

        assert_eq!(merged.info_level.as_deref(), Some("maximum"));
        assert_eq!(merged.schema_inclusion_pattern.as_deref(), Some("sales"));
        assert_eq!(merged.info_level_overrides.len(), 2);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.json");
        tokio::fs::write(&path, r#"{ "infoLevel": "minimum" }"#)
            .await
            .unwrap();

        let options = CrawlOptions::load(&path).await.unwrap();
        assert_eq!(options.info_level.as_deref(), Some("minimum"));

        let missing = CrawlOptions::load(&dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(CrawlError::Io { .. })));
    }
}
