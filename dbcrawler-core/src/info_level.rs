//! Info-level presets deciding which metadata categories a crawl retrieves.
//!
//! Presets are cumulative: every category enabled by a lower preset is also
//! enabled by every higher one. A [`SchemaInfoLevel`] starts from a preset
//! and may have individual switches overridden.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CrawlError, Result};

/// A category of metadata that can be switched on or off.
///
/// Declaration order follows the crawl phase order, which is also the
/// order diagnostics are reported in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetadataCategory {
    Tables,
    Columns,
    PrimaryKeys,
    ForeignKeys,
    TableConstraints,
    Indexes,
    Routines,
    RoutineParameters,
    Sequences,
    Synonyms,
    TablePrivileges,
    ColumnPrivileges,
    TableRowCounts,
}

impl MetadataCategory {
    /// All categories in phase order.
    pub const ALL: [MetadataCategory; 13] = [
        Self::Tables,
        Self::Columns,
        Self::PrimaryKeys,
        Self::ForeignKeys,
        Self::TableConstraints,
        Self::Indexes,
        Self::Routines,
        Self::RoutineParameters,
        Self::Sequences,
        Self::Synonyms,
        Self::TablePrivileges,
        Self::ColumnPrivileges,
        Self::TableRowCounts,
    ];

    /// Stable snake_case name used in configuration and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Columns => "columns",
            Self::PrimaryKeys => "primary_keys",
            Self::ForeignKeys => "foreign_keys",
            Self::TableConstraints => "table_constraints",
            Self::Indexes => "indexes",
            Self::Routines => "routines",
            Self::RoutineParameters => "routine_parameters",
            Self::Sequences => "sequences",
            Self::Synonyms => "synonyms",
            Self::TablePrivileges => "table_privileges",
            Self::ColumnPrivileges => "column_privileges",
            Self::TableRowCounts => "table_row_counts",
        }
    }

    /// Category that must also be enabled for this one to have anything
    /// to attach to.
    pub fn prerequisite(self) -> Option<MetadataCategory> {
        match self {
            Self::Tables | Self::Routines | Self::Sequences | Self::Synonyms => None,
            Self::RoutineParameters => Some(Self::Routines),
            Self::ColumnPrivileges => Some(Self::Columns),
            _ => Some(Self::Tables),
        }
    }
}

impl fmt::Display for MetadataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataCategory {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                CrawlError::configuration(format!("Unknown metadata category '{}'", s))
            })
    }
}

/// Named info-level preset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InfoLevel {
    Minimum,
    #[default]
    Standard,
    Detailed,
    Maximum,
    Custom,
}

impl InfoLevel {
    /// The ordered named presets, least to most inclusive.
    pub const PRESETS: [InfoLevel; 4] = [
        Self::Minimum,
        Self::Standard,
        Self::Detailed,
        Self::Maximum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimum => "minimum",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
            Self::Maximum => "maximum",
            Self::Custom => "custom",
        }
    }

    /// Categories this preset adds on top of the preset below it.
    pub fn additions(self) -> &'static [MetadataCategory] {
        use MetadataCategory::*;
        match self {
            Self::Minimum => &[Tables, Routines],
            Self::Standard => &[
                Columns,
                PrimaryKeys,
                ForeignKeys,
                Indexes,
                RoutineParameters,
            ],
            Self::Detailed => &[TableConstraints, Sequences, Synonyms],
            Self::Maximum => &[TablePrivileges, ColumnPrivileges, TableRowCounts],
            Self::Custom => &[],
        }
    }
}

impl fmt::Display for InfoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfoLevel {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimum" => Ok(Self::Minimum),
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            "maximum" => Ok(Self::Maximum),
            "custom" => Ok(Self::Custom),
            _ => Err(CrawlError::configuration(format!(
                "Unknown info level '{}' (expected minimum, standard, detailed, maximum or custom)",
                s
            ))),
        }
    }
}

/// The effective set of category switches for one crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaInfoLevel {
    level: InfoLevel,
    enabled: BTreeSet<MetadataCategory>,
}

impl SchemaInfoLevel {
    /// Builds the switch set for a named preset.
    ///
    /// `Custom` starts with every switch off.
    pub fn preset(level: InfoLevel) -> Self {
        let enabled = InfoLevel::PRESETS
            .into_iter()
            .take_while(|preset| *preset <= level && level != InfoLevel::Custom)
            .flat_map(|preset| preset.additions().iter().copied())
            .collect();
        Self { level, enabled }
    }

    pub fn minimum() -> Self {
        Self::preset(InfoLevel::Minimum)
    }

    pub fn standard() -> Self {
        Self::preset(InfoLevel::Standard)
    }

    pub fn detailed() -> Self {
        Self::preset(InfoLevel::Detailed)
    }

    pub fn maximum() -> Self {
        Self::preset(InfoLevel::Maximum)
    }

    pub fn custom() -> Self {
        Self::preset(InfoLevel::Custom)
    }

    /// Preset this switch set was derived from.
    pub fn level(&self) -> InfoLevel {
        self.level
    }

    pub fn is_enabled(&self, category: MetadataCategory) -> bool {
        self.enabled.contains(&category)
    }

    /// Returns a copy with one switch set explicitly.
    #[must_use]
    pub fn with(mut self, category: MetadataCategory, enabled: bool) -> Self {
        if enabled {
            self.enabled.insert(category);
        } else {
            self.enabled.remove(&category);
        }
        self
    }

    /// Applies per-switch overrides; each override wins over the preset.
    #[must_use]
    pub fn with_overrides(self, overrides: &BTreeMap<MetadataCategory, bool>) -> Self {
        overrides
            .iter()
            .fold(self, |level, (category, enabled)| level.with(*category, *enabled))
    }

    /// Enabled categories in phase order.
    pub fn enabled(&self) -> impl Iterator<Item = MetadataCategory> + '_ {
        self.enabled.iter().copied()
    }

    pub fn is_superset_of(&self, other: &SchemaInfoLevel) -> bool {
        self.enabled.is_superset(&other.enabled)
    }

    /// Rejects switch sets where a category is on but the category it
    /// attaches to is off.
    pub fn validate(&self) -> Result<()> {
        let conflicts: Vec<String> = self
            .enabled()
            .filter_map(|category| {
                category
                    .prerequisite()
                    .filter(|required| !self.is_enabled(*required))
                    .map(|required| format!("{} requires {}", category, required))
            })
            .collect();

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(CrawlError::configuration(format!(
                "Conflicting info level switches: {}",
                conflicts.join(", ")
            )))
        }
    }
}

impl Default for SchemaInfoLevel {
    fn default() -> Self {
        Self::standard()
    }
}
