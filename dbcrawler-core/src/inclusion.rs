//! Pattern-based inclusion rules.
//!
//! Each rule holds an include pattern and an exclude pattern, both regular
//! expressions matched against the whole fully-qualified object name
//! (`schema`, `schema.table`, `schema.table.column`, `schema.routine`, ...).
//! An object is included when its name matches the include pattern and does
//! not match the exclude pattern, so exclusion always wins.

use std::fmt;

use regex::Regex;

use crate::error::{CrawlError, Result};

/// Object categories that carry their own inclusion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleCategory {
    Schemas,
    Tables,
    Columns,
    Routines,
    Sequences,
    Synonyms,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        Self::Schemas,
        Self::Tables,
        Self::Columns,
        Self::Routines,
        Self::Sequences,
        Self::Synonyms,
    ];

    fn singular(self) -> &'static str {
        match self {
            Self::Schemas => "schema",
            Self::Tables => "table",
            Self::Columns => "column",
            Self::Routines => "routine",
            Self::Sequences => "sequence",
            Self::Synonyms => "synonym",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.singular())
    }
}

#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn compile(category: RuleCategory, kind: &str, source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(|e| {
            CrawlError::invalid_pattern(format!("{} {}", category, kind), source, e)
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }
}

/// Include/exclude decision for one object category.
#[derive(Debug, Clone)]
pub struct InclusionRule {
    include: Option<Pattern>,
    exclude: Option<Pattern>,
}

impl InclusionRule {
    /// A rule that includes every name.
    pub fn include_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Compiles a rule from optional include and exclude patterns.
    ///
    /// A missing include pattern matches everything and a missing exclude
    /// pattern matches nothing.
    ///
    /// # Errors
    /// Returns `CrawlError::InvalidPattern` if either pattern is not a valid
    /// regular expression.
    pub fn new(category: RuleCategory, include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: include
                .map(|p| Pattern::compile(category, "inclusion", p))
                .transpose()?,
            exclude: exclude
                .map(|p| Pattern::compile(category, "exclusion", p))
                .transpose()?,
        })
    }

    /// Whether the fully-qualified `name` passes this rule.
    pub fn included(&self, name: &str) -> bool {
        let wanted = self
            .include
            .as_ref()
            .is_none_or(|pattern| pattern.regex.is_match(name));
        let rejected = self
            .exclude
            .as_ref()
            .is_some_and(|pattern| pattern.regex.is_match(name));
        wanted && !rejected
    }

    pub fn include_pattern(&self) -> Option<&str> {
        self.include.as_ref().map(|p| p.source.as_str())
    }

    pub fn exclude_pattern(&self) -> Option<&str> {
        self.exclude.as_ref().map(|p| p.source.as_str())
    }

    pub fn is_include_all(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}

impl Default for InclusionRule {
    fn default() -> Self {
        Self::include_all()
    }
}

impl PartialEq for InclusionRule {
    fn eq(&self, other: &Self) -> bool {
        self.include_pattern() == other.include_pattern()
            && self.exclude_pattern() == other.exclude_pattern()
    }
}

impl Eq for InclusionRule {}

/// One inclusion rule per object category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionRules {
    pub schemas: InclusionRule,
    pub tables: InclusionRule,
    pub columns: InclusionRule,
    pub routines: InclusionRule,
    pub sequences: InclusionRule,
    pub synonyms: InclusionRule,
}

impl InclusionRules {
    pub fn rule(&self, category: RuleCategory) -> &InclusionRule {
        match category {
            RuleCategory::Schemas => &self.schemas,
            RuleCategory::Tables => &self.tables,
            RuleCategory::Columns => &self.columns,
            RuleCategory::Routines => &self.routines,
            RuleCategory::Sequences => &self.sequences,
            RuleCategory::Synonyms => &self.synonyms,
        }
    }

    pub fn rule_mut(&mut self, category: RuleCategory) -> &mut InclusionRule {
        match category {
            RuleCategory::Schemas => &mut self.schemas,
            RuleCategory::Tables => &mut self.tables,
            RuleCategory::Columns => &mut self.columns,
            RuleCategory::Routines => &mut self.routines,
            RuleCategory::Sequences => &mut self.sequences,
            RuleCategory::Synonyms => &mut self.synonyms,
        }
    }

    /// Replaces the rule for one category.
    #[must_use]
    pub fn with_rule(mut self, category: RuleCategory, rule: InclusionRule) -> Self {
        *self.rule_mut(category) = rule;
        self
    }

    pub fn included(&self, category: RuleCategory, name: &str) -> bool {
        self.rule(category).included(name)
    }
}
