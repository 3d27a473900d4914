//! Raw metadata rows returned by providers.
//!
//! Rows carry only what the provider reported; the owning schema or table is
//! implied by the call that returned them. Row order is not meaningful.

use serde::{Deserialize, Serialize};

use crate::models::{
    ParameterDirection, ReferentialAction, RoutineKind, SortDirection, TableKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRow {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub name: String,
    #[serde(default)]
    pub kind: TableKind,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRow {
    pub name: String,
    pub ordinal_position: u32,
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

fn default_nullable() -> bool {
    true
}

/// Kind of a table-level constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRow {
    pub name: String,
    pub kind: ConstraintKind,
    /// Constrained columns in key order
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyColumnRow {
    pub column: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRow {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    /// Column pairs in key order
    pub columns: Vec<ForeignKeyColumnRow>,
    #[serde(default)]
    pub update_rule: ReferentialAction,
    #[serde(default)]
    pub delete_rule: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumnRow {
    pub name: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub name: String,
    #[serde(default)]
    pub is_unique: bool,
    /// Indexed columns in index order
    pub columns: Vec<IndexColumnRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineRow {
    pub name: String,
    /// Unique name distinguishing overloads; defaults to `name`
    #[serde(default)]
    pub specific_name: Option<String>,
    #[serde(default)]
    pub kind: RoutineKind,
    #[serde(default)]
    pub return_type: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl RoutineRow {
    pub fn specific_name(&self) -> &str {
        self.specific_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRow {
    pub name: String,
    pub ordinal_position: u32,
    pub data_type: String,
    #[serde(default)]
    pub direction: ParameterDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRow {
    pub name: String,
    #[serde(default = "default_increment")]
    pub increment: i64,
    #[serde(default)]
    pub minimum_value: Option<i64>,
    #[serde(default)]
    pub maximum_value: Option<i64>,
    #[serde(default)]
    pub cycle: bool,
}

fn default_increment() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymRow {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_object: String,
}

/// One grant of a table or column privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeRow {
    pub privilege: String,
    #[serde(default)]
    pub grantor: Option<String>,
    pub grantee: String,
    #[serde(default)]
    pub is_grantable: bool,
    /// Set for column privileges
    #[serde(default)]
    pub column: Option<String>,
}
