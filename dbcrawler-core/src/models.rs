//! Schema model: the frozen object graph produced by a crawl.
//!
//! Tables, routines, sequences and synonyms live in per-category arenas
//! owned by [`Catalog`]; schemas hold arena ids. Cross-object references
//! are weak: a qualified name plus an optional resolved id. A reference
//! whose target was excluded or never retrieved keeps its name and stays
//! unresolved. A `Catalog` is only produced by the model builder and has
//! no mutating API.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::PostgreSQL => write!(f, "PostgreSQL"),
            DatabaseType::SQLite => write!(f, "SQLite"),
        }
    }
}

/// Product details reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub product_name: String,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub catalog_name: Option<String>,
}

// ============================================================================
// Ids and names
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RoutineId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SequenceId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SynonymId(pub(crate) usize);

/// A column: its table plus its position in that table's column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ColumnId {
    pub table: TableId,
    pub index: usize,
}

/// Any schema-level object a synonym can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ObjectId {
    Table(TableId),
    Routine(RoutineId),
    Sequence(SequenceId),
    Synonym(SynonymId),
}

/// Qualified table name, `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn column(&self, column: impl Into<String>) -> ColumnName {
        ColumnName {
            schema: self.schema.clone(),
            table: self.table.clone(),
            column: column.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Qualified column name, `schema.table.column`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnName {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnName {
    pub fn table_name(&self) -> TableName {
        TableName::new(self.schema.clone(), self.table.clone())
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

/// Qualified name of a routine, sequence or synonym, `schema.name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectName {
    pub schema: String,
    pub name: String,
}

impl ObjectName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Weak reference to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnReference {
    pub name: ColumnName,
    pub target: Option<ColumnId>,
}

impl ColumnReference {
    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

/// Weak reference to a schema-level object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectReference {
    pub name: ObjectName,
    pub target: Option<ObjectId>,
}

impl ObjectReference {
    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

// ============================================================================
// Enumerants shared with provider rows
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Table,
    View,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Table => write!(f, "table"),
            TableKind::View => write!(f, "view"),
        }
    }
}

/// Referential actions for foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReferentialAction::NoAction => "no action",
            ReferentialAction::Restrict => "restrict",
            ReferentialAction::Cascade => "cascade",
            ReferentialAction::SetNull => "set null",
            ReferentialAction::SetDefault => "set default",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => write!(f, "asc"),
            SortDirection::Descending => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Unique,
    Check,
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintType::Unique => write!(f, "unique"),
            ConstraintType::Check => write!(f, "check"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    #[default]
    Function,
    Procedure,
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineKind::Function => write!(f, "function"),
            RoutineKind::Procedure => write!(f, "procedure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    #[default]
    In,
    Out,
    InOut,
    Return,
}

impl fmt::Display for ParameterDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterDirection::In => write!(f, "in"),
            ParameterDirection::Out => write!(f, "out"),
            ParameterDirection::InOut => write!(f, "inout"),
            ParameterDirection::Return => write!(f, "return"),
        }
    }
}

// ============================================================================
// Objects
// ============================================================================

/// One grant of a privilege.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Grant {
    pub grantee: String,
    pub grantor: Option<String>,
    pub is_grantable: bool,
}

/// A privilege (SELECT, INSERT, ...) with all of its grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Privilege {
    pub name: String,
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub ordinal_position: u32,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub is_part_of_primary_key: bool,
    pub remarks: Option<String>,
    pub privileges: Vec<Privilege>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<ColumnReference>,
}

/// Unique or check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableConstraint {
    pub name: String,
    pub constraint_type: ConstraintType,
    pub columns: Vec<ColumnReference>,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexColumn {
    pub column: ColumnReference,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub name: String,
    pub is_unique: bool,
    pub columns: Vec<IndexColumn>,
}

/// Referencing column in the child table paired with the referenced column
/// in the parent table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyColumnPair {
    pub foreign_key_column: ColumnReference,
    pub primary_key_column: ColumnReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub column_pairs: Vec<ForeignKeyColumnPair>,
    pub update_rule: ReferentialAction,
    pub delete_rule: ReferentialAction,
}

impl ForeignKey {
    /// The parent table, taken from the first referenced column.
    pub fn referenced_table(&self) -> Option<TableName> {
        self.column_pairs
            .first()
            .map(|pair| pair.primary_key_column.name.table_name())
    }

    /// Whether every referenced column resolved to a column in the model.
    pub fn is_resolved(&self) -> bool {
        self.column_pairs
            .iter()
            .all(|pair| pair.primary_key_column.is_resolved())
    }
}

/// A table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub name: TableName,
    pub kind: TableKind,
    pub remarks: Option<String>,
    /// Columns in retrieval ordinal order
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub constraints: Vec<TableConstraint>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    pub privileges: Vec<Privilege>,
    pub row_count: Option<u64>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub ordinal_position: u32,
    pub data_type: String,
    pub direction: ParameterDirection,
}

/// A function or procedure, identified by its specific name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Routine {
    pub name: ObjectName,
    pub specific_name: String,
    pub kind: RoutineKind,
    pub return_type: Option<String>,
    pub remarks: Option<String>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sequence {
    pub name: ObjectName,
    pub increment: i64,
    pub minimum_value: Option<i64>,
    pub maximum_value: Option<i64>,
    pub cycle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Synonym {
    pub name: ObjectName,
    pub referent: ObjectReference,
}

/// A schema and the ids of the objects it owns, each list sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub name: String,
    pub tables: Vec<TableId>,
    pub routines: Vec<RoutineId>,
    pub sequences: Vec<SequenceId>,
    pub synonyms: Vec<SynonymId>,
}

// ============================================================================
// Catalog
// ============================================================================

/// Root of the frozen model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    database_info: DatabaseInfo,
    schemas: Vec<Schema>,
    tables: Vec<Table>,
    routines: Vec<Routine>,
    sequences: Vec<Sequence>,
    synonyms: Vec<Synonym>,
    #[serde(skip)]
    table_index: HashMap<TableName, TableId>,
}

impl Catalog {
    pub(crate) fn from_parts(
        database_info: DatabaseInfo,
        schemas: Vec<Schema>,
        tables: Vec<Table>,
        routines: Vec<Routine>,
        sequences: Vec<Sequence>,
        synonyms: Vec<Synonym>,
    ) -> Self {
        let table_index = tables
            .iter()
            .enumerate()
            .map(|(index, table)| (table.name.clone(), TableId(index)))
            .collect();
        Self {
            database_info,
            schemas,
            tables,
            routines,
            sequences,
            synonyms,
            table_index,
        }
    }

    pub fn database_info(&self) -> &DatabaseInfo {
        &self.database_info
    }

    /// Schemas sorted by name.
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|schema| schema.name == name)
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.0)
    }

    pub fn routine(&self, id: RoutineId) -> Option<&Routine> {
        self.routines.get(id.0)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(id.0)
    }

    pub fn synonym(&self, id: SynonymId) -> Option<&Synonym> {
        self.synonyms.get(id.0)
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.table(id.table)
            .and_then(|table| table.columns.get(id.index))
    }

    /// Looks a table up by qualified name.
    pub fn find_table(&self, schema: &str, table: &str) -> Option<&Table> {
        self.table_index
            .get(&TableName::new(schema, table))
            .and_then(|id| self.table(*id))
    }

    /// All tables, in schema then name order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn routines(&self) -> impl Iterator<Item = &Routine> {
        self.routines.iter()
    }

    pub fn sequences(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.iter()
    }

    pub fn synonyms(&self) -> impl Iterator<Item = &Synonym> {
        self.synonyms.iter()
    }

    pub fn tables_in<'a>(&'a self, schema: &'a Schema) -> impl Iterator<Item = &'a Table> + 'a {
        schema.tables.iter().filter_map(|id| self.table(*id))
    }

    pub fn routines_in<'a>(&'a self, schema: &'a Schema) -> impl Iterator<Item = &'a Routine> + 'a {
        schema.routines.iter().filter_map(|id| self.routine(*id))
    }

    pub fn sequences_in<'a>(
        &'a self,
        schema: &'a Schema,
    ) -> impl Iterator<Item = &'a Sequence> + 'a {
        schema.sequences.iter().filter_map(|id| self.sequence(*id))
    }

    pub fn synonyms_in<'a>(&'a self, schema: &'a Schema) -> impl Iterator<Item = &'a Synonym> + 'a {
        schema.synonyms.iter().filter_map(|id| self.synonym(*id))
    }

    /// Qualified display name of a resolved object id.
    pub fn object_name(&self, id: ObjectId) -> Option<String> {
        match id {
            ObjectId::Table(id) => self.table(id).map(|t| t.name.to_string()),
            ObjectId::Routine(id) => self.routine(id).map(|r| r.name.to_string()),
            ObjectId::Sequence(id) => self.sequence(id).map(|s| s.name.to_string()),
            ObjectId::Synonym(id) => self.synonym(id).map(|s| s.name.to_string()),
        }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names() {
        let table = TableName::new("books", "authors");
        assert_eq!(table.to_string(), "books.authors");
        assert_eq!(table.column("id").to_string(), "books.authors.id");
        assert_eq!(table.column("id").table_name(), table);
        assert_eq!(ObjectName::new("books", "new_publisher").to_string(), "books.new_publisher");
    }

    #[test]
    fn test_enumerant_display() {
        assert_eq!(ReferentialAction::SetNull.to_string(), "set null");
        assert_eq!(SortDirection::Descending.to_string(), "desc");
        assert_eq!(ParameterDirection::InOut.to_string(), "inout");
        assert_eq!(TableKind::View.to_string(), "view");
    }

    #[test]
    fn test_enumerant_serde_names() {
        let json = serde_json::to_string(&ReferentialAction::SetDefault).unwrap();
        assert_eq!(json, "\"set_default\"");
        let kind: TableKind = serde_json::from_str("\"view\"").unwrap();
        assert_eq!(kind, TableKind::View);
    }

    #[test]
    fn test_foreign_key_resolution_state() {
        let child = TableName::new("sales", "orders");
        let parent = TableName::new("legacy", "customers");
        let fk = ForeignKey {
            name: "fk_orders_customer".to_string(),
            column_pairs: vec![ForeignKeyColumnPair {
                foreign_key_column: ColumnReference {
                    name: child.column("customer_id"),
                    target: Some(ColumnId {
                        table: TableId(0),
                        index: 1,
                    }),
                },
                primary_key_column: ColumnReference {
                    name: parent.column("id"),
                    target: None,
                },
            }],
            update_rule: ReferentialAction::NoAction,
            delete_rule: ReferentialAction::Cascade,
        };

        assert!(!fk.is_resolved());
        assert_eq!(fk.referenced_table(), Some(parent));
    }

    #[test]
    fn test_catalog_lookup() {
        let table = Table {
            name: TableName::new("books", "authors"),
            kind: TableKind::Table,
            remarks: None,
            columns: vec![],
            primary_key: None,
            constraints: vec![],
            indexes: vec![],
            foreign_keys: vec![],
            privileges: vec![],
            row_count: None,
        };
        let schema = Schema {
            name: "books".to_string(),
            tables: vec![TableId(0)],
            routines: vec![],
            sequences: vec![],
            synonyms: vec![],
        };
        let catalog = Catalog::from_parts(
            DatabaseInfo::default(),
            vec![schema],
            vec![table],
            vec![],
            vec![],
            vec![],
        );

        assert!(catalog.find_table("books", "authors").is_some());
        assert!(catalog.find_table("books", "missing").is_none());
        assert_eq!(catalog.tables_in(&catalog.schemas()[0]).count(), 1);
        assert_eq!(
            catalog.object_name(ObjectId::Table(TableId(0))).as_deref(),
            Some("books.authors")
        );
        assert!(catalog.table(TableId(7)).is_none());
    }
}
