//! Two-phase assembly of the schema model.
//!
//! During a crawl every retrieved row is recorded under its fully-qualified
//! key; a second row with the same key in the same category is a
//! [`CrawlError::ModelConsistency`] error. [`SchemaModelBuilder::finalize`]
//! then links cross-references by key lookup, sorts every collection into
//! canonical order and freezes the result into a [`Catalog`]. Arena ids
//! are assigned only after sorting, so the frozen model does not depend on
//! the order rows arrived in.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::{CrawlError, Result};
use crate::models::{
    Catalog, Column, ColumnId, ColumnName, ColumnReference, ConstraintType, DatabaseInfo, ForeignKey,
    ForeignKeyColumnPair, Grant, Index, IndexColumn, ObjectId, ObjectName, ObjectReference,
    Parameter, PrimaryKey, Privilege, Routine, RoutineId, Schema, Sequence, SequenceId, Synonym,
    SynonymId, Table, TableConstraint, TableId, TableName,
};
use crate::provider::{
    ColumnRow, ConstraintKind, ConstraintRow, ForeignKeyRow, IndexRow, ParameterRow, PrivilegeRow,
    RoutineRow, SequenceRow, SynonymRow, TableRow,
};

#[derive(Debug)]
struct TableNode {
    name: TableName,
    row: TableRow,
    columns: Option<Vec<ColumnRow>>,
    constraints: Option<Vec<ConstraintRow>>,
    foreign_keys: Option<Vec<ForeignKeyRow>>,
    indexes: Option<Vec<IndexRow>>,
    table_privileges: Vec<PrivilegeRow>,
    column_privileges: Vec<PrivilegeRow>,
    row_count: Option<u64>,
}

#[derive(Debug)]
struct RoutineNode {
    schema: String,
    row: RoutineRow,
    parameters: Option<Vec<ParameterRow>>,
}

/// In-progress schema graph.
#[derive(Debug)]
pub struct SchemaModelBuilder {
    database_info: DatabaseInfo,
    schemas: BTreeSet<String>,
    tables: Vec<TableNode>,
    table_keys: HashMap<TableName, usize>,
    routines: Vec<RoutineNode>,
    routine_keys: HashMap<ObjectName, usize>,
    sequences: BTreeMap<ObjectName, SequenceRow>,
    synonyms: BTreeMap<ObjectName, SynonymRow>,
}

impl SchemaModelBuilder {
    pub fn new(database_info: DatabaseInfo) -> Self {
        Self {
            database_info,
            schemas: BTreeSet::new(),
            tables: Vec::new(),
            table_keys: HashMap::new(),
            routines: Vec::new(),
            routine_keys: HashMap::new(),
            sequences: BTreeMap::new(),
            synonyms: BTreeMap::new(),
        }
    }

    // ========================================================================
    // Create phase
    // ========================================================================

    pub fn add_schema(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.schemas.insert(name.clone()) {
            return Err(duplicate("schema", &name));
        }
        Ok(())
    }

    pub fn add_table(&mut self, schema: &str, row: TableRow) -> Result<TableName> {
        self.require_schema(schema)?;
        let name = TableName::new(schema, row.name.clone());
        if self.table_keys.contains_key(&name) {
            return Err(duplicate("table", &name));
        }
        self.table_keys.insert(name.clone(), self.tables.len());
        self.tables.push(TableNode {
            name: name.clone(),
            row,
            columns: None,
            constraints: None,
            foreign_keys: None,
            indexes: None,
            table_privileges: Vec::new(),
            column_privileges: Vec::new(),
            row_count: None,
        });
        Ok(name)
    }

    pub fn set_columns(&mut self, table: &TableName, columns: Vec<ColumnRow>) -> Result<()> {
        check_unique(columns.iter().map(|c| c.name.as_str()), "column", table)?;
        let node = self.table_mut(table)?;
        set_once(&mut node.columns, columns, "columns", table)
    }

    /// Records primary key, unique and check constraints of a table.
    pub fn set_constraints(
        &mut self,
        table: &TableName,
        constraints: Vec<ConstraintRow>,
    ) -> Result<()> {
        check_unique(constraints.iter().map(|c| c.name.as_str()), "constraint", table)?;
        let primary_keys = constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::PrimaryKey)
            .count();
        if primary_keys > 1 {
            return Err(CrawlError::model_consistency(format!(
                "Table '{}' reported {} primary keys",
                table, primary_keys
            )));
        }
        let node = self.table_mut(table)?;
        set_once(&mut node.constraints, constraints, "constraints", table)
    }

    pub fn set_foreign_keys(
        &mut self,
        table: &TableName,
        foreign_keys: Vec<ForeignKeyRow>,
    ) -> Result<()> {
        check_unique(
            foreign_keys.iter().map(|fk| fk.name.as_str()),
            "foreign key",
            table,
        )?;
        if let Some(empty) = foreign_keys.iter().find(|fk| fk.columns.is_empty()) {
            return Err(CrawlError::model_consistency(format!(
                "Foreign key '{}' on '{}' has no columns",
                empty.name, table
            )));
        }
        let node = self.table_mut(table)?;
        set_once(&mut node.foreign_keys, foreign_keys, "foreign keys", table)
    }

    pub fn set_indexes(&mut self, table: &TableName, indexes: Vec<IndexRow>) -> Result<()> {
        check_unique(indexes.iter().map(|i| i.name.as_str()), "index", table)?;
        let node = self.table_mut(table)?;
        set_once(&mut node.indexes, indexes, "indexes", table)
    }

    pub fn set_table_privileges(
        &mut self,
        table: &TableName,
        privileges: Vec<PrivilegeRow>,
    ) -> Result<()> {
        self.table_mut(table)?.table_privileges = privileges;
        Ok(())
    }

    pub fn set_column_privileges(
        &mut self,
        table: &TableName,
        privileges: Vec<PrivilegeRow>,
    ) -> Result<()> {
        self.table_mut(table)?.column_privileges = privileges;
        Ok(())
    }

    pub fn set_row_count(&mut self, table: &TableName, row_count: u64) -> Result<()> {
        self.table_mut(table)?.row_count = Some(row_count);
        Ok(())
    }

    /// Adds a routine keyed by `schema.specific_name`.
    pub fn add_routine(&mut self, schema: &str, row: RoutineRow) -> Result<ObjectName> {
        self.require_schema(schema)?;
        let key = ObjectName::new(schema, row.specific_name());
        if self.routine_keys.contains_key(&key) {
            return Err(duplicate("routine", &key));
        }
        self.routine_keys.insert(key.clone(), self.routines.len());
        self.routines.push(RoutineNode {
            schema: schema.to_string(),
            row,
            parameters: None,
        });
        Ok(key)
    }

    pub fn set_parameters(&mut self, routine: &ObjectName, parameters: Vec<ParameterRow>) -> Result<()> {
        let index = *self
            .routine_keys
            .get(routine)
            .ok_or_else(|| unknown("routine", routine))?;
        let node = &mut self.routines[index];
        if node.parameters.is_some() {
            return Err(CrawlError::model_consistency(format!(
                "Parameters for '{}' recorded twice",
                routine
            )));
        }
        node.parameters = Some(parameters);
        Ok(())
    }

    pub fn add_sequence(&mut self, schema: &str, row: SequenceRow) -> Result<()> {
        self.require_schema(schema)?;
        let key = ObjectName::new(schema, row.name.clone());
        if self.sequences.contains_key(&key) {
            return Err(duplicate("sequence", &key));
        }
        self.sequences.insert(key, row);
        Ok(())
    }

    pub fn add_synonym(&mut self, schema: &str, row: SynonymRow) -> Result<()> {
        self.require_schema(schema)?;
        let key = ObjectName::new(schema, row.name.clone());
        if self.synonyms.contains_key(&key) {
            return Err(duplicate("synonym", &key));
        }
        self.synonyms.insert(key, row);
        Ok(())
    }

    /// Schema names recorded so far, sorted.
    pub fn schema_names(&self) -> Vec<String> {
        self.schemas.iter().cloned().collect()
    }

    /// Table names recorded so far, sorted.
    pub fn table_names(&self) -> Vec<TableName> {
        let mut names: Vec<TableName> = self.tables.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    /// Base tables (not views) recorded so far, sorted.
    pub fn base_table_names(&self) -> Vec<TableName> {
        let mut names: Vec<TableName> = self
            .tables
            .iter()
            .filter(|t| t.row.kind == crate::models::TableKind::Table)
            .map(|t| t.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Routine keys (`schema.specific_name`) recorded so far, sorted.
    pub fn routine_keys(&self) -> Vec<ObjectName> {
        let mut keys: Vec<ObjectName> = self.routine_keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn require_schema(&self, schema: &str) -> Result<()> {
        if self.schemas.contains(schema) {
            Ok(())
        } else {
            Err(unknown("schema", &schema))
        }
    }

    fn table_mut(&mut self, table: &TableName) -> Result<&mut TableNode> {
        let index = *self
            .table_keys
            .get(table)
            .ok_or_else(|| unknown("table", table))?;
        Ok(&mut self.tables[index])
    }

    // ========================================================================
    // Link phase
    // ========================================================================

    /// Links references, sorts every collection and freezes the model.
    pub fn finalize(self) -> Result<Catalog> {
        let Self {
            database_info,
            schemas,
            mut tables,
            mut routines,
            sequences,
            synonyms,
            ..
        } = self;

        tables.sort_by(|a, b| a.name.cmp(&b.name));
        routines.sort_by(|a, b| {
            (&a.schema, &a.row.name, a.row.specific_name())
                .cmp(&(&b.schema, &b.row.name, b.row.specific_name()))
        });
        for node in &mut tables {
            if let Some(columns) = node.columns.as_mut() {
                columns.sort_by(|a, b| {
                    (a.ordinal_position, &a.name).cmp(&(b.ordinal_position, &b.name))
                });
            }
        }

        let linker = Linker::new(&tables, &routines, &sequences, &synonyms);

        let tables: Vec<Table> = tables
            .into_iter()
            .enumerate()
            .map(|(index, node)| linker.link_table(TableId(index), node))
            .collect();

        let routines: Vec<Routine> = routines.into_iter().map(link_routine).collect();

        let sequences: Vec<Sequence> = sequences
            .into_iter()
            .map(|(name, row)| Sequence {
                name,
                increment: row.increment,
                minimum_value: row.minimum_value,
                maximum_value: row.maximum_value,
                cycle: row.cycle,
            })
            .collect();

        let synonyms: Vec<Synonym> = synonyms
            .into_iter()
            .map(|(name, row)| {
                let referent = ObjectName::new(row.referenced_schema, row.referenced_object);
                Synonym {
                    name,
                    referent: ObjectReference {
                        target: linker.objects.get(&referent).copied(),
                        name: referent,
                    },
                }
            })
            .collect();

        let schemas: Vec<Schema> = schemas
            .into_iter()
            .map(|name| Schema {
                tables: ids_in(&name, tables.iter().map(|t| &t.name.schema), TableId),
                routines: ids_in(&name, routines.iter().map(|r| &r.name.schema), RoutineId),
                sequences: ids_in(&name, sequences.iter().map(|s| &s.name.schema), SequenceId),
                synonyms: ids_in(&name, synonyms.iter().map(|s| &s.name.schema), SynonymId),
                name,
            })
            .collect();

        debug!(
            "Finalized model: {} schemas, {} tables, {} routines, {} sequences, {} synonyms",
            schemas.len(),
            tables.len(),
            routines.len(),
            sequences.len(),
            synonyms.len()
        );

        Ok(Catalog::from_parts(
            database_info,
            schemas,
            tables,
            routines,
            sequences,
            synonyms,
        ))
    }
}

/// Key lookup tables built over the sorted arenas.
struct Linker {
    table_ids: HashMap<TableName, TableId>,
    column_indexes: Vec<HashMap<String, usize>>,
    objects: HashMap<ObjectName, ObjectId>,
}

impl Linker {
    fn new(
        tables: &[TableNode],
        routines: &[RoutineNode],
        sequences: &BTreeMap<ObjectName, SequenceRow>,
        synonyms: &BTreeMap<ObjectName, SynonymRow>,
    ) -> Self {
        let table_ids: HashMap<TableName, TableId> = tables
            .iter()
            .enumerate()
            .map(|(index, node)| (node.name.clone(), TableId(index)))
            .collect();

        let column_indexes = tables
            .iter()
            .map(|node| {
                node.columns
                    .iter()
                    .flatten()
                    .enumerate()
                    .map(|(index, column)| (column.name.clone(), index))
                    .collect()
            })
            .collect();

        // Earlier categories win when a synonym target name is ambiguous.
        let mut objects = HashMap::new();
        for (name, id) in &table_ids {
            objects
                .entry(ObjectName::new(name.schema.clone(), name.table.clone()))
                .or_insert(ObjectId::Table(*id));
        }
        for (index, name) in sequences.keys().enumerate() {
            objects
                .entry(name.clone())
                .or_insert(ObjectId::Sequence(SequenceId(index)));
        }
        for (index, node) in routines.iter().enumerate() {
            objects
                .entry(ObjectName::new(node.schema.clone(), node.row.name.clone()))
                .or_insert(ObjectId::Routine(RoutineId(index)));
        }
        for (index, name) in synonyms.keys().enumerate() {
            objects
                .entry(name.clone())
                .or_insert(ObjectId::Synonym(SynonymId(index)));
        }

        Self {
            table_ids,
            column_indexes,
            objects,
        }
    }

    fn resolve(&self, name: ColumnName) -> ColumnReference {
        let target = self
            .table_ids
            .get(&name.table_name())
            .and_then(|table| {
                self.column_indexes
                    .get(table.0)
                    .and_then(|columns| columns.get(&name.column))
                    .map(|index| ColumnId {
                        table: *table,
                        index: *index,
                    })
            });
        ColumnReference { name, target }
    }

    fn link_table(&self, id: TableId, node: TableNode) -> Table {
        let TableNode {
            name,
            row,
            columns,
            constraints,
            foreign_keys,
            indexes,
            table_privileges,
            column_privileges,
            row_count,
        } = node;

        let mut column_grants: HashMap<String, Vec<PrivilegeRow>> = HashMap::new();
        for privilege in column_privileges {
            if let Some(column) = privilege.column.clone() {
                column_grants.entry(column).or_default().push(privilege);
            }
        }

        let mut columns: Vec<Column> = columns
            .unwrap_or_default()
            .into_iter()
            .map(|column| Column {
                privileges: group_privileges(
                    column_grants.remove(&column.name).unwrap_or_default(),
                ),
                name: column.name,
                ordinal_position: column.ordinal_position,
                data_type: column.data_type,
                is_nullable: column.is_nullable,
                default_value: column.default_value,
                is_part_of_primary_key: false,
                remarks: column.remarks,
            })
            .collect();

        let mut orphaned: Vec<&String> = column_grants.keys().collect();
        orphaned.sort();
        for column in orphaned {
            debug!(
                "Dropping privileges on {}.{}: column is not in the model",
                name, column
            );
        }

        let mut primary_key = None;
        let mut table_constraints = Vec::new();
        for constraint in constraints.unwrap_or_default() {
            let references: Vec<ColumnReference> = constraint
                .columns
                .iter()
                .map(|column| self.resolve(name.column(column.clone())))
                .collect();
            match constraint.kind {
                ConstraintKind::PrimaryKey => {
                    primary_key = Some(PrimaryKey {
                        name: constraint.name,
                        columns: references,
                    });
                }
                ConstraintKind::Unique | ConstraintKind::Check => {
                    table_constraints.push(TableConstraint {
                        name: constraint.name,
                        constraint_type: if constraint.kind == ConstraintKind::Unique {
                            ConstraintType::Unique
                        } else {
                            ConstraintType::Check
                        },
                        columns: references,
                        definition: constraint.definition,
                    });
                }
            }
        }
        table_constraints.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(pk) = &primary_key {
            for target in pk.columns.iter().filter_map(|c| c.target) {
                if target.table == id {
                    if let Some(column) = columns.get_mut(target.index) {
                        column.is_part_of_primary_key = true;
                    }
                }
            }
        }

        let mut indexes: Vec<Index> = indexes
            .unwrap_or_default()
            .into_iter()
            .map(|index| Index {
                columns: index
                    .columns
                    .into_iter()
                    .map(|column| IndexColumn {
                        column: self.resolve(name.column(column.name)),
                        direction: column.direction,
                    })
                    .collect(),
                name: index.name,
                is_unique: index.is_unique,
            })
            .collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut foreign_keys: Vec<ForeignKey> = foreign_keys
            .unwrap_or_default()
            .into_iter()
            .map(|fk| {
                let parent = TableName::new(fk.referenced_schema, fk.referenced_table);
                ForeignKey {
                    column_pairs: fk
                        .columns
                        .into_iter()
                        .map(|pair| ForeignKeyColumnPair {
                            foreign_key_column: self.resolve(name.column(pair.column)),
                            primary_key_column: self.resolve(parent.column(pair.referenced_column)),
                        })
                        .collect(),
                    name: fk.name,
                    update_rule: fk.update_rule,
                    delete_rule: fk.delete_rule,
                }
            })
            .collect();
        foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));

        Table {
            name,
            kind: row.kind,
            remarks: row.remarks,
            columns,
            primary_key,
            constraints: table_constraints,
            indexes,
            foreign_keys,
            privileges: group_privileges(table_privileges),
            row_count,
        }
    }
}

fn link_routine(node: RoutineNode) -> Routine {
    let mut parameters: Vec<Parameter> = node
        .parameters
        .unwrap_or_default()
        .into_iter()
        .map(|p| Parameter {
            name: p.name,
            ordinal_position: p.ordinal_position,
            data_type: p.data_type,
            direction: p.direction,
        })
        .collect();
    parameters.sort_by(|a, b| (a.ordinal_position, &a.name).cmp(&(b.ordinal_position, &b.name)));

    Routine {
        specific_name: node.row.specific_name().to_string(),
        name: ObjectName::new(node.schema, node.row.name),
        kind: node.row.kind,
        return_type: node.row.return_type,
        remarks: node.row.remarks,
        parameters,
    }
}

/// Groups grant rows by privilege name; both levels sorted, duplicates dropped.
fn group_privileges(rows: Vec<PrivilegeRow>) -> Vec<Privilege> {
    let mut grouped: BTreeMap<String, BTreeSet<Grant>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.privilege).or_default().insert(Grant {
            grantee: row.grantee,
            grantor: row.grantor,
            is_grantable: row.is_grantable,
        });
    }
    grouped
        .into_iter()
        .map(|(name, grants)| Privilege {
            name,
            grants: grants.into_iter().collect(),
        })
        .collect()
}

fn ids_in<'a, T>(
    schema: &str,
    owners: impl Iterator<Item = &'a String>,
    make: impl Fn(usize) -> T,
) -> Vec<T> {
    owners
        .enumerate()
        .filter(|(_, owner)| owner.as_str() == schema)
        .map(|(index, _)| make(index))
        .collect()
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str, table: &TableName) -> Result<()> {
    if slot.is_some() {
        return Err(CrawlError::model_consistency(format!(
            "{} for '{}' recorded twice",
            what, table
        )));
    }
    *slot = Some(value);
    Ok(())
}

fn check_unique<'a>(
    names: impl Iterator<Item = &'a str>,
    what: &str,
    table: &TableName,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(CrawlError::model_consistency(format!(
                "Duplicate {} '{}' in '{}'",
                what, name, table
            )));
        }
    }
    Ok(())
}

fn duplicate(what: &str, key: &dyn std::fmt::Display) -> CrawlError {
    CrawlError::model_consistency(format!("Duplicate {} '{}'", what, key))
}

fn unknown(what: &str, key: &dyn std::fmt::Display) -> CrawlError {
    CrawlError::model_consistency(format!("Unknown {} '{}'", what, key))
}
