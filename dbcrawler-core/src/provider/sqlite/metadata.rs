//! SQLite metadata queries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use crate::error::Result;
use crate::models::{DatabaseInfo, ReferentialAction, SortDirection, TableKind, TableName};
use crate::provider::helpers::{RowExt, map_sqlx_error, quote_identifier};
use crate::provider::{
    ColumnRow, ConstraintKind, ConstraintRow, ForeignKeyColumnRow, ForeignKeyRow, IndexColumnRow,
    IndexRow, MetadataConnection, SchemaRow, TableRow,
};

pub(super) struct SqliteConnection {
    pool: SqlitePool,
    database: Option<String>,
}

impl SqliteConnection {
    pub(super) fn new(pool: SqlitePool, database: Option<String>) -> Self {
        Self { pool, database }
    }

    async fn fetch_table_rows(
        &self,
        query: &str,
        table: &TableName,
        what: &str,
    ) -> Result<Vec<SqliteRow>> {
        sqlx::query(query)
            .bind(table.table.as_str())
            .bind(table.schema.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to list {} of '{}'", what, table), e))
    }

    /// Primary key columns of a table in key order.
    async fn primary_key_columns(&self, table: &TableName) -> Result<Vec<String>> {
        let rows = self
            .fetch_table_rows(
                "SELECT name, pk FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
                table,
                "primary key",
            )
            .await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| row.get_field("name", &object))
            .collect()
    }

    /// Indexes of a table as (name, is_unique, origin).
    async fn index_list(&self, table: &TableName) -> Result<Vec<(String, bool, String)>> {
        let rows = self
            .fetch_table_rows(
                r#"SELECT name, "unique", origin FROM pragma_index_list(?1, ?2)"#,
                table,
                "indexes",
            )
            .await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                let unique: i64 = row.get_field("unique", &object)?;
                Ok((
                    row.get_field("name", &object)?,
                    unique != 0,
                    row.get_field("origin", &object)?,
                ))
            })
            .collect()
    }

    /// Key columns of an index in index order. Expression columns have no
    /// name and are skipped.
    async fn index_columns(&self, schema: &str, index: &str) -> Result<Vec<IndexColumnRow>> {
        let object = format!("{}.{}", schema, index);
        let rows = sqlx::query(
            r#"SELECT seqno, name, "desc" FROM pragma_index_xinfo(?1, ?2)
               WHERE key = 1 ORDER BY seqno"#,
        )
        .bind(index)
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(format!("Failed to list columns of index '{}'", object), e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: Option<String> = row.get_field("name", &object)?;
            let descending: i64 = row.get_field("desc", &object)?;
            match name {
                Some(name) => columns.push(IndexColumnRow {
                    name,
                    direction: if descending != 0 {
                        SortDirection::Descending
                    } else {
                        SortDirection::Ascending
                    },
                }),
                None => debug!("Skipping expression column in index '{}'", object),
            }
        }
        Ok(columns)
    }
}

#[async_trait]
impl MetadataConnection for SqliteConnection {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to get SQLite version", e))?;

        Ok(DatabaseInfo {
            product_name: "SQLite".to_string(),
            product_version: Some(version),
            catalog_name: self.database.clone(),
        })
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaRow>> {
        let rows = sqlx::query("SELECT name FROM pragma_database_list WHERE name <> 'temp'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to list attached databases", e))?;

        rows.iter()
            .map(|row| {
                Ok(SchemaRow {
                    name: row.get_field("name", "pragma_database_list")?,
                })
            })
            .collect()
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRow>> {
        let query = format!(
            r"SELECT name, type FROM {}.sqlite_master
              WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite\_%' ESCAPE '\'",
            quote_identifier(schema)
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to list tables of '{}'", schema), e))?;

        rows.iter()
            .map(|row| {
                let kind: String = row.get_field("type", schema)?;
                Ok(TableRow {
                    name: row.get_field("name", schema)?,
                    kind: if kind == "view" {
                        TableKind::View
                    } else {
                        TableKind::Table
                    },
                    remarks: None,
                })
            })
            .collect()
    }

    async fn list_columns(&self, table: &TableName) -> Result<Vec<ColumnRow>> {
        let rows = self
            .fetch_table_rows(
                r#"SELECT cid, name, type, "notnull", dflt_value, pk
                   FROM pragma_table_info(?1, ?2)"#,
                table,
                "columns",
            )
            .await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                let cid: i64 = row.get_field("cid", &object)?;
                let not_null: i64 = row.get_field("notnull", &object)?;
                let pk: i64 = row.get_field("pk", &object)?;
                Ok(ColumnRow {
                    name: row.get_field("name", &object)?,
                    ordinal_position: u32::try_from(cid.saturating_add(1)).unwrap_or(u32::MAX),
                    data_type: row.get_field("type", &object)?,
                    // Primary key columns are implicitly NOT NULL
                    is_nullable: not_null == 0 && pk == 0,
                    default_value: row.get_field("dflt_value", &object)?,
                    remarks: None,
                })
            })
            .collect()
    }

    /// SQLite does not name primary keys; they are reported as `pk_<table>`.
    /// Unique constraints surface as automatic indexes with origin `u`.
    /// Check constraints are only stored in the table's DDL and are not
    /// reported.
    async fn list_constraints(&self, table: &TableName) -> Result<Vec<ConstraintRow>> {
        let mut constraints = Vec::new();

        let pk_columns = self.primary_key_columns(table).await?;
        if !pk_columns.is_empty() {
            constraints.push(ConstraintRow {
                name: format!("pk_{}", table.table),
                kind: ConstraintKind::PrimaryKey,
                columns: pk_columns,
                definition: None,
            });
        }

        for (name, _, origin) in self.index_list(table).await? {
            if origin != "u" {
                continue;
            }
            let columns = self
                .index_columns(&table.schema, &name)
                .await?
                .into_iter()
                .map(|column| column.name)
                .collect();
            constraints.push(ConstraintRow {
                name,
                kind: ConstraintKind::Unique,
                columns,
                definition: None,
            });
        }
        Ok(constraints)
    }

    /// Foreign keys are unnamed in SQLite; each is reported as
    /// `fk_<table>_<id>`. A key without explicit parent columns refers to
    /// the parent's primary key.
    async fn list_foreign_keys(&self, table: &TableName) -> Result<Vec<ForeignKeyRow>> {
        let object = table.to_string();
        let mut grouped: BTreeMap<i64, ForeignKeyRow> = BTreeMap::new();
        let mut positions: BTreeMap<i64, Vec<(i64, String, Option<String>)>> = BTreeMap::new();
        {
            let rows = self
                .fetch_table_rows(
                    r#"SELECT id, seq, "table", "from", "to", on_update, on_delete
                       FROM pragma_foreign_key_list(?1, ?2)"#,
                    table,
                    "foreign keys",
                )
                .await?;

            for row in &rows {
                let id: i64 = row.get_field("id", &object)?;
                let on_update: String = row.get_field("on_update", &object)?;
                let on_delete: String = row.get_field("on_delete", &object)?;
                let fk = grouped.entry(id).or_insert_with(|| ForeignKeyRow {
                    name: format!("fk_{}_{}", table.table, id),
                    referenced_schema: table.schema.clone(),
                    referenced_table: String::new(),
                    columns: Vec::new(),
                    update_rule: referential_action(&on_update),
                    delete_rule: referential_action(&on_delete),
                });
                fk.referenced_table = row.get_field("table", &object)?;
                positions.entry(id).or_default().push((
                    row.get_field("seq", &object)?,
                    row.get_field("from", &object)?,
                    row.get_field("to", &object)?,
                ));
            }
        }

        let mut foreign_keys = Vec::with_capacity(grouped.len());
        for (id, mut fk) in grouped {
            let mut pairs = positions.remove(&id).unwrap_or_default();
            pairs.sort_by_key(|(seq, _, _)| *seq);

            let implicit = if pairs.iter().any(|(_, _, to)| to.is_none()) {
                let parent = TableName::new(fk.referenced_schema.clone(), fk.referenced_table.clone());
                self.primary_key_columns(&parent).await?
            } else {
                Vec::new()
            };

            fk.columns = pairs
                .into_iter()
                .enumerate()
                .map(|(position, (_, column, to))| ForeignKeyColumnRow {
                    column,
                    referenced_column: to
                        .or_else(|| implicit.get(position).cloned())
                        .unwrap_or_default(),
                })
                .collect();
            foreign_keys.push(fk);
        }
        Ok(foreign_keys)
    }

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexRow>> {
        let mut indexes = Vec::new();
        for (name, is_unique, origin) in self.index_list(table).await? {
            if origin == "pk" {
                continue;
            }
            let columns = self.index_columns(&table.schema, &name).await?;
            indexes.push(IndexRow {
                name,
                is_unique,
                columns,
            });
        }
        Ok(indexes)
    }

    async fn count_rows(&self, table: &TableName) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_identifier(&table.schema),
            quote_identifier(&table.table)
        );
        let count: i64 = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to count rows of '{}'", table), e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn referential_action(rule: &str) -> ReferentialAction {
    match rule.to_ascii_uppercase().as_str() {
        "RESTRICT" => ReferentialAction::Restrict,
        "CASCADE" => ReferentialAction::Cascade,
        "SET NULL" => ReferentialAction::SetNull,
        "SET DEFAULT" => ReferentialAction::SetDefault,
        _ => ReferentialAction::NoAction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referential_action() {
        assert_eq!(referential_action("CASCADE"), ReferentialAction::Cascade);
        assert_eq!(referential_action("SET NULL"), ReferentialAction::SetNull);
        assert_eq!(referential_action("set default"), ReferentialAction::SetDefault);
        assert_eq!(referential_action("NO ACTION"), ReferentialAction::NoAction);
        assert_eq!(referential_action("NONE"), ReferentialAction::NoAction);
    }
}
