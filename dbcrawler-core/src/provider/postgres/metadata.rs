//! PostgreSQL metadata queries.
//!
//! Identifier columns are cast to `text` so they decode as `String`
//! regardless of the catalog's `name` and domain types.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgRow;

use crate::error::Result;
use crate::models::{
    DatabaseInfo, ObjectName, ParameterDirection, ReferentialAction, RoutineKind, SortDirection,
    TableKind, TableName,
};
use crate::provider::helpers::{RowExt, map_sqlx_error, quote_identifier};
use crate::provider::{
    ColumnRow, ConstraintKind, ConstraintRow, ForeignKeyColumnRow, ForeignKeyRow, IndexColumnRow,
    IndexRow, MetadataConnection, ParameterRow, PrivilegeRow, RoutineRow, SchemaRow, SequenceRow,
    TableRow,
};

const SCHEMAS_QUERY: &str = r#"
    SELECT n.nspname::text AS name
    FROM pg_catalog.pg_namespace n
    WHERE n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
      AND n.nspname NOT LIKE 'pg_temp_%'
      AND n.nspname NOT LIKE 'pg_toast_temp_%'
"#;

const TABLES_QUERY: &str = r#"
    SELECT c.relname::text AS name,
           c.relkind::text AS kind,
           pg_catalog.obj_description(c.oid, 'pg_class') AS remarks
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p', 'f', 'v', 'm')
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT a.attname::text AS name,
           a.attnum::int4 AS ordinal_position,
           pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
           NOT a.attnotnull AS is_nullable,
           pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_value,
           pg_catalog.col_description(a.attrelid, a.attnum) AS remarks
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1 AND c.relname = $2
      AND a.attnum > 0 AND NOT a.attisdropped
"#;

const CONSTRAINTS_QUERY: &str = r#"
    SELECT con.conname::text AS name,
           con.contype::text AS kind,
           ARRAY(
               SELECT a.attname::text
               FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
               JOIN pg_catalog.pg_attribute a
                 ON a.attrelid = con.conrelid AND a.attnum = k.attnum
               ORDER BY k.ord
           ) AS columns,
           CASE WHEN con.contype = 'c'
                THEN pg_catalog.pg_get_constraintdef(con.oid, true)
           END AS definition
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2
      AND con.contype IN ('p', 'u', 'c')
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT con.conname::text AS name,
           fn.nspname::text AS referenced_schema,
           fc.relname::text AS referenced_table,
           con.confupdtype::text AS update_rule,
           con.confdeltype::text AS delete_rule,
           ARRAY(
               SELECT a.attname::text
               FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
               JOIN pg_catalog.pg_attribute a
                 ON a.attrelid = con.conrelid AND a.attnum = k.attnum
               ORDER BY k.ord
           ) AS columns,
           ARRAY(
               SELECT a.attname::text
               FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
               JOIN pg_catalog.pg_attribute a
                 ON a.attrelid = con.confrelid AND a.attnum = k.attnum
               ORDER BY k.ord
           ) AS referenced_columns
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_class fc ON fc.oid = con.confrelid
    JOIN pg_catalog.pg_namespace fn ON fn.oid = fc.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2
      AND con.contype = 'f'
"#;

// Expression columns have attnum 0 and are reported by their definition.
const INDEXES_QUERY: &str = r#"
    SELECT i.relname::text AS name,
           ix.indisunique AS is_unique,
           ARRAY(
               SELECT COALESCE(a.attname::text,
                               pg_catalog.pg_get_indexdef(ix.indexrelid, k.ord::int4, true))
               FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
               LEFT JOIN pg_catalog.pg_attribute a
                 ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
               WHERE k.ord <= ix.indnkeyatts
               ORDER BY k.ord
           ) AS columns,
           ARRAY(
               SELECT (o.opt::int4 & 1) = 1
               FROM unnest(ix.indoption::int2[]) WITH ORDINALITY AS o(opt, ord)
               ORDER BY o.ord
           ) AS descending
    FROM pg_catalog.pg_index ix
    JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
    JOIN pg_catalog.pg_class c ON c.oid = ix.indrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2
"#;

const ROUTINES_QUERY: &str = r#"
    SELECT p.proname::text AS name,
           (p.proname || '_' || p.oid)::text AS specific_name,
           p.prokind::text AS kind,
           CASE WHEN p.prokind = 'p' THEN NULL
                ELSE pg_catalog.format_type(p.prorettype, NULL)
           END AS return_type,
           pg_catalog.obj_description(p.oid, 'pg_proc') AS remarks
    FROM pg_catalog.pg_proc p
    JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname = $1
      AND p.prokind IN ('f', 'p')
"#;

const PARAMETERS_QUERY: &str = r#"
    SELECT COALESCE(p.parameter_name::text, '$' || p.ordinal_position::text) AS name,
           p.ordinal_position::int4 AS ordinal_position,
           p.data_type::text AS data_type,
           p.parameter_mode::text AS direction
    FROM information_schema.parameters p
    WHERE p.specific_schema = $1 AND p.specific_name = $2
"#;

const SEQUENCES_QUERY: &str = r#"
    SELECT c.relname::text AS name,
           s.seqincrement AS increment,
           s.seqmin AS minimum_value,
           s.seqmax AS maximum_value,
           s.seqcycle AS cycle
    FROM pg_catalog.pg_sequence s
    JOIN pg_catalog.pg_class c ON c.oid = s.seqrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
"#;

const TABLE_PRIVILEGES_QUERY: &str = r#"
    SELECT tp.privilege_type::text AS privilege,
           tp.grantor::text AS grantor,
           tp.grantee::text AS grantee,
           tp.is_grantable::text = 'YES' AS is_grantable,
           NULL::text AS column_name
    FROM information_schema.table_privileges tp
    WHERE tp.table_schema = $1 AND tp.table_name = $2
"#;

const COLUMN_PRIVILEGES_QUERY: &str = r#"
    SELECT cp.privilege_type::text AS privilege,
           cp.grantor::text AS grantor,
           cp.grantee::text AS grantee,
           cp.is_grantable::text = 'YES' AS is_grantable,
           cp.column_name::text AS column_name
    FROM information_schema.column_privileges cp
    WHERE cp.table_schema = $1 AND cp.table_name = $2
"#;

pub(super) struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    pub(super) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_schema_rows(&self, query: &str, schema: &str, what: &str) -> Result<Vec<PgRow>> {
        sqlx::query(query)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to list {} of '{}'", what, schema), e))
    }

    async fn fetch_table_rows(
        &self,
        query: &str,
        table: &TableName,
        what: &str,
    ) -> Result<Vec<PgRow>> {
        sqlx::query(query)
            .bind(table.schema.as_str())
            .bind(table.table.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to list {} of '{}'", what, table), e))
    }

    async fn privileges(
        &self,
        query: &str,
        table: &TableName,
        what: &str,
    ) -> Result<Vec<PrivilegeRow>> {
        let rows = self.fetch_table_rows(query, table, what).await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                Ok(PrivilegeRow {
                    privilege: row.get_field("privilege", &object)?,
                    grantor: row.get_field("grantor", &object)?,
                    grantee: row.get_field("grantee", &object)?,
                    is_grantable: row.get_field("is_grantable", &object)?,
                    column: row.get_field("column_name", &object)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MetadataConnection for PostgresConnection {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        let row = sqlx::query(
            "SELECT current_setting('server_version') AS version, current_database()::text AS catalog",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Failed to get server version", e))?;

        Ok(DatabaseInfo {
            product_name: "PostgreSQL".to_string(),
            product_version: row.get_field("version", "server")?,
            catalog_name: row.get_field("catalog", "server")?,
        })
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaRow>> {
        let rows = sqlx::query(SCHEMAS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Failed to list schemas", e))?;

        rows.iter()
            .map(|row| {
                Ok(SchemaRow {
                    name: row.get_field("name", "pg_namespace")?,
                })
            })
            .collect()
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRow>> {
        let rows = self.fetch_schema_rows(TABLES_QUERY, schema, "tables").await?;
        rows.iter()
            .map(|row| {
                let kind: String = row.get_field("kind", schema)?;
                Ok(TableRow {
                    name: row.get_field("name", schema)?,
                    kind: match kind.as_str() {
                        "v" | "m" => TableKind::View,
                        _ => TableKind::Table,
                    },
                    remarks: row.get_field("remarks", schema)?,
                })
            })
            .collect()
    }

    async fn list_columns(&self, table: &TableName) -> Result<Vec<ColumnRow>> {
        let rows = self.fetch_table_rows(COLUMNS_QUERY, table, "columns").await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                let ordinal: i32 = row.get_field("ordinal_position", &object)?;
                Ok(ColumnRow {
                    name: row.get_field("name", &object)?,
                    ordinal_position: u32::try_from(ordinal).unwrap_or_default(),
                    data_type: row.get_field("data_type", &object)?,
                    is_nullable: row.get_field("is_nullable", &object)?,
                    default_value: row.get_field("default_value", &object)?,
                    remarks: row.get_field("remarks", &object)?,
                })
            })
            .collect()
    }

    async fn list_constraints(&self, table: &TableName) -> Result<Vec<ConstraintRow>> {
        let rows = self
            .fetch_table_rows(CONSTRAINTS_QUERY, table, "constraints")
            .await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                let kind: String = row.get_field("kind", &object)?;
                Ok(ConstraintRow {
                    name: row.get_field("name", &object)?,
                    kind: match kind.as_str() {
                        "p" => ConstraintKind::PrimaryKey,
                        "u" => ConstraintKind::Unique,
                        _ => ConstraintKind::Check,
                    },
                    columns: row.get_field("columns", &object)?,
                    definition: row.get_field("definition", &object)?,
                })
            })
            .collect()
    }

    async fn list_foreign_keys(&self, table: &TableName) -> Result<Vec<ForeignKeyRow>> {
        let rows = self
            .fetch_table_rows(FOREIGN_KEYS_QUERY, table, "foreign keys")
            .await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                let columns: Vec<String> = row.get_field("columns", &object)?;
                let referenced: Vec<String> = row.get_field("referenced_columns", &object)?;
                let update_rule: String = row.get_field("update_rule", &object)?;
                let delete_rule: String = row.get_field("delete_rule", &object)?;
                Ok(ForeignKeyRow {
                    name: row.get_field("name", &object)?,
                    referenced_schema: row.get_field("referenced_schema", &object)?,
                    referenced_table: row.get_field("referenced_table", &object)?,
                    columns: columns
                        .into_iter()
                        .zip(referenced)
                        .map(|(column, referenced_column)| ForeignKeyColumnRow {
                            column,
                            referenced_column,
                        })
                        .collect(),
                    update_rule: referential_action(&update_rule),
                    delete_rule: referential_action(&delete_rule),
                })
            })
            .collect()
    }

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexRow>> {
        let rows = self.fetch_table_rows(INDEXES_QUERY, table, "indexes").await?;
        let object = table.to_string();
        rows.iter()
            .map(|row| {
                let columns: Vec<String> = row.get_field("columns", &object)?;
                let descending: Vec<bool> = row.get_field("descending", &object)?;
                Ok(IndexRow {
                    name: row.get_field("name", &object)?,
                    is_unique: row.get_field("is_unique", &object)?,
                    columns: columns
                        .into_iter()
                        .enumerate()
                        .map(|(position, name)| IndexColumnRow {
                            name,
                            direction: if descending.get(position).copied().unwrap_or(false) {
                                SortDirection::Descending
                            } else {
                                SortDirection::Ascending
                            },
                        })
                        .collect(),
                })
            })
            .collect()
    }

    async fn list_routines(&self, schema: &str) -> Result<Vec<RoutineRow>> {
        let rows = self
            .fetch_schema_rows(ROUTINES_QUERY, schema, "routines")
            .await?;
        rows.iter()
            .map(|row| {
                let kind: String = row.get_field("kind", schema)?;
                Ok(RoutineRow {
                    name: row.get_field("name", schema)?,
                    specific_name: row.get_field("specific_name", schema)?,
                    kind: if kind == "p" {
                        RoutineKind::Procedure
                    } else {
                        RoutineKind::Function
                    },
                    return_type: row.get_field("return_type", schema)?,
                    remarks: row.get_field("remarks", schema)?,
                })
            })
            .collect()
    }

    async fn list_routine_parameters(&self, routine: &ObjectName) -> Result<Vec<ParameterRow>> {
        let object = routine.to_string();
        let rows = sqlx::query(PARAMETERS_QUERY)
            .bind(routine.schema.as_str())
            .bind(routine.name.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(format!("Failed to list parameters of '{}'", object), e))?;

        rows.iter()
            .map(|row| {
                let ordinal: i32 = row.get_field("ordinal_position", &object)?;
                let direction: Option<String> = row.get_field("direction", &object)?;
                Ok(ParameterRow {
                    name: row.get_field("name", &object)?,
                    ordinal_position: u32::try_from(ordinal).unwrap_or_default(),
                    data_type: row.get_field("data_type", &object)?,
                    direction: parameter_direction(direction.as_deref()),
                })
            })
            .collect()
    }

    async fn list_sequences(&self, schema: &str) -> Result<Vec<SequenceRow>> {
        let rows = self
            .fetch_schema_rows(SEQUENCES_QUERY, schema, "sequences")
            .await?;
        rows.iter()
            .map(|row| {
                Ok(SequenceRow {
                    name: row.get_field("name", schema)?,
                    increment: row.get_field("increment", schema)?,
                    minimum_value: row.get_field("minimum_value", schema)?,
                    maximum_value: row.get_field("maximum_value", schema)?,
                    cycle: row.get_field("cycle", schema)?,
                })
            })
            .collect()
    }

    async fn list_table_privileges(&self, table: &TableName) -> Result<Vec<PrivilegeRow>> {
        self.privileges(TABLE_PRIVILEGES_QUERY, table, "table privileges")
            .await
    }

    async fn list_column_privileges(&self, table: &TableName) -> Result<Vec<PrivilegeRow>> {
        self.privileges(COLUMN_PRIVILEGES_QUERY, table, "column privileges")
            .await
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

/// Maps `pg_constraint.confupdtype` / `confdeltype` codes.
fn referential_action(code: &str) -> ReferentialAction {
    match code {
        "r" => ReferentialAction::Restrict,
        "c" => ReferentialAction::Cascade,
        "n" => ReferentialAction::SetNull,
        "d" => ReferentialAction::SetDefault,
        _ => ReferentialAction::NoAction,
    }
}

fn parameter_direction(mode: Option<&str>) -> ParameterDirection {
    match mode {
        Some("OUT") => ParameterDirection::Out,
        Some("INOUT") => ParameterDirection::InOut,
        _ => ParameterDirection::In,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referential_action_codes() {
        assert_eq!(referential_action("a"), ReferentialAction::NoAction);
        assert_eq!(referential_action("r"), ReferentialAction::Restrict);
        assert_eq!(referential_action("c"), ReferentialAction::Cascade);
        assert_eq!(referential_action("n"), ReferentialAction::SetNull);
        assert_eq!(referential_action("d"), ReferentialAction::SetDefault);
    }

    #[test]
    fn test_parameter_direction() {
        assert_eq!(parameter_direction(Some("IN")), ParameterDirection::In);
        assert_eq!(parameter_direction(Some("OUT")), ParameterDirection::Out);
        assert_eq!(parameter_direction(Some("INOUT")), ParameterDirection::InOut);
        assert_eq!(parameter_direction(None), ParameterDirection::In);
    }
}
