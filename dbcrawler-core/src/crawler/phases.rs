//! Crawl phases, run strictly in order on one connection.

use std::fmt::Display;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::dispatch;
use crate::builder::SchemaModelBuilder;
use crate::config::CrawlConfig;
use crate::diagnostics::Diagnostic;
use crate::error::{CrawlError, Result};
use crate::inclusion::RuleCategory;
use crate::info_level::MetadataCategory;
use crate::models::{ObjectName, TableName};
use crate::provider::{ConnectivityProvider, ConstraintKind, MetadataConnection};

pub(super) struct PhaseRunner<'a> {
    pub(super) conn: &'a dyn MetadataConnection,
    pub(super) provider: &'a dyn ConnectivityProvider,
    pub(super) config: &'a CrawlConfig,
    pub(super) token: &'a CancellationToken,
    pub(super) diagnostics: Vec<Diagnostic>,
}

impl<'a> PhaseRunner<'a> {
    pub(super) fn checkpoint(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(CrawlError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether a category should be retrieved. Records a capability gap
    /// when it is enabled but the provider cannot report it.
    fn gate(&mut self, category: MetadataCategory) -> bool {
        if !self.config.is_enabled(category) {
            debug!("Skipping {}: disabled by info level", category);
            return false;
        }
        if !self.provider.supports(category) {
            info!(
                "Skipping {}: not supported by {}",
                category,
                self.provider.product()
            );
            self.diagnostics
                .push(Diagnostic::capability_gap(category, self.provider.product()));
            return false;
        }
        true
    }

    fn limit(&self) -> usize {
        self.config.max_concurrent_queries()
    }

    pub(super) async fn schemas(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        let mut rows = self.conn.list_schemas().await?;
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        let config = self.config;
        let rules = config.rules();
        for row in rows {
            if rules.included(RuleCategory::Schemas, &row.name) {
                builder.add_schema(row.name)?;
            } else {
                debug!("Excluded schema '{}'", row.name);
            }
        }
        info!("Crawling {} schemas", builder.schema_names().len());
        Ok(())
    }

    pub(super) async fn tables(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if !self.gate(MetadataCategory::Tables) {
            return Ok(());
        }
        let conn = self.conn;
        let results = dispatch(
            builder.schema_names(),
            self.limit(),
            self.token,
            move |schema: String| async move { conn.list_tables(&schema).await },
        )
        .await;
        self.checkpoint()?;

        let config = self.config;
        let rules = config.rules();
        absorb(
            &mut self.diagnostics,
            MetadataCategory::Tables,
            results,
            |schema, rows| {
                for row in rows {
                    let name = TableName::new(schema.as_str(), row.name.as_str());
                    if rules.included(RuleCategory::Tables, &name.to_string()) {
                        builder.add_table(schema, row)?;
                    } else {
                        debug!("Excluded table '{}'", name);
                    }
                }
                Ok(())
            },
        )?;
        info!("Found {} tables", builder.table_names().len());
        Ok(())
    }

    pub(super) async fn columns(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if !self.gate(MetadataCategory::Columns) {
            return Ok(());
        }
        let conn = self.conn;
        let results = dispatch(
            builder.table_names(),
            self.limit(),
            self.token,
            move |table: TableName| async move { conn.list_columns(&table).await },
        )
        .await;
        self.checkpoint()?;

        let config = self.config;
        let rules = config.rules();
        absorb(
            &mut self.diagnostics,
            MetadataCategory::Columns,
            results,
            |table, rows| {
                let (included, excluded): (Vec<_>, Vec<_>) = rows.into_iter().partition(|row| {
                    rules.included(RuleCategory::Columns, &table.column(row.name.as_str()).to_string())
                });
                if !excluded.is_empty() {
                    debug!("Excluded {} columns of '{}'", excluded.len(), table);
                }
                builder.set_columns(table, included)
            },
        )
    }

    /// Primary keys and table constraints share one retrieval; foreign keys
    /// follow.
    pub(super) async fn keys(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        let primary_keys = self.gate(MetadataCategory::PrimaryKeys);
        let constraints = self.gate(MetadataCategory::TableConstraints);

        if primary_keys || constraints {
            let conn = self.conn;
            let results = dispatch(
                builder.table_names(),
                self.limit(),
                self.token,
                move |table: TableName| async move { conn.list_constraints(&table).await },
            )
            .await;
            self.checkpoint()?;

            let category = if primary_keys {
                MetadataCategory::PrimaryKeys
            } else {
                MetadataCategory::TableConstraints
            };
            absorb(&mut self.diagnostics, category, results, |table, mut rows| {
                rows.retain(|row| match row.kind {
                    ConstraintKind::PrimaryKey => primary_keys,
                    ConstraintKind::Unique | ConstraintKind::Check => constraints,
                });
                builder.set_constraints(table, rows)
            })?;
        }

        if self.gate(MetadataCategory::ForeignKeys) {
            self.checkpoint()?;
            let conn = self.conn;
            let results = dispatch(
                builder.table_names(),
                self.limit(),
                self.token,
                move |table: TableName| async move { conn.list_foreign_keys(&table).await },
            )
            .await;
            self.checkpoint()?;

            absorb(
                &mut self.diagnostics,
                MetadataCategory::ForeignKeys,
                results,
                |table, rows| builder.set_foreign_keys(table, rows),
            )?;
        }
        Ok(())
    }

    pub(super) async fn indexes(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if !self.gate(MetadataCategory::Indexes) {
            return Ok(());
        }
        let conn = self.conn;
        let results = dispatch(
            builder.table_names(),
            self.limit(),
            self.token,
            move |table: TableName| async move { conn.list_indexes(&table).await },
        )
        .await;
        self.checkpoint()?;

        absorb(
            &mut self.diagnostics,
            MetadataCategory::Indexes,
            results,
            |table, rows| builder.set_indexes(table, rows),
        )
    }

    pub(super) async fn routines(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if self.gate(MetadataCategory::Routines) {
            let conn = self.conn;
            let results = dispatch(
                builder.schema_names(),
                self.limit(),
                self.token,
                move |schema: String| async move { conn.list_routines(&schema).await },
            )
            .await;
            self.checkpoint()?;

            let config = self.config;
            let rules = config.rules();
            absorb(
                &mut self.diagnostics,
                MetadataCategory::Routines,
                results,
                |schema, rows| {
                    for row in rows {
                        let name = ObjectName::new(schema.as_str(), row.name.as_str());
                        if rules.included(RuleCategory::Routines, &name.to_string()) {
                            builder.add_routine(schema, row)?;
                        } else {
                            debug!("Excluded routine '{}'", name);
                        }
                    }
                    Ok(())
                },
            )?;
            info!("Found {} routines", builder.routine_keys().len());
        }

        if self.gate(MetadataCategory::RoutineParameters) {
            self.checkpoint()?;
            let conn = self.conn;
            let results = dispatch(
                builder.routine_keys(),
                self.limit(),
                self.token,
                move |routine: ObjectName| async move {
                    conn.list_routine_parameters(&routine).await
                },
            )
            .await;
            self.checkpoint()?;

            absorb(
                &mut self.diagnostics,
                MetadataCategory::RoutineParameters,
                results,
                |routine, rows| builder.set_parameters(routine, rows),
            )?;
        }
        Ok(())
    }

    pub(super) async fn sequences(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if !self.gate(MetadataCategory::Sequences) {
            return Ok(());
        }
        let conn = self.conn;
        let results = dispatch(
            builder.schema_names(),
            self.limit(),
            self.token,
            move |schema: String| async move { conn.list_sequences(&schema).await },
        )
        .await;
        self.checkpoint()?;

        let config = self.config;
        let rules = config.rules();
        absorb(
            &mut self.diagnostics,
            MetadataCategory::Sequences,
            results,
            |schema, rows| {
                for row in rows {
                    let name = ObjectName::new(schema.as_str(), row.name.as_str());
                    if rules.included(RuleCategory::Sequences, &name.to_string()) {
                        builder.add_sequence(schema, row)?;
                    } else {
                        debug!("Excluded sequence '{}'", name);
                    }
                }
                Ok(())
            },
        )
    }

    pub(super) async fn synonyms(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if !self.gate(MetadataCategory::Synonyms) {
            return Ok(());
        }
        let conn = self.conn;
        let results = dispatch(
            builder.schema_names(),
            self.limit(),
            self.token,
            move |schema: String| async move { conn.list_synonyms(&schema).await },
        )
        .await;
        self.checkpoint()?;

        let config = self.config;
        let rules = config.rules();
        absorb(
            &mut self.diagnostics,
            MetadataCategory::Synonyms,
            results,
            |schema, rows| {
                for row in rows {
                    let name = ObjectName::new(schema.as_str(), row.name.as_str());
                    if rules.included(RuleCategory::Synonyms, &name.to_string()) {
                        builder.add_synonym(schema, row)?;
                    } else {
                        debug!("Excluded synonym '{}'", name);
                    }
                }
                Ok(())
            },
        )
    }

    pub(super) async fn privileges(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if self.gate(MetadataCategory::TablePrivileges) {
            let conn = self.conn;
            let results = dispatch(
                builder.table_names(),
                self.limit(),
                self.token,
                move |table: TableName| async move { conn.list_table_privileges(&table).await },
            )
            .await;
            self.checkpoint()?;

            absorb(
                &mut self.diagnostics,
                MetadataCategory::TablePrivileges,
                results,
                |table, rows| builder.set_table_privileges(table, rows),
            )?;
        }

        if self.gate(MetadataCategory::ColumnPrivileges) {
            self.checkpoint()?;
            let conn = self.conn;
            let results = dispatch(
                builder.table_names(),
                self.limit(),
                self.token,
                move |table: TableName| async move { conn.list_column_privileges(&table).await },
            )
            .await;
            self.checkpoint()?;

            absorb(
                &mut self.diagnostics,
                MetadataCategory::ColumnPrivileges,
                results,
                |table, rows| builder.set_column_privileges(table, rows),
            )?;
        }
        Ok(())
    }

    pub(super) async fn row_counts(&mut self, builder: &mut SchemaModelBuilder) -> Result<()> {
        if !self.gate(MetadataCategory::TableRowCounts) {
            return Ok(());
        }
        let conn = self.conn;
        let results = dispatch(
            builder.base_table_names(),
            self.limit(),
            self.token,
            move |table: TableName| async move { conn.count_rows(&table).await },
        )
        .await;
        self.checkpoint()?;

        absorb(
            &mut self.diagnostics,
            MetadataCategory::TableRowCounts,
            results,
            |table, count| builder.set_row_count(table, count),
        )
    }
}

/// Applies successful retrievals, records recoverable failures as
/// diagnostics and stops at the first fatal error.
fn absorb<K, T>(
    diagnostics: &mut Vec<Diagnostic>,
    category: MetadataCategory,
    results: Vec<(K, Result<T>)>,
    mut apply: impl FnMut(&K, T) -> Result<()>,
) -> Result<()>
where
    K: Display,
{
    for (key, result) in results {
        match result {
            Ok(value) => apply(&key, value)?,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Failed to retrieve {} for '{}': {}", category, key, e);
                diagnostics.push(Diagnostic::object_retrieval(category, key.to_string(), &e));
            }
        }
    }
    Ok(())
}
