//! In-memory provider backed by a metadata snapshot.
//!
//! A [`DatabaseSnapshot`] is a JSON document describing schemas and their
//! objects as a provider would report them. [`SnapshotProvider`] serves it
//! through the normal provider traits, which allows crawling offline and
//! exercising the crawler without a database. The provider can also shuffle
//! returned rows with a fixed seed, inject per-object failures, drop the
//! connection at a chosen call and record every call it receives.

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::rows::{
    ColumnRow, ConstraintRow, ForeignKeyRow, IndexRow, ParameterRow, PrivilegeRow, RoutineRow,
    SchemaRow, SequenceRow, SynonymRow, TableRow,
};
use super::{ConnectivityProvider, MetadataConnection};
use crate::error::{CrawlError, Result};
use crate::info_level::MetadataCategory;
use crate::models::{DatabaseInfo, ObjectName, TableName};

// ============================================================================
// Snapshot document
// ============================================================================

/// Serializable description of a database's metadata.
///
/// # Example
/// ```rust
/// use dbcrawler_core::provider::DatabaseSnapshot;
///
/// let snapshot = DatabaseSnapshot::from_json_str(r#"{
///     "database_info": { "product_name": "PostgreSQL" },
///     "unsupported": ["synonyms"],
///     "schemas": [
///         { "name": "books", "tables": [
///             { "name": "authors", "columns": [
///                 { "name": "id", "ordinal_position": 1, "data_type": "int4", "is_nullable": false }
///             ] }
///         ] }
///     ]
/// }"#).unwrap();
///
/// assert_eq!(snapshot.schemas[0].tables[0].columns.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub database_info: DatabaseInfo,
    /// Categories the snapshot's source could not report
    #[serde(default)]
    pub unsupported: BTreeSet<MetadataCategory>,
    #[serde(default)]
    pub schemas: Vec<SnapshotSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSchema {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<SnapshotTable>,
    #[serde(default)]
    pub routines: Vec<SnapshotRoutine>,
    #[serde(default)]
    pub sequences: Vec<SequenceRow>,
    #[serde(default)]
    pub synonyms: Vec<SynonymRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTable {
    #[serde(flatten)]
    pub table: TableRow,
    #[serde(default)]
    pub columns: Vec<ColumnRow>,
    #[serde(default)]
    pub constraints: Vec<ConstraintRow>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyRow>,
    #[serde(default)]
    pub indexes: Vec<IndexRow>,
    /// Table privileges, plus column privileges for rows naming a column
    #[serde(default)]
    pub privileges: Vec<PrivilegeRow>,
    #[serde(default)]
    pub row_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRoutine {
    #[serde(flatten)]
    pub routine: RoutineRow,
    #[serde(default)]
    pub parameters: Vec<ParameterRow>,
}

impl DatabaseSnapshot {
    /// Parses a snapshot from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CrawlError::Serialization {
            context: "Failed to parse database snapshot".to_string(),
            source: e,
        })
    }

    /// Loads a snapshot from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CrawlError::Io {
                context: format!("Failed to read snapshot file: {}", path.display()),
                source: e,
            })?;
        Self::from_json_str(&json)
    }

    fn schema(&self, name: &str) -> Option<&SnapshotSchema> {
        self.schemas.iter().find(|schema| schema.name == name)
    }

    fn table(&self, name: &TableName) -> Option<&SnapshotTable> {
        self.schema(&name.schema)?
            .tables
            .iter()
            .find(|table| table.table.name == name.table)
    }

    fn routine(&self, name: &ObjectName) -> Option<&SnapshotRoutine> {
        self.schema(&name.schema)?
            .routines
            .iter()
            .find(|routine| routine.routine.specific_name() == name.name)
    }
}

// ============================================================================
// Provider behavior
// ============================================================================

/// Order in which the provider returns rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Document order
    #[default]
    AsIs,
    Reversed,
    /// Shuffled per call with a fixed seed
    Shuffled { seed: u64 },
}

/// Connection calls that can be recorded or have faults injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    DatabaseInfo,
    ListSchemas,
    ListTables,
    ListColumns,
    ListConstraints,
    ListForeignKeys,
    ListIndexes,
    ListRoutines,
    ListRoutineParameters,
    ListSequences,
    ListSynonyms,
    ListTablePrivileges,
    ListColumnPrivileges,
    CountRows,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DatabaseInfo => "database_info",
            Self::ListSchemas => "list_schemas",
            Self::ListTables => "list_tables",
            Self::ListColumns => "list_columns",
            Self::ListConstraints => "list_constraints",
            Self::ListForeignKeys => "list_foreign_keys",
            Self::ListIndexes => "list_indexes",
            Self::ListRoutines => "list_routines",
            Self::ListRoutineParameters => "list_routine_parameters",
            Self::ListSequences => "list_sequences",
            Self::ListSynonyms => "list_synonyms",
            Self::ListTablePrivileges => "list_table_privileges",
            Self::ListColumnPrivileges => "list_column_privileges",
            Self::CountRows => "count_rows",
        };
        f.write_str(name)
    }
}

/// One call received by a snapshot connection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordedCall {
    pub operation: Operation,
    /// Qualified name of the object the call was about, empty for
    /// catalog-level calls
    pub object: String,
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    row_order: RowOrder,
    latency: Option<Duration>,
    failures: BTreeSet<(Operation, String)>,
    connection_loss: Option<(Operation, String)>,
    refuse_connections: bool,
    cancellations: Vec<(Operation, String, CancellationToken)>,
}

#[derive(Debug, Default)]
struct Activity {
    open_connections: AtomicUsize,
    connections_opened: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

/// Provider serving a [`DatabaseSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotProvider {
    snapshot: Arc<DatabaseSnapshot>,
    behavior: Behavior,
    activity: Arc<Activity>,
}

impl SnapshotProvider {
    pub fn new(snapshot: DatabaseSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            behavior: Behavior::default(),
            activity: Arc::new(Activity::default()),
        }
    }

    pub fn snapshot(&self) -> &DatabaseSnapshot {
        &self.snapshot
    }

    /// Builder method to set the row order of every returned list.
    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.behavior.row_order = row_order;
        self
    }

    /// Builder method to delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.behavior.latency = Some(latency);
        self
    }

    /// Builder method to report a category as unsupported.
    pub fn with_unsupported(mut self, category: MetadataCategory) -> Self {
        Arc::make_mut(&mut self.snapshot).unsupported.insert(category);
        self
    }

    /// Makes `operation` fail for `object` with a recoverable error.
    pub fn fail_on(mut self, operation: Operation, object: impl Into<String>) -> Self {
        self.behavior.failures.insert((operation, object.into()));
        self
    }

    /// Makes `operation` on `object` report a dropped connection.
    pub fn lose_connection_on(mut self, operation: Operation, object: impl Into<String>) -> Self {
        self.behavior.connection_loss = Some((operation, object.into()));
        self
    }

    /// Makes `open_connection` fail.
    pub fn refuse_connections(mut self) -> Self {
        self.behavior.refuse_connections = true;
        self
    }

    /// Cancels `token` when `operation` on `object` is received.
    pub fn cancel_on(
        mut self,
        operation: Operation,
        object: impl Into<String>,
        token: CancellationToken,
    ) -> Self {
        self.behavior
            .cancellations
            .push((operation, object.into(), token));
        self
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.activity.open_connections.load(Ordering::SeqCst)
    }

    /// Connections opened over the provider's lifetime.
    pub fn connections_opened(&self) -> usize {
        self.activity.connections_opened.load(Ordering::SeqCst)
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.activity
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConnectivityProvider for SnapshotProvider {
    fn product(&self) -> &str {
        &self.snapshot.database_info.product_name
    }

    fn supports(&self, category: MetadataCategory) -> bool {
        !self.snapshot.unsupported.contains(&category)
    }

    async fn open_connection(&self) -> Result<Box<dyn MetadataConnection>> {
        if self.behavior.refuse_connections {
            return Err(CrawlError::connection_failed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "snapshot provider refused the connection",
            )));
        }

        self.activity.open_connections.fetch_add(1, Ordering::SeqCst);
        self.activity
            .connections_opened
            .fetch_add(1, Ordering::SeqCst);
        debug!("Opened snapshot connection for {}", self.product());

        Ok(Box::new(SnapshotConnection {
            snapshot: Arc::clone(&self.snapshot),
            behavior: self.behavior.clone(),
            activity: Arc::clone(&self.activity),
        }))
    }
}

// ============================================================================
// Connection
// ============================================================================

struct SnapshotConnection {
    snapshot: Arc<DatabaseSnapshot>,
    behavior: Behavior,
    activity: Arc<Activity>,
}

impl SnapshotConnection {
    /// Records the call and applies latency and injected faults.
    async fn enter(&self, operation: Operation, object: &str) -> Result<()> {
        if let Ok(mut calls) = self.activity.calls.lock() {
            calls.push(RecordedCall {
                operation,
                object: object.to_string(),
            });
        }

        if let Some(latency) = self.behavior.latency {
            tokio::time::sleep(latency).await;
        }

        for (op, target, token) in &self.behavior.cancellations {
            if *op == operation && target == object {
                token.cancel();
            }
        }

        if self
            .behavior
            .connection_loss
            .as_ref()
            .is_some_and(|(op, target)| *op == operation && target == object)
        {
            return Err(CrawlError::connection_lost(
                format!("{} for '{}'", operation, object),
                std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                ),
            ));
        }

        if self
            .behavior
            .failures
            .contains(&(operation, object.to_string()))
        {
            return Err(CrawlError::collection_failed(
                format!("{} for '{}'", operation, object),
                std::io::Error::other("injected failure"),
            ));
        }

        Ok(())
    }

    fn arrange<T>(&self, operation: Operation, object: &str, mut rows: Vec<T>) -> Vec<T> {
        match self.behavior.row_order {
            RowOrder::AsIs => {}
            RowOrder::Reversed => rows.reverse(),
            RowOrder::Shuffled { seed } => {
                let mut hasher = DefaultHasher::new();
                (operation, object).hash(&mut hasher);
                let mut rng = StdRng::seed_from_u64(seed ^ hasher.finish());
                rows.shuffle(&mut rng);
            }
        }
        rows
    }

    fn check_supported(&self, category: MetadataCategory) -> Result<()> {
        self.check_any_supported(&[category])
    }

    /// Fails only when none of `categories` can be reported.
    fn check_any_supported(&self, categories: &[MetadataCategory]) -> Result<()> {
        match categories
            .iter()
            .find(|category| self.snapshot.unsupported.contains(category))
        {
            Some(category)
                if categories
                    .iter()
                    .all(|c| self.snapshot.unsupported.contains(c)) =>
            {
                Err(CrawlError::unsupported_feature(
                    category.as_str(),
                    self.snapshot.database_info.product_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    fn table(&self, name: &TableName) -> Result<&SnapshotTable> {
        self.snapshot
            .table(name)
            .ok_or_else(|| CrawlError::query_failed(format!("Table '{}' does not exist", name)))
    }

    fn schema(&self, name: &str) -> Result<&SnapshotSchema> {
        self.snapshot
            .schema(name)
            .ok_or_else(|| CrawlError::query_failed(format!("Schema '{}' does not exist", name)))
    }

    async fn table_rows<T, F>(
        &self,
        operation: Operation,
        categories: &[MetadataCategory],
        table: &TableName,
        select: F,
    ) -> Result<Vec<T>>
    where
        F: FnOnce(&SnapshotTable) -> Vec<T> + Send,
        T: Send,
    {
        let object = table.to_string();
        self.enter(operation, &object).await?;
        self.check_any_supported(categories)?;
        let rows = select(self.table(table)?);
        Ok(self.arrange(operation, &object, rows))
    }

    async fn schema_rows<T, F>(
        &self,
        operation: Operation,
        category: MetadataCategory,
        schema: &str,
        select: F,
    ) -> Result<Vec<T>>
    where
        F: FnOnce(&SnapshotSchema) -> Vec<T> + Send,
        T: Send,
    {
        self.enter(operation, schema).await?;
        self.check_supported(category)?;
        let rows = select(self.schema(schema)?);
        Ok(self.arrange(operation, schema, rows))
    }
}

#[async_trait]
impl MetadataConnection for SnapshotConnection {
    async fn database_info(&self) -> Result<DatabaseInfo> {
        self.enter(Operation::DatabaseInfo, "").await?;
        Ok(self.snapshot.database_info.clone())
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaRow>> {
        self.enter(Operation::ListSchemas, "").await?;
        let rows = self
            .snapshot
            .schemas
            .iter()
            .map(|schema| SchemaRow {
                name: schema.name.clone(),
            })
            .collect();
        Ok(self.arrange(Operation::ListSchemas, "", rows))
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableRow>> {
        self.schema_rows(Operation::ListTables, MetadataCategory::Tables, schema, |s| {
            s.tables.iter().map(|t| t.table.clone()).collect()
        })
        .await
    }

    async fn list_columns(&self, table: &TableName) -> Result<Vec<ColumnRow>> {
        self.table_rows(
            Operation::ListColumns,
            &[MetadataCategory::Columns],
            table,
            |t| t.columns.clone(),
        )
        .await
    }

    async fn list_constraints(&self, table: &TableName) -> Result<Vec<ConstraintRow>> {
        self.table_rows(
            Operation::ListConstraints,
            &[MetadataCategory::PrimaryKeys, MetadataCategory::TableConstraints],
            table,
            |t| t.constraints.clone(),
        )
        .await
    }

    async fn list_foreign_keys(&self, table: &TableName) -> Result<Vec<ForeignKeyRow>> {
        self.table_rows(
            Operation::ListForeignKeys,
            &[MetadataCategory::ForeignKeys],
            table,
            |t| t.foreign_keys.clone(),
        )
        .await
    }

    async fn list_indexes(&self, table: &TableName) -> Result<Vec<IndexRow>> {
        self.table_rows(
            Operation::ListIndexes,
            &[MetadataCategory::Indexes],
            table,
            |t| t.indexes.clone(),
        )
        .await
    }

    async fn list_routines(&self, schema: &str) -> Result<Vec<RoutineRow>> {
        self.schema_rows(
            Operation::ListRoutines,
            MetadataCategory::Routines,
            schema,
            |s| s.routines.iter().map(|r| r.routine.clone()).collect(),
        )
        .await
    }

    async fn list_routine_parameters(&self, routine: &ObjectName) -> Result<Vec<ParameterRow>> {
        let object = routine.to_string();
        self.enter(Operation::ListRoutineParameters, &object).await?;
        self.check_supported(MetadataCategory::RoutineParameters)?;
        let rows = self
            .snapshot
            .routine(routine)
            .map(|r| r.parameters.clone())
            .ok_or_else(|| {
                CrawlError::query_failed(format!("Routine '{}' does not exist", routine))
            })?;
        Ok(self.arrange(Operation::ListRoutineParameters, &object, rows))
    }

    async fn list_sequences(&self, schema: &str) -> Result<Vec<SequenceRow>> {
        self.schema_rows(
            Operation::ListSequences,
            MetadataCategory::Sequences,
            schema,
            |s| s.sequences.clone(),
        )
        .await
    }

    async fn list_synonyms(&self, schema: &str) -> Result<Vec<SynonymRow>> {
        self.schema_rows(
            Operation::ListSynonyms,
            MetadataCategory::Synonyms,
            schema,
            |s| s.synonyms.clone(),
        )
        .await
    }

    async fn list_table_privileges(&self, table: &TableName) -> Result<Vec<PrivilegeRow>> {
        self.table_rows(
            Operation::ListTablePrivileges,
            &[MetadataCategory::TablePrivileges],
            table,
            |t| {
                t.privileges
                    .iter()
                    .filter(|p| p.column.is_none())
                    .cloned()
                    .collect()
            },
        )
        .await
    }

    async fn list_column_privileges(&self, table: &TableName) -> Result<Vec<PrivilegeRow>> {
        self.table_rows(
            Operation::ListColumnPrivileges,
            &[MetadataCategory::ColumnPrivileges],
            table,
            |t| {
                t.privileges
                    .iter()
                    .filter(|p| p.column.is_some())
                    .cloned()
                    .collect()
            },
        )
        .await
    }

    async fn count_rows(&self, table: &TableName) -> Result<u64> {
        let object = table.to_string();
        self.enter(Operation::CountRows, &object).await?;
        self.check_supported(MetadataCategory::TableRowCounts)?;
        self.table(table)?
            .row_count
            .ok_or_else(|| CrawlError::query_failed(format!("No row count for '{}'", table)))
    }

    async fn close(&self) {
        self.activity.open_connections.fetch_sub(1, Ordering::SeqCst);
        debug!("Closed snapshot connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> DatabaseSnapshot {
        serde_json::from_value(json!({
            "database_info": { "product_name": "TestDB", "product_version": "1.0" },
            "unsupported": ["synonyms"],
            "schemas": [
                {
                    "name": "books",
                    "tables": [
                        {
                            "name": "authors",
                            "columns": [
                                { "name": "id", "ordinal_position": 1, "data_type": "int", "is_nullable": false },
                                { "name": "name", "ordinal_position": 2, "data_type": "text" },
                                { "name": "email", "ordinal_position": 3, "data_type": "text" }
                            ],
                            "privileges": [
                                { "privilege": "SELECT", "grantee": "reader" },
                                { "privilege": "UPDATE", "grantee": "editor", "column": "name" }
                            ],
                            "row_count": 20
                        }
                    ],
                    "routines": [
                        { "name": "new_author", "specific_name": "new_author_1", "parameters": [
                            { "name": "author_name", "ordinal_position": 1, "data_type": "text" }
                        ] }
                    ]
                }
            ]
        }))
        .unwrap()
    }

    fn authors() -> TableName {
        TableName::new("books", "authors")
    }

    #[tokio::test]
    async fn test_serves_snapshot_rows() -> Result<()> {
        let provider = SnapshotProvider::new(snapshot());
        let conn = provider.open_connection().await?;

        assert_eq!(conn.database_info().await?.product_name, "TestDB");
        assert_eq!(conn.list_schemas().await?.len(), 1);
        assert_eq!(conn.list_tables("books").await?[0].name, "authors");
        assert_eq!(conn.list_columns(&authors()).await?.len(), 3);
        assert_eq!(conn.list_table_privileges(&authors()).await?.len(), 1);
        assert_eq!(conn.list_column_privileges(&authors()).await?.len(), 1);
        assert_eq!(conn.count_rows(&authors()).await?, 20);

        let params = conn
            .list_routine_parameters(&ObjectName::new("books", "new_author_1"))
            .await?;
        assert_eq!(params[0].name, "author_name");

        conn.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unsupported_category() -> Result<()> {
        let provider = SnapshotProvider::new(snapshot()).with_unsupported(MetadataCategory::Indexes);
        assert!(!provider.supports(MetadataCategory::Synonyms));
        assert!(!provider.supports(MetadataCategory::Indexes));
        assert!(provider.supports(MetadataCategory::Columns));

        let conn = provider.open_connection().await?;
        let result = conn.list_synonyms("books").await;
        assert!(matches!(result, Err(CrawlError::UnsupportedFeature { .. })));
        conn.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_shuffle_is_seeded() -> Result<()> {
        let first = SnapshotProvider::new(snapshot()).with_row_order(RowOrder::Shuffled { seed: 7 });
        let second = SnapshotProvider::new(snapshot()).with_row_order(RowOrder::Shuffled { seed: 7 });

        let a = first.open_connection().await?.list_columns(&authors()).await?;
        let b = second.open_connection().await?.list_columns(&authors()).await?;
        assert_eq!(a, b);
        Ok(())
    }

    #[tokio::test]
    async fn test_reversed_order() -> Result<()> {
        let provider = SnapshotProvider::new(snapshot()).with_row_order(RowOrder::Reversed);
        let conn = provider.open_connection().await?;
        let columns = conn.list_columns(&authors()).await?;
        assert_eq!(columns[0].name, "email");
        Ok(())
    }

    #[tokio::test]
    async fn test_fault_injection() -> Result<()> {
        let provider = SnapshotProvider::new(snapshot())
            .fail_on(Operation::ListColumns, "books.authors")
            .lose_connection_on(Operation::CountRows, "books.authors");
        let conn = provider.open_connection().await?;

        let failure = conn.list_columns(&authors()).await.unwrap_err();
        assert!(!failure.is_fatal());

        let lost = conn.count_rows(&authors()).await.unwrap_err();
        assert!(matches!(lost, CrawlError::Connection { .. }));

        conn.close().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_tracks_connections_and_calls() -> Result<()> {
        let provider = SnapshotProvider::new(snapshot());
        let conn = provider.open_connection().await?;
        assert_eq!(provider.open_connections(), 1);

        conn.list_tables("books").await?;
        conn.close().await;

        assert_eq!(provider.open_connections(), 0);
        assert_eq!(provider.connections_opened(), 1);
        assert_eq!(
            provider.calls(),
            vec![RecordedCall {
                operation: Operation::ListTables,
                object: "books".to_string(),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let provider = SnapshotProvider::new(snapshot()).refuse_connections();
        let result = provider.open_connection().await;
        assert!(matches!(result, Err(CrawlError::Connection { .. })));
        assert_eq!(provider.open_connections(), 0);
    }
}
