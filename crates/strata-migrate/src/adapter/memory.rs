//! In-process adapter.
//!
//! Keeps tables, rows and the version log in memory. Transactions are
//! snapshots of the whole state. Useful for tests and dry runs; nothing is
//! persisted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use super::{Adapter, AdapterOptions};
use crate::action::Action;
use crate::error::{MigrateError, Result};
use crate::history::{self, MigrationInfo, VersionLogEntry, MIGRATION_NAME_LIMIT};
use crate::migration::Direction;
use crate::schema::{Column, ColumnType, ForeignKey, Index, Row, TableOptions, TableRef, TableUpdate};

/// A table held by the memory adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    /// Table options it was created with.
    pub options: TableOptions,
    /// Columns, including the implicit id.
    pub columns: Vec<Column>,
    /// Indexes, always named.
    pub indexes: Vec<Index>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Table comment.
    pub comment: Option<String>,
    /// Stored rows.
    pub rows: Vec<Row>,
}

impl MemoryTable {
    fn column_index(&self, table: &str, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Column '{column}' does not exist in table '{table}'"
                ))
            })
    }
}

/// Everything the memory adapter knows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    /// Tables by name.
    pub tables: BTreeMap<String, MemoryTable>,
    /// Version log, in insertion order.
    pub log: Vec<VersionLogEntry>,
    /// Every action applied, in order.
    pub executed: Vec<Action>,
    /// Raw statements passed to `execute`.
    pub statements: Vec<String>,
}

impl MemoryState {
    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| MigrateError::InvalidState(format!("Table '{name}' does not exist")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| MigrateError::InvalidState(format!("Table '{name}' does not exist")))
    }

    /// Applies one action to the state.
    fn apply(&mut self, action: &Action) -> Result<()> {
        let name = action.table().name.clone();
        match action {
            Action::CreateTable {
                table,
                columns,
                indexes,
                foreign_keys,
            } => {
                if self.tables.contains_key(&name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{name}' already exists"
                    )));
                }
                for fk in foreign_keys {
                    if fk.referenced_table != name {
                        self.table(&fk.referenced_table)?;
                    }
                }
                let mut all_columns = Vec::with_capacity(columns.len() + 1);
                if let Some(id) = table.options.id_column() {
                    all_columns.push(Column::new(id, ColumnType::Integer).identity());
                }
                all_columns.extend(columns.iter().cloned());
                self.tables.insert(
                    name.clone(),
                    MemoryTable {
                        options: table.options.clone(),
                        columns: all_columns,
                        indexes: indexes.iter().map(|i| named_index(&name, i)).collect(),
                        foreign_keys: foreign_keys.clone(),
                        comment: table.options.comment.clone(),
                        rows: Vec::new(),
                    },
                );
            }

            Action::DropTable { .. } => {
                self.tables.remove(&name).ok_or_else(|| {
                    MigrateError::InvalidState(format!("Table '{name}' does not exist"))
                })?;
            }

            Action::RenameTable { new_name, .. } => {
                if self.tables.contains_key(new_name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{new_name}' already exists"
                    )));
                }
                let table = self.tables.remove(&name).ok_or_else(|| {
                    MigrateError::InvalidState(format!("Table '{name}' does not exist"))
                })?;
                self.tables.insert(new_name.clone(), table);
            }

            Action::AddColumn { column, .. } => {
                let t = self.table_mut(&name)?;
                if t.columns.iter().any(|c| c.name == column.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{}' already exists in table '{name}'",
                        column.name
                    )));
                }
                t.columns.push(column.clone());
            }

            Action::RemoveColumn { column, .. } => {
                let t = self.table_mut(&name)?;
                let idx = t.column_index(&name, column)?;
                t.columns.remove(idx);
                for row in &mut t.rows {
                    row.remove(column);
                }
            }

            Action::RenameColumn {
                column, new_name, ..
            } => {
                let t = self.table_mut(&name)?;
                let idx = t.column_index(&name, column)?;
                t.columns[idx].name = new_name.clone();
                for row in &mut t.rows {
                    if let Some(value) = row.remove(column) {
                        row.insert(new_name.clone(), value);
                    }
                }
            }

            Action::ChangeColumn {
                column, definition, ..
            } => {
                let t = self.table_mut(&name)?;
                let idx = t.column_index(&name, column)?;
                t.columns[idx] = definition.clone();
            }

            Action::AddIndex { index, .. } => {
                let index = named_index(&name, index);
                let t = self.table_mut(&name)?;
                if t.indexes.iter().any(|i| i.name == index.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' already exists",
                        index.name_for(&name)
                    )));
                }
                t.indexes.push(index);
            }

            Action::DropIndex { index, .. } => {
                let t = self.table_mut(&name)?;
                let before = t.indexes.len();
                match &index.name {
                    Some(index_name) => t.indexes.retain(|i| i.name.as_ref() != Some(index_name)),
                    None => t.indexes.retain(|i| i.columns != index.columns),
                }
                if t.indexes.len() == before {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' does not exist",
                        index.name_for(&name)
                    )));
                }
            }

            Action::AddForeignKey { foreign_key, .. } => {
                self.table(&foreign_key.referenced_table)?;
                self.table_mut(&name)?.foreign_keys.push(foreign_key.clone());
            }

            Action::DropForeignKey { foreign_key, .. } => {
                let t = self.table_mut(&name)?;
                let before = t.foreign_keys.len();
                t.foreign_keys
                    .retain(|fk| !foreign_key_matches(fk, &foreign_key.columns, foreign_key.name.as_deref()));
                if t.foreign_keys.len() == before {
                    return Err(MigrateError::InvalidState(format!(
                        "No foreign key on columns ({}) of table '{name}'",
                        foreign_key.columns.join(", ")
                    )));
                }
            }

            Action::UpdateTable { update, .. } => {
                let t = self.table_mut(&name)?;
                if update.comment.is_some() {
                    t.comment = update.comment.clone();
                }
            }
        }
        self.executed.push(action.clone());
        Ok(())
    }
}

fn named_index(table: &str, index: &Index) -> Index {
    Index {
        name: Some(index.name_for(table)),
        ..index.clone()
    }
}

fn foreign_key_matches(fk: &ForeignKey, columns: &[String], constraint: Option<&str>) -> bool {
    match constraint {
        Some(name) if columns.is_empty() => fk.name.as_deref() == Some(name),
        Some(name) => fk.columns == columns && fk.name.as_deref() == Some(name),
        None => fk.columns == columns,
    }
}

/// Adapter over [`MemoryState`].
#[derive(Debug)]
pub struct MemoryAdapter {
    options: AdapterOptions,
    direct_actions: bool,
    state: Mutex<MemoryState>,
    savepoint: Mutex<Option<MemoryState>>,
}

impl MemoryAdapter {
    /// Creates an empty memory adapter.
    #[must_use]
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            direct_actions: true,
            state: Mutex::new(MemoryState::default()),
            savepoint: Mutex::new(None),
        }
    }

    /// Enables or disables the direct DDL methods.
    ///
    /// With direct actions disabled the adapter only accepts batches.
    #[must_use]
    pub fn with_direct_actions(mut self, enabled: bool) -> Self {
        self.direct_actions = enabled;
        self
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Returns the names of the existing tables.
    pub async fn table_names(&self) -> Vec<String> {
        self.state.lock().await.tables.keys().cloned().collect()
    }

    /// Returns the rows stored in a table.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.state.lock().await.table(table)?.rows.clone())
    }

    async fn apply_direct(&self, operation: &str, action: Action) -> Result<()> {
        if !self.direct_actions {
            return Err(MigrateError::unsupported(self.adapter_type(), operation));
        }
        self.state.lock().await.apply(&action)
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn adapter_type(&self) -> &str {
        "memory"
    }

    fn options(&self) -> &AdapterOptions {
        &self.options
    }

    fn column_types(&self) -> Vec<ColumnType> {
        vec![
            ColumnType::BigInteger,
            ColumnType::SmallInteger,
            ColumnType::Integer,
            ColumnType::Binary,
            ColumnType::Blob,
            ColumnType::Boolean,
            ColumnType::Char,
            ColumnType::String,
            ColumnType::Text,
            ColumnType::Date,
            ColumnType::DateTime,
            ColumnType::Time,
            ColumnType::Timestamp,
            ColumnType::Decimal,
            ColumnType::Float,
            ColumnType::Uuid,
            ColumnType::Json,
            ColumnType::Jsonb,
            ColumnType::Enum,
            ColumnType::Set,
        ]
    }

    fn supports_direct_actions(&self) -> bool {
        self.direct_actions
    }

    fn has_transactions(&self) -> bool {
        true
    }

    async fn begin_transaction(&self) -> Result<()> {
        let current = self.state.lock().await.clone();
        *self.savepoint.lock().await = Some(current);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.savepoint.lock().await.take();
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        if let Some(saved) = self.savepoint.lock().await.take() {
            *self.state.lock().await = saved;
        }
        Ok(())
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.state.lock().await.tables.contains_key(table))
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.columns.iter().any(|c| c.name == column)))
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        Ok(self.state.lock().await.table(table)?.columns.clone())
    }

    async fn has_index(&self, table: &str, columns: &[String]) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.indexes.iter().any(|i| i.columns == columns)))
    }

    async fn has_index_by_name(&self, table: &str, name: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.indexes.iter().any(|i| i.name.as_deref() == Some(name))))
    }

    async fn has_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.tables.get(table).is_some_and(|t| {
            t.foreign_keys
                .iter()
                .any(|fk| foreign_key_matches(fk, columns, constraint))
        }))
    }

    async fn create_table(
        &self,
        table: &TableRef,
        columns: &[Column],
        indexes: &[Index],
        foreign_keys: &[ForeignKey],
    ) -> Result<()> {
        self.apply_direct(
            "create_table",
            Action::CreateTable {
                table: table.clone(),
                columns: columns.to_vec(),
                indexes: indexes.to_vec(),
                foreign_keys: foreign_keys.to_vec(),
            },
        )
        .await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.apply_direct(
            "drop_table",
            Action::DropTable {
                table: TableRef::new(table),
            },
        )
        .await
    }

    async fn rename_table(&self, table: &str, new_name: &str) -> Result<()> {
        self.apply_direct(
            "rename_table",
            Action::RenameTable {
                table: TableRef::new(table),
                new_name: new_name.to_string(),
            },
        )
        .await
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        self.apply_direct(
            "add_column",
            Action::AddColumn {
                table: TableRef::new(table),
                column: column.clone(),
            },
        )
        .await
    }

    async fn rename_column(&self, table: &str, column: &str, new_name: &str) -> Result<()> {
        self.apply_direct(
            "rename_column",
            Action::RenameColumn {
                table: TableRef::new(table),
                column: column.to_string(),
                new_name: new_name.to_string(),
            },
        )
        .await
    }

    async fn change_column(&self, table: &str, column: &str, definition: &Column) -> Result<()> {
        self.apply_direct(
            "change_column",
            Action::ChangeColumn {
                table: TableRef::new(table),
                column: column.to_string(),
                definition: definition.clone(),
            },
        )
        .await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.apply_direct(
            "drop_column",
            Action::RemoveColumn {
                table: TableRef::new(table),
                column: column.to_string(),
            },
        )
        .await
    }

    async fn add_index(&self, table: &str, index: &Index) -> Result<()> {
        self.apply_direct(
            "add_index",
            Action::AddIndex {
                table: TableRef::new(table),
                index: index.clone(),
            },
        )
        .await
    }

    async fn drop_index(&self, table: &str, columns: &[String]) -> Result<()> {
        self.apply_direct(
            "drop_index",
            Action::DropIndex {
                table: TableRef::new(table),
                index: Index::new(columns.iter().cloned()),
            },
        )
        .await
    }

    async fn drop_index_by_name(&self, table: &str, name: &str) -> Result<()> {
        self.apply_direct(
            "drop_index_by_name",
            Action::DropIndex {
                table: TableRef::new(table),
                index: Index::named(name),
            },
        )
        .await
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<()> {
        self.apply_direct(
            "add_foreign_key",
            Action::AddForeignKey {
                table: TableRef::new(table),
                foreign_key: foreign_key.clone(),
            },
        )
        .await
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<()> {
        self.apply_direct(
            "drop_foreign_key",
            Action::DropForeignKey {
                table: TableRef::new(table),
                foreign_key: ForeignKey::reference(columns.iter().cloned(), constraint.map(str::to_string)),
            },
        )
        .await
    }

    async fn update_table(&self, table: &str, update: &TableUpdate) -> Result<()> {
        self.apply_direct(
            "update_table",
            Action::UpdateTable {
                table: TableRef::new(table),
                update: update.clone(),
            },
        )
        .await
    }

    async fn execute_actions(&self, table: &TableRef, actions: &[Action]) -> Result<()> {
        let mut state = self.state.lock().await;
        for action in actions {
            state
                .apply(action)
                .map_err(|e| MigrateError::action_failed(action.kind(), &table.name, e))?;
        }
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        self.state.lock().await.table_mut(table)?.rows.clear();
        Ok(())
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<()> {
        self.state.lock().await.table_mut(table)?.rows.push(row.clone());
        Ok(())
    }

    async fn bulk_insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.state
            .lock()
            .await
            .table_mut(table)?
            .rows
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.state.lock().await.statements.push(sql.to_string());
        Ok(0)
    }

    async fn has_schema_table(&self) -> Result<bool> {
        self.has_table(&self.options.schema_table).await
    }

    async fn create_schema_table(&self) -> Result<()> {
        history::create_schema_table(self, &self.options.schema_table, &self.options.log_fields).await
    }

    async fn get_version_log(&self) -> Result<Vec<VersionLogEntry>> {
        let mut log = self.state.lock().await.log.clone();
        self.options.version_order.sort(&mut log);
        Ok(log)
    }

    async fn migrated(
        &self,
        migration: &MigrationInfo,
        direction: Direction,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        match direction {
            Direction::Up => {
                let name: String = migration
                    .name
                    .chars()
                    .take(MIGRATION_NAME_LIMIT as usize)
                    .collect();
                state.log.push(VersionLogEntry {
                    version: migration.version,
                    migration_name: Some(name),
                    start_time: Some(start_time),
                    end_time: Some(end_time),
                    breakpoint: false,
                });
            }
            Direction::Down => state.log.retain(|e| e.version != migration.version),
        }
        Ok(())
    }

    async fn toggle_breakpoint(&self, version: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.log.iter_mut().find(|e| e.version == version) {
            entry.breakpoint = !entry.breakpoint;
        }
        Ok(())
    }

    async fn reset_all_breakpoints(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for entry in state.log.iter_mut().filter(|e| e.breakpoint) {
            entry.breakpoint = false;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexOptions;

    fn adapter() -> MemoryAdapter {
        MemoryAdapter::new(AdapterOptions::new("memory"))
    }

    fn create_users() -> Action {
        Action::CreateTable {
            table: TableRef::new("users"),
            columns: vec![Column::new("email", ColumnType::String)],
            indexes: vec![Index::new(["email"]).with_options(IndexOptions::new().unique())],
            foreign_keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_table_adds_implicit_id() {
        let adapter = adapter();
        adapter
            .execute_actions(&TableRef::new("users"), &[create_users()])
            .await
            .expect("create");

        let columns = adapter.get_columns("users").await.expect("columns");
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email"]);
        assert!(adapter.has_index_by_name("users", "users_email").await.expect("query"));
    }

    #[tokio::test]
    async fn test_failed_action_names_kind() {
        let adapter = adapter();
        let err = adapter
            .execute_actions(
                &TableRef::new("users"),
                &[Action::DropTable {
                    table: TableRef::new("users"),
                }],
            )
            .await
            .expect_err("missing table");

        assert!(matches!(
            err,
            MigrateError::ActionFailed {
                kind: crate::action::ActionKind::DropTable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let adapter = adapter();
        adapter.begin_transaction().await.expect("begin");
        adapter
            .execute_actions(&TableRef::new("users"), &[create_users()])
            .await
            .expect("create");
        adapter.rollback_transaction().await.expect("rollback");

        assert!(!adapter.has_table("users").await.expect("query"));
    }

    #[tokio::test]
    async fn test_batch_only_rejects_direct_calls() {
        let adapter = adapter().with_direct_actions(false);
        assert!(!adapter.supports_direct_actions());

        let err = adapter.drop_table("users").await.expect_err("not supported");
        assert!(matches!(err, MigrateError::AdapterCapability { .. }));

        adapter
            .execute_actions(&TableRef::new("users"), &[create_users()])
            .await
            .expect("batches still work");
    }

    #[tokio::test]
    async fn test_breakpoints() {
        let adapter = adapter();
        let now = chrono::Local::now().naive_local();
        for version in [1, 2] {
            adapter
                .migrated(&MigrationInfo::new(version, "M"), Direction::Up, now, now)
                .await
                .expect("log");
        }

        adapter.toggle_breakpoint(2).await.expect("toggle");
        let log = adapter.get_version_log().await.expect("log");
        assert!(log[1].breakpoint);

        assert_eq!(adapter.reset_all_breakpoints().await.expect("reset"), 1);
        assert_eq!(adapter.reset_all_breakpoints().await.expect("reset"), 0);
    }
}
