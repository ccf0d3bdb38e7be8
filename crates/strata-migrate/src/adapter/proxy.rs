//! Recording proxy used to run a `change` body backwards.
//!
//! While a body runs against the proxy, schema changes are recorded
//! instead of executed. Afterwards the recorded actions are inverted in
//! reverse order and replayed against the wrapped adapter. Data writes
//! cannot be inverted and are refused as soon as they are issued.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Adapter, AdapterOptions};
use crate::action::Action;
use crate::error::{MigrateError, Result};
use crate::history::{MigrationInfo, VersionLogEntry};
use crate::migration::Direction;
use crate::schema::{Column, ColumnType, ForeignKey, Index, Row, TableRef, TableUpdate};

/// Adapter decorator that records schema changes for later inversion.
pub struct ProxyAdapter {
    inner: Arc<dyn Adapter>,
    commands: Mutex<Vec<Action>>,
}

impl ProxyAdapter {
    /// Wraps an adapter.
    #[must_use]
    pub fn new(inner: Arc<dyn Adapter>) -> Self {
        Self {
            inner,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded actions in call order.
    pub async fn recorded(&self) -> Vec<Action> {
        self.commands.lock().await.clone()
    }

    /// Returns the inverse of every recorded action, last call first.
    ///
    /// # Errors
    ///
    /// Returns `IrreversibleAction` naming the first action that has no
    /// inverse.
    pub async fn inverted_actions(&self) -> Result<Vec<Action>> {
        self.commands
            .lock()
            .await
            .iter()
            .rev()
            .map(Action::invert)
            .collect()
    }

    /// Executes the inverted actions against the wrapped adapter.
    ///
    /// All inverses are computed before anything runs. Consecutive actions
    /// on the same table are sent as one batch.
    pub async fn execute_inverted(&self) -> Result<()> {
        let inverted = self.inverted_actions().await?;
        let mut batches: Vec<(TableRef, Vec<Action>)> = Vec::new();
        for action in inverted {
            match batches.last_mut() {
                Some((table, actions)) if table.name == action.table().name => actions.push(action),
                _ => batches.push((action.table().clone(), vec![action])),
            }
        }

        for (table, actions) in &batches {
            debug!(table = %table.name, count = actions.len(), "Replaying inverted actions");
            self.inner.execute_actions(table, actions).await?;
        }
        Ok(())
    }

    async fn record(&self, action: Action) -> Result<()> {
        self.commands.lock().await.push(action);
        Ok(())
    }
}

#[async_trait]
impl Adapter for ProxyAdapter {
    fn adapter_type(&self) -> &str {
        self.inner.adapter_type()
    }

    fn options(&self) -> &AdapterOptions {
        self.inner.options()
    }

    fn column_types(&self) -> Vec<ColumnType> {
        self.inner.column_types()
    }

    fn is_valid_column_type(&self, column: &Column) -> bool {
        self.inner.is_valid_column_type(column)
    }

    fn supports_direct_actions(&self) -> bool {
        true
    }

    fn has_transactions(&self) -> bool {
        self.inner.has_transactions()
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.inner.begin_transaction().await
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.inner.commit_transaction().await
    }

    async fn rollback_transaction(&self) -> Result<()> {
        self.inner.rollback_transaction().await
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        self.inner.has_table(table).await
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.inner.has_column(table, column).await
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.inner.get_columns(table).await
    }

    async fn has_index(&self, table: &str, columns: &[String]) -> Result<bool> {
        self.inner.has_index(table, columns).await
    }

    async fn has_index_by_name(&self, table: &str, name: &str) -> Result<bool> {
        self.inner.has_index_by_name(table, name).await
    }

    async fn has_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<bool> {
        self.inner.has_foreign_key(table, columns, constraint).await
    }

    async fn create_table(
        &self,
        table: &TableRef,
        columns: &[Column],
        indexes: &[Index],
        foreign_keys: &[ForeignKey],
    ) -> Result<()> {
        self.record(Action::CreateTable {
            table: table.clone(),
            columns: columns.to_vec(),
            indexes: indexes.to_vec(),
            foreign_keys: foreign_keys.to_vec(),
        })
        .await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.record(Action::DropTable {
            table: TableRef::new(table),
        })
        .await
    }

    async fn rename_table(&self, table: &str, new_name: &str) -> Result<()> {
        self.record(Action::RenameTable {
            table: TableRef::new(table),
            new_name: new_name.to_string(),
        })
        .await
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        self.record(Action::AddColumn {
            table: TableRef::new(table),
            column: column.clone(),
        })
        .await
    }

    async fn rename_column(&self, table: &str, column: &str, new_name: &str) -> Result<()> {
        self.record(Action::RenameColumn {
            table: TableRef::new(table),
            column: column.to_string(),
            new_name: new_name.to_string(),
        })
        .await
    }

    async fn change_column(&self, table: &str, column: &str, definition: &Column) -> Result<()> {
        self.record(Action::ChangeColumn {
            table: TableRef::new(table),
            column: column.to_string(),
            definition: definition.clone(),
        })
        .await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.record(Action::RemoveColumn {
            table: TableRef::new(table),
            column: column.to_string(),
        })
        .await
    }

    async fn add_index(&self, table: &str, index: &Index) -> Result<()> {
        self.record(Action::AddIndex {
            table: TableRef::new(table),
            index: index.clone(),
        })
        .await
    }

    async fn drop_index(&self, table: &str, columns: &[String]) -> Result<()> {
        self.record(Action::DropIndex {
            table: TableRef::new(table),
            index: Index::new(columns.iter().cloned()),
        })
        .await
    }

    async fn drop_index_by_name(&self, table: &str, name: &str) -> Result<()> {
        self.record(Action::DropIndex {
            table: TableRef::new(table),
            index: Index::named(name),
        })
        .await
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<()> {
        self.record(Action::AddForeignKey {
            table: TableRef::new(table),
            foreign_key: foreign_key.clone(),
        })
        .await
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<()> {
        self.record(Action::DropForeignKey {
            table: TableRef::new(table),
            foreign_key: ForeignKey::reference(columns.iter().cloned(), constraint.map(str::to_string)),
        })
        .await
    }

    async fn update_table(&self, table: &str, update: &TableUpdate) -> Result<()> {
        self.record(Action::UpdateTable {
            table: TableRef::new(table),
            update: update.clone(),
        })
        .await
    }

    async fn execute_actions(&self, _table: &TableRef, actions: &[Action]) -> Result<()> {
        self.commands.lock().await.extend(actions.iter().cloned());
        Ok(())
    }

    async fn truncate_table(&self, _table: &str) -> Result<()> {
        Err(MigrateError::IrreversibleAction("truncate".to_string()))
    }

    async fn insert(&self, _table: &str, _row: &Row) -> Result<()> {
        Err(MigrateError::IrreversibleAction("insert".to_string()))
    }

    async fn bulk_insert(&self, _table: &str, _rows: &[Row]) -> Result<()> {
        Err(MigrateError::IrreversibleAction("insert".to_string()))
    }

    async fn execute(&self, _sql: &str) -> Result<u64> {
        Err(MigrateError::IrreversibleAction("execute".to_string()))
    }

    async fn has_schema_table(&self) -> Result<bool> {
        self.inner.has_schema_table().await
    }

    async fn create_schema_table(&self) -> Result<()> {
        self.inner.create_schema_table().await
    }

    async fn get_version_log(&self) -> Result<Vec<VersionLogEntry>> {
        self.inner.get_version_log().await
    }

    async fn get_versions(&self) -> Result<Vec<i64>> {
        self.inner.get_versions().await
    }

    async fn migrated(
        &self,
        migration: &MigrationInfo,
        direction: Direction,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<()> {
        self.inner
            .migrated(migration, direction, start_time, end_time)
            .await
    }

    async fn toggle_breakpoint(&self, version: i64) -> Result<()> {
        self.inner.toggle_breakpoint(version).await
    }

    async fn reset_all_breakpoints(&self) -> Result<u64> {
        self.inner.reset_all_breakpoints().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::adapter::MemoryAdapter;

    fn proxy() -> (Arc<MemoryAdapter>, ProxyAdapter) {
        let memory = Arc::new(MemoryAdapter::new(AdapterOptions::new("memory")));
        (memory.clone(), ProxyAdapter::new(memory))
    }

    #[tokio::test]
    async fn test_inversion_reverses_call_order() {
        let (_, proxy) = proxy();
        proxy
            .add_column("users", &Column::new("email", ColumnType::String))
            .await
            .expect("record");
        proxy
            .add_index("users", &Index::new(["email"]))
            .await
            .expect("record");
        proxy
            .create_table(&TableRef::new("posts"), &[], &[], &[])
            .await
            .expect("record");

        let kinds: Vec<_> = proxy
            .inverted_actions()
            .await
            .expect("all reversible")
            .iter()
            .map(Action::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ActionKind::DropTable, ActionKind::DropIndex, ActionKind::RemoveColumn]
        );
    }

    #[tokio::test]
    async fn test_irreversible_action_fails_before_executing() {
        let (memory, proxy) = proxy();
        memory
            .execute_actions(
                &TableRef::new("users"),
                &[Action::CreateTable {
                    table: TableRef::new("users"),
                    columns: vec![],
                    indexes: vec![],
                    foreign_keys: vec![],
                }],
            )
            .await
            .expect("seed");

        proxy.drop_column("users", "legacy").await.expect("record");
        proxy
            .create_table(&TableRef::new("posts"), &[], &[], &[])
            .await
            .expect("record");

        let err = proxy.execute_inverted().await.expect_err("remove is irreversible");
        assert!(matches!(err, MigrateError::IrreversibleAction(ref kind) if kind == "RemoveColumn"));
        assert_eq!(memory.table_names().await, vec!["users".to_string()]);
    }

    #[tokio::test]
    async fn test_data_writes_are_refused() {
        let (_, proxy) = proxy();
        assert!(matches!(
            proxy.insert("users", &Row::new()).await,
            Err(MigrateError::IrreversibleAction(_))
        ));
        assert!(proxy.execute("DELETE FROM users").await.is_err());
    }

    #[tokio::test]
    async fn test_execute_inverted_replays_against_inner() {
        let (memory, proxy) = proxy();
        let users = TableRef::new("users");
        let create = Action::CreateTable {
            table: users.clone(),
            columns: vec![Column::new("email", ColumnType::String)],
            indexes: vec![Index::new(["email"])],
            foreign_keys: vec![],
        };
        memory
            .execute_actions(&users, &[create.clone()])
            .await
            .expect("forward");

        proxy.execute_actions(&users, &[create]).await.expect("record");
        proxy.execute_inverted().await.expect("replay");

        assert!(memory.table_names().await.is_empty());
    }
}
