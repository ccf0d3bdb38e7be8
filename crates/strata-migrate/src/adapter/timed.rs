//! Timing decorator.
//!
//! Measures every mutating adapter call and reports it through `tracing`.
//! Queries pass straight through.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::{Adapter, AdapterOptions};
use crate::action::Action;
use crate::error::Result;
use crate::history::{MigrationInfo, VersionLogEntry};
use crate::migration::Direction;
use crate::schema::{Column, ColumnType, ForeignKey, Index, Row, TableRef, TableUpdate};

/// Adapter decorator that logs elapsed time of mutating calls.
pub struct TimedAdapter {
    inner: Arc<dyn Adapter>,
}

impl TimedAdapter {
    /// Wraps an adapter.
    #[must_use]
    pub fn new(inner: Arc<dyn Adapter>) -> Self {
        Self { inner }
    }

    async fn timed<T, F>(&self, operation: &str, target: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let start = Instant::now();
        let result = call.await;
        debug!(
            operation = %operation,
            target = %target,
            elapsed = ?start.elapsed(),
            ok = result.is_ok(),
            "Adapter call"
        );
        result
    }
}

#[async_trait]
impl Adapter for TimedAdapter {
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
        self.inner.supports_direct_actions()
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
        self.timed(
            "create_table",
            &table.name,
            self.inner.create_table(table, columns, indexes, foreign_keys),
        )
        .await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.timed("drop_table", table, self.inner.drop_table(table))
            .await
    }

    async fn rename_table(&self, table: &str, new_name: &str) -> Result<()> {
        self.timed("rename_table", table, self.inner.rename_table(table, new_name))
            .await
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        self.timed("add_column", table, self.inner.add_column(table, column))
            .await
    }

    async fn rename_column(&self, table: &str, column: &str, new_name: &str) -> Result<()> {
        self.timed(
            "rename_column",
            table,
            self.inner.rename_column(table, column, new_name),
        )
        .await
    }

    async fn change_column(&self, table: &str, column: &str, definition: &Column) -> Result<()> {
        self.timed(
            "change_column",
            table,
            self.inner.change_column(table, column, definition),
        )
        .await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.timed("drop_column", table, self.inner.drop_column(table, column))
            .await
    }

    async fn add_index(&self, table: &str, index: &Index) -> Result<()> {
        self.timed("add_index", table, self.inner.add_index(table, index))
            .await
    }

    async fn drop_index(&self, table: &str, columns: &[String]) -> Result<()> {
        self.timed("drop_index", table, self.inner.drop_index(table, columns))
            .await
    }

    async fn drop_index_by_name(&self, table: &str, name: &str) -> Result<()> {
        self.timed(
            "drop_index_by_name",
            table,
            self.inner.drop_index_by_name(table, name),
        )
        .await
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<()> {
        self.timed(
            "add_foreign_key",
            table,
            self.inner.add_foreign_key(table, foreign_key),
        )
        .await
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<()> {
        self.timed(
            "drop_foreign_key",
            table,
            self.inner.drop_foreign_key(table, columns, constraint),
        )
        .await
    }

    async fn update_table(&self, table: &str, update: &TableUpdate) -> Result<()> {
        self.timed("update_table", table, self.inner.update_table(table, update))
            .await
    }

    async fn execute_actions(&self, table: &TableRef, actions: &[Action]) -> Result<()> {
        for action in actions {
            info!(table = %table.name, action = %action.kind(), "{}", action.description());
        }
        self.timed(
            "execute_actions",
            &table.name,
            self.inner.execute_actions(table, actions),
        )
        .await
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        self.timed("truncate_table", table, self.inner.truncate_table(table))
            .await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<()> {
        self.timed("insert", table, self.inner.insert(table, row)).await
    }

    async fn bulk_insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.timed("bulk_insert", table, self.inner.bulk_insert(table, rows))
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.timed("execute", sql, self.inner.execute(sql)).await
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
    use crate::adapter::MemoryAdapter;

    #[tokio::test]
    async fn test_timed_passes_through() {
        let memory = Arc::new(MemoryAdapter::new(AdapterOptions::new("memory")));
        let timed = TimedAdapter::new(memory.clone());

        timed
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
            .expect("create");
        timed.drop_table("users").await.expect("drop");

        assert_eq!(timed.adapter_type(), "memory");
        assert!(memory.table_names().await.is_empty());
        assert_eq!(memory.snapshot().await.executed.len(), 2);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    async fn logged_at(level: tracing::Level) -> String {
        use tracing::instrument::WithSubscriber;

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let timed = TimedAdapter::new(Arc::new(MemoryAdapter::new(AdapterOptions::new("memory"))));
        timed
            .truncate_table("missing")
            .with_subscriber(subscriber)
            .await
            .expect_err("no such table");
        captured.text()
    }

    #[tokio::test]
    async fn test_call_timings_are_debug_output() {
        assert!(!logged_at(tracing::Level::INFO).await.contains("Adapter call"));

        let debug = logged_at(tracing::Level::DEBUG).await;
        assert!(debug.contains("Adapter call"));
        assert!(debug.contains("ok=false"));
    }
}
