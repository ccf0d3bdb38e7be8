//! Table prefix/suffix decorator.
//!
//! Rewrites every user table name as `<prefix><name><suffix>`, including
//! foreign key targets and rename destinations. The schema table and raw
//! SQL are left alone.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{Adapter, AdapterOptions};
use crate::action::Action;
use crate::error::{MigrateError, Result};
use crate::history::{MigrationInfo, VersionLogEntry};
use crate::migration::Direction;
use crate::schema::{Column, ColumnType, ForeignKey, Index, Row, TableRef, TableUpdate};

/// Adapter decorator that adds a prefix and/or suffix to table names.
pub struct PrefixAdapter {
    inner: Arc<dyn Adapter>,
    prefix: String,
    suffix: String,
}

impl PrefixAdapter {
    /// Wraps an adapter using the affixes from its options.
    #[must_use]
    pub fn new(inner: Arc<dyn Adapter>) -> Self {
        let options = inner.options();
        let prefix = options.table_prefix.clone().unwrap_or_default();
        let suffix = options.table_suffix.clone().unwrap_or_default();
        Self {
            inner,
            prefix,
            suffix,
        }
    }

    /// Returns the adapted name of a table.
    #[must_use]
    pub fn adapted_table_name(&self, table: &str) -> String {
        format!("{}{table}{}", self.prefix, self.suffix)
    }

    fn adapted_ref(&self, table: &TableRef) -> TableRef {
        table.renamed(self.adapted_table_name(&table.name))
    }

    fn adapted_foreign_key(&self, foreign_key: &ForeignKey) -> ForeignKey {
        ForeignKey {
            referenced_table: self.adapted_table_name(&foreign_key.referenced_table),
            ..foreign_key.clone()
        }
    }

    fn require_direct(&self, operation: &str) -> Result<()> {
        if self.inner.supports_direct_actions() {
            Ok(())
        } else {
            Err(MigrateError::unsupported(self.inner.adapter_type(), operation))
        }
    }
}

#[async_trait]
impl Adapter for PrefixAdapter {
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
        self.inner.has_table(&self.adapted_table_name(table)).await
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.inner
            .has_column(&self.adapted_table_name(table), column)
            .await
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.inner.get_columns(&self.adapted_table_name(table)).await
    }

    async fn has_index(&self, table: &str, columns: &[String]) -> Result<bool> {
        self.inner
            .has_index(&self.adapted_table_name(table), columns)
            .await
    }

    async fn has_index_by_name(&self, table: &str, name: &str) -> Result<bool> {
        self.inner
            .has_index_by_name(&self.adapted_table_name(table), name)
            .await
    }

    async fn has_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<bool> {
        self.inner
            .has_foreign_key(&self.adapted_table_name(table), columns, constraint)
            .await
    }

    async fn create_table(
        &self,
        table: &TableRef,
        columns: &[Column],
        indexes: &[Index],
        foreign_keys: &[ForeignKey],
    ) -> Result<()> {
        self.require_direct("create_table")?;
        let foreign_keys: Vec<ForeignKey> = foreign_keys
            .iter()
            .map(|fk| self.adapted_foreign_key(fk))
            .collect();
        self.inner
            .create_table(&self.adapted_ref(table), columns, indexes, &foreign_keys)
            .await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.require_direct("drop_table")?;
        self.inner.drop_table(&self.adapted_table_name(table)).await
    }

    async fn rename_table(&self, table: &str, new_name: &str) -> Result<()> {
        self.require_direct("rename_table")?;
        self.inner
            .rename_table(
                &self.adapted_table_name(table),
                &self.adapted_table_name(new_name),
            )
            .await
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        self.require_direct("add_column")?;
        self.inner
            .add_column(&self.adapted_table_name(table), column)
            .await
    }

    async fn rename_column(&self, table: &str, column: &str, new_name: &str) -> Result<()> {
        self.require_direct("rename_column")?;
        self.inner
            .rename_column(&self.adapted_table_name(table), column, new_name)
            .await
    }

    async fn change_column(&self, table: &str, column: &str, definition: &Column) -> Result<()> {
        self.require_direct("change_column")?;
        self.inner
            .change_column(&self.adapted_table_name(table), column, definition)
            .await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.require_direct("drop_column")?;
        self.inner
            .drop_column(&self.adapted_table_name(table), column)
            .await
    }

    async fn add_index(&self, table: &str, index: &Index) -> Result<()> {
        self.require_direct("add_index")?;
        self.inner
            .add_index(&self.adapted_table_name(table), index)
            .await
    }

    async fn drop_index(&self, table: &str, columns: &[String]) -> Result<()> {
        self.require_direct("drop_index")?;
        self.inner
            .drop_index(&self.adapted_table_name(table), columns)
            .await
    }

    async fn drop_index_by_name(&self, table: &str, name: &str) -> Result<()> {
        self.require_direct("drop_index_by_name")?;
        self.inner
            .drop_index_by_name(&self.adapted_table_name(table), name)
            .await
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<()> {
        self.require_direct("add_foreign_key")?;
        self.inner
            .add_foreign_key(
                &self.adapted_table_name(table),
                &self.adapted_foreign_key(foreign_key),
            )
            .await
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<()> {
        self.require_direct("drop_foreign_key")?;
        self.inner
            .drop_foreign_key(&self.adapted_table_name(table), columns, constraint)
            .await
    }

    async fn update_table(&self, table: &str, update: &TableUpdate) -> Result<()> {
        self.require_direct("update_table")?;
        self.inner
            .update_table(&self.adapted_table_name(table), update)
            .await
    }

    async fn execute_actions(&self, table: &TableRef, actions: &[Action]) -> Result<()> {
        let rename = |name: &str| self.adapted_table_name(name);
        let actions: Vec<Action> = actions.iter().map(|a| a.map_tables(&rename)).collect();
        self.inner
            .execute_actions(&self.adapted_ref(table), &actions)
            .await
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        self.inner
            .truncate_table(&self.adapted_table_name(table))
            .await
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<()> {
        self.inner.insert(&self.adapted_table_name(table), row).await
    }

    async fn bulk_insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        self.inner
            .bulk_insert(&self.adapted_table_name(table), rows)
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.inner.execute(sql).await
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
    use crate::schema::ColumnType;

    fn memory(direct: bool) -> Arc<MemoryAdapter> {
        Arc::new(
            MemoryAdapter::new(
                AdapterOptions::new("memory")
                    .table_prefix("app_")
                    .table_suffix("_v1"),
            )
            .with_direct_actions(direct),
        )
    }

    #[tokio::test]
    async fn test_batch_path_rewrites_every_table_name() {
        let inner = memory(true);
        let prefixed = PrefixAdapter::new(inner.clone());

        prefixed
            .execute_actions(
                &TableRef::new("users"),
                &[Action::CreateTable {
                    table: TableRef::new("users"),
                    columns: vec![Column::new("email", ColumnType::String)],
                    indexes: vec![],
                    foreign_keys: vec![],
                }],
            )
            .await
            .expect("create users");
        prefixed
            .execute_actions(
                &TableRef::new("posts"),
                &[Action::CreateTable {
                    table: TableRef::new("posts"),
                    columns: vec![Column::new("user_id", ColumnType::Integer)],
                    indexes: vec![],
                    foreign_keys: vec![ForeignKey::new(["user_id"], "users", ["id"])],
                }],
            )
            .await
            .expect("create posts");

        assert_eq!(
            inner.table_names().await,
            vec!["app_posts_v1".to_string(), "app_users_v1".to_string()]
        );
        let state = inner.snapshot().await;
        assert_eq!(
            state.tables["app_posts_v1"].foreign_keys[0].referenced_table,
            "app_users_v1"
        );
        assert!(prefixed.has_table("users").await.expect("query"));
    }

    #[tokio::test]
    async fn test_rename_target_is_prefixed() {
        let inner = memory(true);
        let prefixed = PrefixAdapter::new(inner.clone());
        prefixed
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

        prefixed.rename_table("users", "people").await.expect("rename");
        assert_eq!(inner.table_names().await, vec!["app_people_v1".to_string()]);
    }

    #[tokio::test]
    async fn test_direct_calls_fail_without_inner_support() {
        let prefixed = PrefixAdapter::new(memory(false));

        let err = prefixed
            .add_column("users", &Column::new("email", ColumnType::String))
            .await
            .expect_err("inner adapter is batch-only");
        assert!(matches!(
            err,
            MigrateError::AdapterCapability { ref adapter, ref operation }
                if adapter == "memory" && operation == "add_column"
        ));
    }
}
