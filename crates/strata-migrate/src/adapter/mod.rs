//! Database adapters.
//!
//! An [`Adapter`] is the capability surface every backend exposes:
//! existence queries, DDL, batched action execution, data writes,
//! transactions and version log bookkeeping. Decorators ([`TimedAdapter`],
//! [`PrefixAdapter`], [`ProxyAdapter`]) wrap another adapter and share the
//! same trait, so the environment composes them freely.

mod factory;
mod memory;
mod prefix;
mod proxy;
mod sqlite;
mod timed;

pub use factory::{AdapterConstructor, AdapterFactory, WrapperConstructor};
pub use memory::{MemoryAdapter, MemoryState};
pub use prefix::PrefixAdapter;
pub use proxy::ProxyAdapter;
pub use sqlite::SqliteAdapter;
pub use timed::TimedAdapter;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::action::Action;
use crate::error::{MigrateError, Result};
use crate::history::{LogFields, MigrationInfo, VersionLogEntry, VersionOrder, DEFAULT_SCHEMA_TABLE};
use crate::migration::Direction;
use crate::schema::{Column, ColumnType, ForeignKey, Index, Row, TableRef, TableUpdate};

/// Connection and behavior options shared by an adapter and its decorators.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    /// Adapter kind (`sqlite`, `memory`, or a registered name).
    pub adapter: String,
    /// Explicit connection string handed to the driver.
    pub connection: Option<String>,
    /// Database name (a file path for SQLite, `:memory:` for in-memory).
    pub name: Option<String>,
    /// Host.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// User.
    pub user: Option<String>,
    /// Password.
    pub pass: Option<String>,
    /// Extra driver options from the DSN query string.
    pub query: BTreeMap<String, String>,
    /// Prefix prepended to every user table name.
    pub table_prefix: Option<String>,
    /// Suffix appended to every user table name.
    pub table_suffix: Option<String>,
    /// Named wrapper applied between timing and prefixing.
    pub wrapper: Option<String>,
    /// Name of the schema table.
    pub schema_table: String,
    /// Schema table column names.
    pub log_fields: LogFields,
    /// Version log ordering.
    pub version_order: VersionOrder,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            adapter: String::new(),
            connection: None,
            name: None,
            host: None,
            port: None,
            user: None,
            pass: None,
            query: BTreeMap::new(),
            table_prefix: None,
            table_suffix: None,
            wrapper: None,
            schema_table: DEFAULT_SCHEMA_TABLE.to_string(),
            log_fields: LogFields::default(),
            version_order: VersionOrder::default(),
        }
    }
}

impl AdapterOptions {
    /// Creates options for the given adapter kind.
    #[must_use]
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            ..Self::default()
        }
    }

    /// Sets the database name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets an explicit connection string.
    #[must_use]
    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = Some(prefix.into());
        self
    }

    /// Sets the table suffix.
    #[must_use]
    pub fn table_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.table_suffix = Some(suffix.into());
        self
    }

    /// Sets the wrapper name.
    #[must_use]
    pub fn wrapper(mut self, wrapper: impl Into<String>) -> Self {
        self.wrapper = Some(wrapper.into());
        self
    }

    /// Sets the schema table name.
    #[must_use]
    pub fn schema_table(mut self, name: impl Into<String>) -> Self {
        self.schema_table = name.into();
        self
    }

    /// Sets the log field aliases.
    #[must_use]
    pub fn log_fields(mut self, fields: LogFields) -> Self {
        self.log_fields = fields;
        self
    }

    /// Sets the version order.
    #[must_use]
    pub fn version_order(mut self, order: VersionOrder) -> Self {
        self.version_order = order;
        self
    }

    /// Returns true if a non-empty prefix or suffix is configured.
    #[must_use]
    pub fn has_table_affixes(&self) -> bool {
        self.table_prefix.as_deref().is_some_and(|p| !p.is_empty())
            || self.table_suffix.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// The capability surface of a database backend.
///
/// Direct DDL methods default to an `AdapterCapability` error; adapters
/// that implement them report it through [`Adapter::supports_direct_actions`].
/// Every adapter must accept batches through [`Adapter::execute_actions`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns the adapter kind.
    fn adapter_type(&self) -> &str;

    /// Returns the options this adapter was built with.
    fn options(&self) -> &AdapterOptions;

    /// Returns the column types this adapter understands.
    fn column_types(&self) -> Vec<ColumnType>;

    /// Returns true if the column's type can be used with this adapter.
    fn is_valid_column_type(&self, column: &Column) -> bool {
        column.column_type.is_literal() || self.column_types().contains(&column.column_type)
    }

    /// Returns true if the direct DDL methods are implemented.
    fn supports_direct_actions(&self) -> bool {
        false
    }

    /// Returns true if DDL can run inside a transaction.
    fn has_transactions(&self) -> bool;

    /// Begins a transaction.
    async fn begin_transaction(&self) -> Result<()>;

    /// Commits the current transaction.
    async fn commit_transaction(&self) -> Result<()>;

    /// Rolls back the current transaction.
    async fn rollback_transaction(&self) -> Result<()>;

    /// Checks if a table exists.
    async fn has_table(&self, table: &str) -> Result<bool>;

    /// Checks if a column exists.
    async fn has_column(&self, table: &str, column: &str) -> Result<bool>;

    /// Returns the columns of a table.
    async fn get_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Checks if an index over exactly these columns exists.
    async fn has_index(&self, table: &str, columns: &[String]) -> Result<bool>;

    /// Checks if an index with this name exists.
    async fn has_index_by_name(&self, table: &str, name: &str) -> Result<bool>;

    /// Checks if a foreign key over these columns (and optional name) exists.
    async fn has_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<bool>;

    /// Creates a table.
    async fn create_table(
        &self,
        _table: &TableRef,
        _columns: &[Column],
        _indexes: &[Index],
        _foreign_keys: &[ForeignKey],
    ) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "create_table"))
    }

    /// Drops a table.
    async fn drop_table(&self, _table: &str) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "drop_table"))
    }

    /// Renames a table.
    async fn rename_table(&self, _table: &str, _new_name: &str) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "rename_table"))
    }

    /// Adds a column.
    async fn add_column(&self, _table: &str, _column: &Column) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "add_column"))
    }

    /// Renames a column.
    async fn rename_column(&self, _table: &str, _column: &str, _new_name: &str) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "rename_column"))
    }

    /// Replaces a column definition.
    async fn change_column(&self, _table: &str, _column: &str, _definition: &Column) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "change_column"))
    }

    /// Drops a column.
    async fn drop_column(&self, _table: &str, _column: &str) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "drop_column"))
    }

    /// Adds an index.
    async fn add_index(&self, _table: &str, _index: &Index) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "add_index"))
    }

    /// Drops the index over exactly these columns.
    async fn drop_index(&self, _table: &str, _columns: &[String]) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "drop_index"))
    }

    /// Drops an index by name.
    async fn drop_index_by_name(&self, _table: &str, _name: &str) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "drop_index_by_name"))
    }

    /// Adds a foreign key.
    async fn add_foreign_key(&self, _table: &str, _foreign_key: &ForeignKey) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "add_foreign_key"))
    }

    /// Drops a foreign key.
    async fn drop_foreign_key(
        &self,
        _table: &str,
        _columns: &[String],
        _constraint: Option<&str>,
    ) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "drop_foreign_key"))
    }

    /// Applies table-level option changes.
    async fn update_table(&self, _table: &str, _update: &TableUpdate) -> Result<()> {
        Err(MigrateError::unsupported(self.adapter_type(), "update_table"))
    }

    /// Executes an ordered batch of actions for one table.
    ///
    /// The first failure aborts the batch and is reported as
    /// `ActionFailed`.
    async fn execute_actions(&self, table: &TableRef, actions: &[Action]) -> Result<()>;

    /// Deletes every row of a table.
    async fn truncate_table(&self, table: &str) -> Result<()>;

    /// Inserts one row.
    async fn insert(&self, table: &str, row: &Row) -> Result<()>;

    /// Inserts rows sharing the same set of keys.
    async fn bulk_insert(&self, table: &str, rows: &[Row]) -> Result<()>;

    /// Executes raw SQL, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Checks if the schema table exists.
    async fn has_schema_table(&self) -> Result<bool>;

    /// Creates the schema table.
    async fn create_schema_table(&self) -> Result<()>;

    /// Returns the version log in the configured order.
    async fn get_version_log(&self) -> Result<Vec<VersionLogEntry>>;

    /// Returns the applied versions in the configured order.
    async fn get_versions(&self) -> Result<Vec<i64>> {
        Ok(self
            .get_version_log()
            .await?
            .into_iter()
            .map(|e| e.version)
            .collect())
    }

    /// Records (UP) or removes (DOWN) a version log entry.
    async fn migrated(
        &self,
        migration: &MigrationInfo,
        direction: Direction,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<()>;

    /// Flips the breakpoint flag of a logged version.
    async fn toggle_breakpoint(&self, version: i64) -> Result<()>;

    /// Clears every breakpoint, returning how many were set.
    async fn reset_all_breakpoints(&self) -> Result<u64>;
}

/// Executes a batch by dispatching each action to the direct DDL methods.
///
/// Backends that implement the direct methods use this as their
/// `execute_actions`.
pub async fn execute_actions_directly<A>(adapter: &A, actions: &[Action]) -> Result<()>
where
    A: Adapter + ?Sized,
{
    for action in actions {
        let table = action.table();
        let name = table.name.as_str();
        let outcome = match action {
            Action::AddColumn { column, .. } => adapter.add_column(name, column).await,
            Action::RemoveColumn { column, .. } => adapter.drop_column(name, column).await,
            Action::RenameColumn {
                column, new_name, ..
            } => adapter.rename_column(name, column, new_name).await,
            Action::ChangeColumn {
                column, definition, ..
            } => adapter.change_column(name, column, definition).await,
            Action::AddIndex { index, .. } => adapter.add_index(name, index).await,
            Action::DropIndex { index, .. } => match &index.name {
                Some(index_name) => adapter.drop_index_by_name(name, index_name).await,
                None => adapter.drop_index(name, &index.columns).await,
            },
            Action::AddForeignKey { foreign_key, .. } => {
                adapter.add_foreign_key(name, foreign_key).await
            }
            Action::DropForeignKey { foreign_key, .. } => {
                adapter
                    .drop_foreign_key(name, &foreign_key.columns, foreign_key.name.as_deref())
                    .await
            }
            Action::CreateTable {
                columns,
                indexes,
                foreign_keys,
                ..
            } => {
                adapter
                    .create_table(table, columns, indexes, foreign_keys)
                    .await
            }
            Action::DropTable { .. } => adapter.drop_table(name).await,
            Action::RenameTable { new_name, .. } => adapter.rename_table(name, new_name).await,
            Action::UpdateTable { update, .. } => adapter.update_table(name, update).await,
        };
        outcome.map_err(|e| MigrateError::action_failed(action.kind(), name, e))?;
    }
    Ok(())
}

/// Returns true if all rows share the same key set.
#[must_use]
pub fn rows_share_keys(rows: &[Row]) -> bool {
    match rows.first() {
        Some(first) => rows
            .iter()
            .all(|row| row.len() == first.len() && row.keys().eq(first.keys())),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, i64)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_rows_share_keys() {
        assert!(rows_share_keys(&[]));
        assert!(rows_share_keys(&[row(&[("a", 1), ("b", 2)]), row(&[("b", 3), ("a", 4)])]));
        assert!(!rows_share_keys(&[row(&[("a", 1)]), row(&[("a", 1), ("b", 2)])]));
    }

    #[test]
    fn test_affixes_require_non_empty_values() {
        assert!(!AdapterOptions::new("memory").has_table_affixes());
        assert!(!AdapterOptions::new("memory").table_prefix("").has_table_affixes());
        assert!(AdapterOptions::new("memory").table_suffix("_v1").has_table_affixes());
    }
}
