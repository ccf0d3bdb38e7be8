//! Table handle used by migration and seed bodies.
//!
//! A [`Table`] collects schema actions and rows without touching the
//! database. Nothing happens until [`Table::save`], [`Table::create`] or
//! [`Table::update`] runs the collected intent through a [`Plan`].
//!
//! ```ignore
//! let mut users = ctx.table("users");
//! users
//!     .add_column("email", ColumnType::String, ColumnOptions::new().limit(255))?
//!     .add_index(["email"], IndexOptions::new().unique());
//! users.create().await?;
//! ```

use crate::action::Action;
use crate::adapter::{rows_share_keys, Adapter};
use crate::error::{MigrateError, Result};
use crate::plan::{Intent, Plan};
use crate::schema::{
    Column, ColumnOptions, ColumnType, DefaultValue, ForeignKey, ForeignKeyOptions, Index,
    IndexOptions, Row, TableOptions, TableRef, TableUpdate,
};

/// A table bound to an adapter, accumulating pending changes.
pub struct Table<'a> {
    table: TableRef,
    adapter: &'a dyn Adapter,
    intent: Intent,
    data: Vec<Row>,
}

impl<'a> Table<'a> {
    /// Creates a handle; nothing is executed.
    #[must_use]
    pub fn new(table: TableRef, adapter: &'a dyn Adapter) -> Self {
        Self {
            table,
            adapter,
            intent: Intent::new(),
            data: Vec::new(),
        }
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// Returns the table options.
    #[must_use]
    pub fn options(&self) -> &TableOptions {
        &self.table.options
    }

    /// Returns the pending actions.
    #[must_use]
    pub fn pending_actions(&self) -> &[Action] {
        self.intent.actions()
    }

    /// Returns the buffered rows.
    #[must_use]
    pub fn pending_rows(&self) -> &[Row] {
        &self.data
    }

    /// Checks if the table exists.
    pub async fn exists(&self) -> Result<bool> {
        self.adapter.has_table(&self.table.name).await
    }

    /// Checks if a column exists.
    pub async fn has_column(&self, column: &str) -> Result<bool> {
        self.adapter.has_column(&self.table.name, column).await
    }

    /// Returns the table's columns.
    pub async fn get_columns(&self) -> Result<Vec<Column>> {
        self.adapter.get_columns(&self.table.name).await
    }

    /// Checks if an index over these columns exists.
    pub async fn has_index<I, S>(&self, columns: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.adapter.has_index(&self.table.name, &columns).await
    }

    /// Checks if an index with this name exists.
    pub async fn has_index_by_name(&self, name: &str) -> Result<bool> {
        self.adapter.has_index_by_name(&self.table.name, name).await
    }

    /// Checks if a foreign key over these columns exists.
    pub async fn has_foreign_key<I, S>(&self, columns: I, constraint: Option<&str>) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.adapter
            .has_foreign_key(&self.table.name, &columns, constraint)
            .await
    }

    fn push(&mut self, action: Action) -> &mut Self {
        self.intent.push(action);
        self
    }

    fn validated(&self, column: Column) -> Result<Column> {
        if self.adapter.is_valid_column_type(&column) {
            Ok(column)
        } else {
            Err(MigrateError::InvalidColumnType {
                column: column.name,
                column_type: column.column_type.to_string(),
            })
        }
    }

    /// Adds a column.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnType` if the adapter does not support the type.
    pub fn add_column(
        &mut self,
        name: &str,
        column_type: ColumnType,
        options: ColumnOptions,
    ) -> Result<&mut Self> {
        self.add_column_definition(Column::new(name, column_type).with_options(options))
    }

    /// Adds a fully built column.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnType` if the adapter does not support the type.
    pub fn add_column_definition(&mut self, column: Column) -> Result<&mut Self> {
        let column = self.validated(column)?;
        let table = self.table.clone();
        Ok(self.push(Action::AddColumn { table, column }))
    }

    /// Replaces a column definition, keeping its name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnType` if the adapter does not support the type.
    pub fn change_column(
        &mut self,
        name: &str,
        column_type: ColumnType,
        options: ColumnOptions,
    ) -> Result<&mut Self> {
        let definition = self.validated(Column::new(name, column_type).with_options(options))?;
        let table = self.table.clone();
        Ok(self.push(Action::ChangeColumn {
            table,
            column: name.to_string(),
            definition,
        }))
    }

    /// Renames a column.
    pub fn rename_column(&mut self, column: &str, new_name: &str) -> &mut Self {
        let table = self.table.clone();
        self.push(Action::RenameColumn {
            table,
            column: column.to_string(),
            new_name: new_name.to_string(),
        })
    }

    /// Removes a column.
    pub fn remove_column(&mut self, column: &str) -> &mut Self {
        let table = self.table.clone();
        self.push(Action::RemoveColumn {
            table,
            column: column.to_string(),
        })
    }

    /// Adds an index.
    pub fn add_index<I, S>(&mut self, columns: I, options: IndexOptions) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = self.table.clone();
        self.push(Action::AddIndex {
            table,
            index: Index::new(columns).with_options(options),
        })
    }

    /// Removes the index over these columns.
    pub fn remove_index<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = self.table.clone();
        self.push(Action::DropIndex {
            table,
            index: Index::new(columns),
        })
    }

    /// Removes an index by name.
    pub fn remove_index_by_name(&mut self, name: &str) -> &mut Self {
        let table = self.table.clone();
        self.push(Action::DropIndex {
            table,
            index: Index::named(name),
        })
    }

    /// Adds a foreign key.
    pub fn add_foreign_key<I, S, J, T>(
        &mut self,
        columns: I,
        referenced_table: &str,
        referenced_columns: J,
        options: ForeignKeyOptions,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let table = self.table.clone();
        self.push(Action::AddForeignKey {
            table,
            foreign_key: ForeignKey::new(columns, referenced_table, referenced_columns)
                .with_options(options),
        })
    }

    /// Adds a named foreign key.
    pub fn add_foreign_key_with_name<I, S, J, T>(
        &mut self,
        name: &str,
        columns: I,
        referenced_table: &str,
        referenced_columns: J,
        options: ForeignKeyOptions,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.add_foreign_key(
            columns,
            referenced_table,
            referenced_columns,
            options.constraint(name),
        )
    }

    /// Drops the foreign key over these columns.
    pub fn drop_foreign_key<I, S>(&mut self, columns: I, constraint: Option<&str>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = self.table.clone();
        self.push(Action::DropForeignKey {
            table,
            foreign_key: ForeignKey::reference(columns, constraint.map(str::to_string)),
        })
    }

    /// Renames the table.
    pub fn rename(&mut self, new_name: &str) -> &mut Self {
        let table = self.table.clone();
        self.push(Action::RenameTable {
            table,
            new_name: new_name.to_string(),
        })
    }

    /// Drops the table.
    pub fn drop_table(&mut self) -> &mut Self {
        let table = self.table.clone();
        self.push(Action::DropTable { table })
    }

    /// Sets the table comment.
    pub fn comment(&mut self, comment: &str) -> &mut Self {
        let table = self.table.clone();
        self.push(Action::UpdateTable {
            table,
            update: TableUpdate {
                comment: Some(comment.to_string()),
            },
        })
    }

    /// Adds `created_at`/`updated_at` style timestamp columns.
    ///
    /// The creation column defaults to `CURRENT_TIMESTAMP`; the update
    /// column is nullable and refreshed on update where supported.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnType` if the adapter lacks timestamps.
    pub fn add_timestamps(&mut self, created: Option<&str>, updated: Option<&str>) -> Result<&mut Self> {
        self.timestamps(created, updated, false)
    }

    /// Like [`Table::add_timestamps`], with time zone aware columns.
    ///
    /// # Errors
    ///
    /// Returns `InvalidColumnType` if the adapter lacks timestamps.
    pub fn add_timestamps_with_timezone(
        &mut self,
        created: Option<&str>,
        updated: Option<&str>,
    ) -> Result<&mut Self> {
        self.timestamps(created, updated, true)
    }

    fn timestamps(
        &mut self,
        created: Option<&str>,
        updated: Option<&str>,
        timezone: bool,
    ) -> Result<&mut Self> {
        self.add_column(
            created.unwrap_or("created_at"),
            ColumnType::Timestamp,
            ColumnOptions::new()
                .null(false)
                .default(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()))
                .timezone(timezone),
        )?;
        self.add_column(
            updated.unwrap_or("updated_at"),
            ColumnType::Timestamp,
            ColumnOptions::new()
                .null(true)
                .default(DefaultValue::Null)
                .update("CURRENT_TIMESTAMP")
                .timezone(timezone),
        )
    }

    /// Buffers one row for insertion on the next save.
    pub fn insert(&mut self, row: Row) -> &mut Self {
        self.data.push(row);
        self
    }

    /// Buffers several rows for insertion on the next save.
    pub fn insert_rows<I>(&mut self, rows: I) -> &mut Self
    where
        I: IntoIterator<Item = Row>,
    {
        self.data.extend(rows);
        self
    }

    /// Deletes every row of the table immediately.
    pub async fn truncate(&self) -> Result<()> {
        self.adapter.truncate_table(&self.table.name).await
    }

    /// Discards pending actions and rows.
    pub fn reset(&mut self) {
        self.intent = Intent::new();
        self.data.clear();
    }

    /// Creates the table if it does not exist, otherwise updates it.
    pub async fn save(&mut self) -> Result<()> {
        if self.exists().await? {
            self.update().await
        } else {
            self.create().await
        }
    }

    /// Creates the table from the pending actions, then flushes rows.
    pub async fn create(&mut self) -> Result<()> {
        self.execute(false).await
    }

    /// Applies the pending actions to an existing table, then flushes rows.
    pub async fn update(&mut self) -> Result<()> {
        self.execute(true).await
    }

    async fn execute(&mut self, exists: bool) -> Result<()> {
        let intent = std::mem::take(&mut self.intent);
        let rows = std::mem::take(&mut self.data);

        if !intent.is_empty() || !exists {
            Plan::new(&self.table, intent, exists)?
                .execute(self.adapter)
                .await?;
        }
        self.flush_rows(rows).await
    }

    async fn flush_rows(&self, rows: Vec<Row>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if rows_share_keys(&rows) {
            self.adapter.bulk_insert(&self.table.name, &rows).await
        } else {
            for row in &rows {
                self.adapter.insert(&self.table.name, row).await?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterOptions, MemoryAdapter};
    use crate::schema::ForeignKeyAction;
    use serde_json::json;

    fn memory() -> MemoryAdapter {
        MemoryAdapter::new(AdapterOptions::new("memory"))
    }

    fn row(value: serde_json::Value) -> Row {
        serde_json::from_value(value).expect("object")
    }

    #[tokio::test]
    async fn test_builders_do_not_touch_the_adapter() {
        let adapter = memory();
        let mut users = Table::new(TableRef::new("users"), &adapter);
        users
            .add_column("email", ColumnType::String, ColumnOptions::new())
            .expect("valid type")
            .add_index(["email"], IndexOptions::new())
            .comment("people");

        assert_eq!(users.pending_actions().len(), 3);
        assert!(adapter.table_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_column_type() {
        let adapter = memory();
        let mut users = Table::new(TableRef::new("users"), &adapter);
        assert!(users
            .add_column("shape", ColumnType::Literal("GEOMETRY".into()), ColumnOptions::new())
            .is_ok());

        let sqlite = crate::adapter::SqliteAdapter::connect(AdapterOptions::new("sqlite"))
            .await
            .expect("in-memory sqlite");
        let mut tags = Table::new(TableRef::new("tags"), &sqlite);
        let err = tags
            .add_column("kind", ColumnType::Set, ColumnOptions::new())
            .err()
            .expect("set is not supported by sqlite");
        assert!(matches!(err, MigrateError::InvalidColumnType { ref column, .. } if column == "kind"));
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let adapter = memory();
        let mut users = Table::new(TableRef::new("users"), &adapter);
        users
            .add_column("email", ColumnType::String, ColumnOptions::new())
            .expect("valid type");
        users.save().await.expect("create");

        users
            .add_column("age", ColumnType::Integer, ColumnOptions::new())
            .expect("valid type");
        users.save().await.expect("update");

        assert!(users.pending_actions().is_empty());
        let names: Vec<_> = users
            .get_columns()
            .await
            .expect("columns")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id", "email", "age"]);
    }

    #[tokio::test]
    async fn test_rows_flush_after_actions() {
        let adapter = memory();
        let mut tags = Table::new(TableRef::new("tags"), &adapter);
        tags.add_column("name", ColumnType::String, ColumnOptions::new())
            .expect("valid type")
            .insert_rows([row(json!({"name": "a"})), row(json!({"name": "b"}))]);
        tags.save().await.expect("save");

        assert_eq!(adapter.rows("tags").await.expect("rows").len(), 2);
        assert!(tags.pending_rows().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_rows_insert_one_by_one() {
        let adapter = memory();
        let mut tags = Table::new(TableRef::new("tags"), &adapter);
        tags.create().await.expect("create");

        tags.insert(row(json!({"name": "a"})))
            .insert(row(json!({"name": "b", "weight": 2})));
        tags.save().await.expect("save");

        let rows = adapter.rows("tags").await.expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["weight"], json!(2));
    }

    #[tokio::test]
    async fn test_failed_save_clears_pending_state() {
        let adapter = memory();
        let mut posts = Table::new(TableRef::new("posts"), &adapter);
        posts
            .add_column("user_id", ColumnType::Integer, ColumnOptions::new())
            .expect("valid type")
            .add_foreign_key(
                ["user_id"],
                "users",
                ["id"],
                ForeignKeyOptions::new().on_delete(ForeignKeyAction::Cascade),
            )
            .insert(row(json!({"user_id": 1})));

        assert!(posts.save().await.is_err());
        assert!(posts.pending_actions().is_empty());
        assert!(posts.pending_rows().is_empty());
        assert!(adapter.rows("posts").await.is_err());
    }

    #[tokio::test]
    async fn test_add_timestamps() {
        let adapter = memory();
        let mut users = Table::new(TableRef::new("users"), &adapter);
        users.add_timestamps(None, Some("modified_at")).expect("valid type");
        users.create().await.expect("create");

        let columns = users.get_columns().await.expect("columns");
        assert_eq!(columns[1].name, "created_at");
        assert_eq!(
            columns[1].default,
            DefaultValue::Expression("CURRENT_TIMESTAMP".into())
        );
        assert_eq!(columns[2].name, "modified_at");
        assert!(columns[2].nullable);
    }
}
