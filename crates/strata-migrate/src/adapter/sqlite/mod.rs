//! SQLite adapter over a single sqlx connection.

mod dialect;

pub use dialect::{ColumnInfo, SqliteDialect};

use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Row as _};
use tokio::sync::Mutex;
use tracing::debug;

use super::{execute_actions_directly, Adapter, AdapterOptions};
use crate::action::Action;
use crate::error::{MigrateError, Result};
use crate::history::{self, MigrationInfo, VersionLogEntry, MIGRATION_NAME_LIMIT, TIMESTAMP_FORMAT};
use crate::migration::Direction;
use crate::schema::{
    Column, ColumnType, ForeignKey, ForeignKeyAction, Index, Row, TableRef, TableUpdate,
};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bound parameter limit per statement (`SQLITE_MAX_VARIABLE_NUMBER`).
const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Current shape of a table, read from the catalog before a rebuild.
#[derive(Debug, Clone)]
struct TableShape {
    columns: Vec<(String, String)>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    unique: Vec<Vec<String>>,
    copy: Vec<(String, String)>,
    indexes: Vec<(String, String)>,
}

impl TableShape {
    fn column_position(&self, table: &str, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|(name, _)| name == column)
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "Column '{column}' does not exist in table '{table}'"
                ))
            })
    }
}

/// Adapter for SQLite databases.
pub struct SqliteAdapter {
    options: AdapterOptions,
    dialect: SqliteDialect,
    conn: Mutex<SqliteConnection>,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Returns the sqlx connection string for the given options.
///
/// An explicit `connection` wins; otherwise `name` is a file path, and a
/// missing name or `:memory:` selects an in-memory database.
#[must_use]
pub fn connection_url(options: &AdapterOptions) -> String {
    if let Some(connection) = &options.connection {
        return connection.clone();
    }
    match options.name.as_deref() {
        None | Some(":memory:") => "sqlite::memory:".to_string(),
        Some(path) => format!("sqlite://{path}"),
    }
}

impl SqliteAdapter {
    /// Opens a connection, creating the database file if needed.
    pub async fn connect(options: AdapterOptions) -> Result<Self> {
        let url = connection_url(&options);
        let conn = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(false)
            .connect()
            .await?;
        debug!(url = %url, "Connected to SQLite");

        Ok(Self {
            options,
            dialect: SqliteDialect::new(),
            conn: Mutex::new(conn),
        })
    }

    async fn run(&self, sql: &str) -> Result<u64> {
        debug!(sql = %sql, "Executing statement");
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn run_all(&self, statements: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        for sql in statements {
            debug!(sql = %sql, "Executing statement");
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn table_info(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    declared_type: row.try_get("type")?,
                    not_null: row.try_get::<i64, _>("notnull")? != 0,
                    default: row.try_get("dflt_value")?,
                    pk: row.try_get("pk")?,
                })
            })
            .collect()
    }

    async fn table_sql(&self, table: &str) -> Result<Option<String>> {
        let mut conn = self.conn.lock().await;
        let sql: Option<(Option<String>,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(sql.and_then(|(s,)| s))
    }

    async fn index_columns(&self, table: &str) -> Result<Vec<(String, Vec<String>)>> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT il.name, ii.name FROM pragma_index_list(?) AS il \
             JOIN pragma_index_info(il.name) AS ii ORDER BY il.name, ii.seqno",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;

        let mut indexes: Vec<(String, Vec<String>)> = Vec::new();
        for (index, column) in rows {
            match indexes.last_mut() {
                Some((name, columns)) if *name == index => columns.push(column),
                _ => indexes.push((index, vec![column])),
            }
        }
        Ok(indexes)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
             FROM pragma_foreign_key_list(?) ORDER BY id, seq",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;

        let mut keys: Vec<(i64, ForeignKey)> = Vec::new();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let from: String = row.try_get("from")?;
            let to: Option<String> = row.try_get("to")?;
            match keys.last_mut() {
                Some((last, fk)) if *last == id => {
                    fk.columns.push(from);
                    fk.referenced_columns.extend(to);
                }
                _ => {
                    let referenced: String = row.try_get("table")?;
                    let on_update: String = row.try_get("on_update")?;
                    let on_delete: String = row.try_get("on_delete")?;
                    let mut fk = ForeignKey::new([from], referenced, to);
                    fk.on_update = ForeignKeyAction::from_sql(&on_update);
                    fk.on_delete = ForeignKeyAction::from_sql(&on_delete);
                    keys.push((id, fk));
                }
            }
        }
        // PRAGMA reports constraints in reverse declaration order.
        Ok(keys.into_iter().rev().map(|(_, fk)| fk).collect())
    }

    async fn load_shape(&self, table: &str) -> Result<TableShape> {
        let info = self.table_info(table).await?;
        if info.is_empty() {
            return Err(MigrateError::InvalidState(format!(
                "Table '{table}' does not exist"
            )));
        }
        let table_sql = self.table_sql(table).await?.unwrap_or_default();
        let pk_count = info.iter().filter(|c| c.pk > 0).count();
        let autoincrement = pk_count == 1 && table_sql.to_ascii_uppercase().contains("AUTOINCREMENT");

        let mut pk: Vec<&ColumnInfo> = info.iter().filter(|c| c.pk > 0).collect();
        pk.sort_by_key(|c| c.pk);
        let primary_key = if autoincrement {
            Vec::new()
        } else {
            pk.iter().map(|c| c.name.clone()).collect()
        };

        let columns = info
            .iter()
            .map(|c| {
                let def = self
                    .dialect
                    .column_info_definition(c, autoincrement && c.pk > 0);
                (c.name.clone(), def)
            })
            .collect();
        let copy = info.iter().map(|c| (c.name.clone(), c.name.clone())).collect();

        let mut conn = self.conn.lock().await;
        let indexes: Vec<(String, String)> = sqlx::query_as(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'index' AND tbl_name = ? AND sql IS NOT NULL",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
        // Inline UNIQUE constraints live in automatic indexes with no SQL.
        let constraint_names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_index_list(?) WHERE origin = 'u'")
                .bind(table)
                .fetch_all(&mut *conn)
                .await?;
        drop(conn);

        let unique = self
            .index_columns(table)
            .await?
            .into_iter()
            .filter(|(name, _)| constraint_names.iter().any(|(n,)| n == name))
            .map(|(_, cols)| cols)
            .collect();

        Ok(TableShape {
            columns,
            primary_key,
            foreign_keys: self.foreign_keys(table).await?,
            unique,
            copy,
            indexes,
        })
    }

    async fn rebuild(&self, table: &str, shape: TableShape) -> Result<()> {
        let mut definitions: Vec<String> = shape.columns.into_iter().map(|(_, d)| d).collect();
        if !shape.primary_key.is_empty() {
            let quoted: Vec<String> = shape
                .primary_key
                .iter()
                .map(|c| self.dialect.quote_identifier(c))
                .collect();
            definitions.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }
        definitions.extend(
            shape
                .unique
                .iter()
                .map(|cols| format!("UNIQUE ({})", self.dialect.quote_list(cols))),
        );
        definitions.extend(
            shape
                .foreign_keys
                .iter()
                .map(|fk| self.dialect.foreign_key_clause(fk)),
        );

        let index_sql: Vec<String> = shape.indexes.into_iter().map(|(_, sql)| sql).collect();
        let statements = self
            .dialect
            .recreate_table_sql(table, &definitions, &shape.copy, &index_sql);
        self.run_all(&statements).await
    }

    async fn find_index_by_columns(&self, table: &str, columns: &[String]) -> Result<Option<String>> {
        Ok(self
            .index_columns(table)
            .await?
            .into_iter()
            .find(|(_, cols)| cols == columns)
            .map(|(name, _)| name))
    }

    fn log_table(&self) -> String {
        self.dialect.quote_identifier(&self.options.schema_table)
    }

    fn log_column(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<NaiveDateTime> {
    raw.and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok())
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn adapter_type(&self) -> &str {
        "sqlite"
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
        ]
    }

    fn supports_direct_actions(&self) -> bool {
        true
    }

    fn has_transactions(&self) -> bool {
        true
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.run("BEGIN").await.map(|_| ())
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.run("COMMIT").await.map(|_| ())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        self.run("ROLLBACK").await.map(|_| ())
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.table_sql(table).await?.is_some())
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .table_info(table)
            .await?
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(column)))
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        let info = self.table_info(table).await?;
        Ok(info
            .into_iter()
            .map(|c| {
                let (column_type, limit) = self.dialect.column_type_from_sql(&c.declared_type);
                let mut column = Column::new(c.name, column_type);
                column.nullable = !c.not_null;
                column.limit = limit;
                column.default = dialect::default_from_catalog(c.default);
                if c.pk > 0 && column.column_type == ColumnType::Integer {
                    column.identity = true;
                    column.nullable = false;
                }
                column
            })
            .collect())
    }

    async fn has_index(&self, table: &str, columns: &[String]) -> Result<bool> {
        Ok(self.find_index_by_columns(table, columns).await?.is_some())
    }

    async fn has_index_by_name(&self, table: &str, name: &str) -> Result<bool> {
        Ok(self
            .index_columns(table)
            .await?
            .iter()
            .any(|(index, _)| index == name))
    }

    async fn has_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        constraint: Option<&str>,
    ) -> Result<bool> {
        if let Some(name) = constraint {
            let sql = self.table_sql(table).await?.unwrap_or_default();
            let needle = format!("CONSTRAINT {}", self.dialect.quote_identifier(name));
            if !sql.contains(&needle) {
                return Ok(false);
            }
            if columns.is_empty() {
                return Ok(true);
            }
        }
        Ok(self
            .foreign_keys(table)
            .await?
            .iter()
            .any(|fk| fk.columns == columns))
    }

    async fn create_table(
        &self,
        table: &TableRef,
        columns: &[Column],
        indexes: &[Index],
        foreign_keys: &[ForeignKey],
    ) -> Result<()> {
        let mut statements = vec![self.dialect.create_table_sql(table, columns, foreign_keys)];
        statements.extend(
            indexes
                .iter()
                .map(|i| self.dialect.create_index_sql(&table.name, i)),
        );
        self.run_all(&statements).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.run(&self.dialect.drop_table_sql(table)).await.map(|_| ())
    }

    async fn rename_table(&self, table: &str, new_name: &str) -> Result<()> {
        self.run(&self.dialect.rename_table_sql(table, new_name))
            .await
            .map(|_| ())
    }

    async fn add_column(&self, table: &str, column: &Column) -> Result<()> {
        self.run(&self.dialect.add_column_sql(table, column))
            .await
            .map(|_| ())
    }

    async fn rename_column(&self, table: &str, column: &str, new_name: &str) -> Result<()> {
        self.run(&self.dialect.rename_column_sql(table, column, new_name))
            .await
            .map(|_| ())
    }

    async fn change_column(&self, table: &str, column: &str, definition: &Column) -> Result<()> {
        let mut shape = self.load_shape(table).await?;
        let position = shape.column_position(table, column)?;

        shape.columns[position] = (
            definition.name.clone(),
            self.dialect.column_definition(definition),
        );
        shape.copy[position].0 = definition.name.clone();
        for name in shape.primary_key.iter_mut().chain(shape.unique.iter_mut().flatten()) {
            if name == column {
                name.clone_from(&definition.name);
            }
        }
        self.rebuild(table, shape).await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        let mut shape = self.load_shape(table).await?;
        let position = shape.column_position(table, column)?;
        let stale: Vec<String> = self
            .index_columns(table)
            .await?
            .into_iter()
            .filter(|(_, cols)| cols.iter().any(|c| c == column))
            .map(|(name, _)| name)
            .collect();

        shape.columns.remove(position);
        shape.copy.retain(|(target, _)| target != column);
        shape.primary_key.retain(|pk| pk != column);
        shape.unique.retain(|cols| !cols.iter().any(|c| c == column));
        shape
            .foreign_keys
            .retain(|fk| !fk.columns.iter().any(|c| c == column));
        shape.indexes.retain(|(name, _)| !stale.contains(name));
        self.rebuild(table, shape).await
    }

    async fn add_index(&self, table: &str, index: &Index) -> Result<()> {
        self.run(&self.dialect.create_index_sql(table, index))
            .await
            .map(|_| ())
    }

    async fn drop_index(&self, table: &str, columns: &[String]) -> Result<()> {
        let name = self
            .find_index_by_columns(table, columns)
            .await?
            .ok_or_else(|| {
                MigrateError::InvalidState(format!(
                    "No index on columns ({}) of table '{table}'",
                    columns.join(", ")
                ))
            })?;
        self.drop_index_by_name(table, &name).await
    }

    async fn drop_index_by_name(&self, _table: &str, name: &str) -> Result<()> {
        self.run(&self.dialect.drop_index_sql(name)).await.map(|_| ())
    }

    async fn add_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Result<()> {
        let mut shape = self.load_shape(table).await?;
        shape.foreign_keys.push(foreign_key.clone());
        self.rebuild(table, shape).await
    }

    async fn drop_foreign_key(
        &self,
        table: &str,
        columns: &[String],
        _constraint: Option<&str>,
    ) -> Result<()> {
        if columns.is_empty() {
            return Err(MigrateError::unsupported(
                self.adapter_type(),
                "dropping foreign keys by constraint name only",
            ));
        }
        let mut shape = self.load_shape(table).await?;
        let before = shape.foreign_keys.len();
        shape.foreign_keys.retain(|fk| fk.columns != columns);
        if shape.foreign_keys.len() == before {
            return Err(MigrateError::InvalidState(format!(
                "No foreign key on columns ({}) of table '{table}'",
                columns.join(", ")
            )));
        }
        self.rebuild(table, shape).await
    }

    async fn update_table(&self, table: &str, update: &TableUpdate) -> Result<()> {
        debug!(table = %table, comment = ?update.comment, "SQLite has no table comments, skipping");
        Ok(())
    }

    async fn execute_actions(&self, _table: &TableRef, actions: &[Action]) -> Result<()> {
        execute_actions_directly(self, actions).await
    }

    async fn truncate_table(&self, table: &str) -> Result<()> {
        let sql = format!("DELETE FROM {}", self.dialect.quote_identifier(table));
        self.run(&sql).await.map(|_| ())
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<()> {
        self.bulk_insert(table, std::slice::from_ref(row)).await
    }

    async fn bulk_insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let columns: Vec<String> = first.keys().cloned().collect();
        let chunk_size = (MAX_BOUND_PARAMETERS / columns.len().max(1)).max(1);

        let mut conn = self.conn.lock().await;
        for chunk in rows.chunks(chunk_size) {
            let sql = self.dialect.insert_sql(table, &columns, chunk.len());
            debug!(sql = %sql, rows = chunk.len(), "Inserting rows");

            let mut query = sqlx::query(&sql);
            for row in chunk {
                for column in &columns {
                    query = bind_value(query, row.get(column).unwrap_or(&Value::Null));
                }
            }
            query.execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.run(sql).await
    }

    async fn has_schema_table(&self) -> Result<bool> {
        self.has_table(&self.options.schema_table).await
    }

    async fn create_schema_table(&self) -> Result<()> {
        history::create_schema_table(self, &self.options.schema_table, &self.options.log_fields).await
    }

    async fn get_version_log(&self) -> Result<Vec<VersionLogEntry>> {
        let fields = &self.options.log_fields;
        let sql = format!(
            "SELECT {} AS version, {} AS migration_name, {} AS start_time, {} AS end_time, \
             {} AS breakpoint FROM {} ORDER BY {} ASC",
            self.log_column(&fields.version),
            self.log_column(&fields.migration_name),
            self.log_column(&fields.start_time),
            self.log_column(&fields.end_time),
            self.log_column(&fields.breakpoint),
            self.log_table(),
            self.log_column(&fields.version),
        );

        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
        drop(conn);

        let mut entries = rows
            .iter()
            .map(|row| -> Result<VersionLogEntry> {
                Ok(VersionLogEntry {
                    version: row.try_get("version")?,
                    migration_name: row.try_get("migration_name")?,
                    start_time: parse_timestamp(row.try_get("start_time")?),
                    end_time: parse_timestamp(row.try_get("end_time")?),
                    breakpoint: row.try_get::<i64, _>("breakpoint")? != 0,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.options.version_order.sort(&mut entries);
        Ok(entries)
    }

    async fn migrated(
        &self,
        migration: &MigrationInfo,
        direction: Direction,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<()> {
        let fields = &self.options.log_fields;
        let mut conn = self.conn.lock().await;
        match direction {
            Direction::Up => {
                let sql = format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, 0)",
                    self.log_table(),
                    self.log_column(&fields.version),
                    self.log_column(&fields.migration_name),
                    self.log_column(&fields.start_time),
                    self.log_column(&fields.end_time),
                    self.log_column(&fields.breakpoint),
                );
                let name: String = migration
                    .name
                    .chars()
                    .take(MIGRATION_NAME_LIMIT as usize)
                    .collect();
                sqlx::query(&sql)
                    .bind(migration.version)
                    .bind(name)
                    .bind(start_time.format(TIMESTAMP_FORMAT).to_string())
                    .bind(end_time.format(TIMESTAMP_FORMAT).to_string())
                    .execute(&mut *conn)
                    .await?;
            }
            Direction::Down => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ?",
                    self.log_table(),
                    self.log_column(&fields.version),
                );
                sqlx::query(&sql)
                    .bind(migration.version)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn toggle_breakpoint(&self, version: i64) -> Result<()> {
        let fields = &self.options.log_fields;
        let breakpoint = self.log_column(&fields.breakpoint);
        let sql = format!(
            "UPDATE {} SET {breakpoint} = CASE {breakpoint} WHEN 0 THEN 1 ELSE 0 END WHERE {} = ?",
            self.log_table(),
            self.log_column(&fields.version),
        );
        let mut conn = self.conn.lock().await;
        sqlx::query(&sql).bind(version).execute(&mut *conn).await?;
        Ok(())
    }

    async fn reset_all_breakpoints(&self) -> Result<u64> {
        let breakpoint = self.log_column(&self.options.log_fields.breakpoint);
        let sql = format!(
            "UPDATE {} SET {breakpoint} = 0 WHERE {breakpoint} <> 0",
            self.log_table()
        );
        self.run(&sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnOptions, IndexOptions};
    use crate::table::Table;

    async fn adapter() -> SqliteAdapter {
        SqliteAdapter::connect(AdapterOptions::new("sqlite").name(":memory:"))
            .await
            .expect("in-memory database")
    }

    #[test]
    fn test_connection_url() {
        assert_eq!(connection_url(&AdapterOptions::new("sqlite")), "sqlite::memory:");
        assert_eq!(
            connection_url(&AdapterOptions::new("sqlite").name("db/app.sqlite3")),
            "sqlite://db/app.sqlite3"
        );
        assert_eq!(
            connection_url(&AdapterOptions::new("sqlite").name("x").connection("sqlite://y")),
            "sqlite://y"
        );
    }

    #[tokio::test]
    async fn test_schema_table_round_trip() {
        let adapter = adapter().await;
        assert!(!adapter.has_schema_table().await.expect("query"));
        adapter.create_schema_table().await.expect("create");
        assert!(adapter.has_schema_table().await.expect("query"));

        let now = chrono::Local::now().naive_local();
        adapter
            .migrated(&MigrationInfo::new(20_240_101_000_000, "CreateUsers"), Direction::Up, now, now)
            .await
            .expect("record");

        let log = adapter.get_version_log().await.expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].migration_name.as_deref(), Some("CreateUsers"));
        assert!(!log[0].breakpoint);
        assert!(log[0].start_time.is_some());

        adapter.toggle_breakpoint(20_240_101_000_000).await.expect("toggle");
        assert!(adapter.get_version_log().await.expect("log")[0].breakpoint);
        assert_eq!(adapter.reset_all_breakpoints().await.expect("reset"), 1);

        adapter
            .migrated(&MigrationInfo::new(20_240_101_000_000, "CreateUsers"), Direction::Down, now, now)
            .await
            .expect("remove");
        assert!(adapter.get_versions().await.expect("versions").is_empty());
    }

    #[tokio::test]
    async fn test_table_api_against_sqlite() {
        let adapter = adapter().await;
        let mut users = Table::new(TableRef::new("users"), &adapter);
        users
            .add_column("email", ColumnType::String, ColumnOptions::new().limit(120))
            .expect("valid type")
            .add_index(["email"], IndexOptions::new().unique());
        users.create().await.expect("create");

        assert!(adapter.has_table("users").await.expect("query"));
        assert!(adapter.has_column("users", "email").await.expect("query"));
        assert!(adapter
            .has_index("users", &["email".to_string()])
            .await
            .expect("query"));

        let columns = adapter.get_columns("users").await.expect("columns");
        assert_eq!(columns[0].name, "id");
        assert!(columns[0].identity);
        assert_eq!(columns[1].column_type, ColumnType::String);
        assert_eq!(columns[1].limit, Some(120));
    }

    #[tokio::test]
    async fn test_change_column_rebuilds_table() {
        let adapter = adapter().await;
        adapter
            .execute("CREATE TABLE people (id INTEGER PRIMARY KEY AUTOINCREMENT, age TEXT); \
                      INSERT INTO people (age) VALUES ('42'); \
                      CREATE INDEX people_age ON people (age)")
            .await
            .expect("seed");

        adapter
            .change_column("people", "age", &Column::new("age", ColumnType::Integer).not_null())
            .await
            .expect("change");

        let columns = adapter.get_columns("people").await.expect("columns");
        assert_eq!(columns[1].column_type, ColumnType::Integer);
        assert!(!columns[1].nullable);
        assert!(adapter.has_index_by_name("people", "people_age").await.expect("query"));
        assert!(!adapter.has_table("tmp_people").await.expect("query"));
    }

    #[tokio::test]
    async fn test_foreign_keys_by_rebuild() {
        let adapter = adapter().await;
        adapter
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT); \
                      CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER)")
            .await
            .expect("seed");

        let columns = vec!["user_id".to_string()];
        adapter
            .add_foreign_key("posts", &ForeignKey::new(["user_id"], "users", ["id"]))
            .await
            .expect("add fk");
        assert!(adapter.has_foreign_key("posts", &columns, None).await.expect("query"));

        adapter
            .drop_foreign_key("posts", &columns, None)
            .await
            .expect("drop fk");
        assert!(!adapter.has_foreign_key("posts", &columns, None).await.expect("query"));
    }

    #[tokio::test]
    async fn test_bulk_insert() {
        let adapter = adapter().await;
        adapter
            .execute("CREATE TABLE tags (name TEXT, weight INTEGER)")
            .await
            .expect("seed");

        let rows: Vec<Row> = ["a", "b"]
            .iter()
            .map(|n| {
                Row::from([
                    ("name".to_string(), Value::from(*n)),
                    ("weight".to_string(), Value::from(1)),
                ])
            })
            .collect();
        adapter.bulk_insert("tags", &rows).await.expect("insert");

        assert_eq!(adapter.execute("DELETE FROM tags").await.expect("delete"), 2);
    }

    #[tokio::test]
    async fn test_bulk_insert_splits_large_batches() {
        let adapter = adapter().await;
        adapter
            .execute("CREATE TABLE events (kind TEXT, seq INTEGER)")
            .await
            .expect("seed");

        // 40 000 parameters, above the per-statement limit.
        let rows: Vec<Row> = (0..20_000)
            .map(|i| {
                Row::from([
                    ("kind".to_string(), Value::from("click")),
                    ("seq".to_string(), Value::from(i)),
                ])
            })
            .collect();
        adapter.bulk_insert("events", &rows).await.expect("insert");

        assert_eq!(adapter.execute("DELETE FROM events").await.expect("delete"), 20_000);
    }

    #[tokio::test]
    async fn test_remove_constrained_columns() {
        let adapter = adapter().await;
        adapter
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, email TEXT, \
                      nick TEXT UNIQUE, team_id INTEGER REFERENCES teams (id), age INTEGER); \
                      CREATE INDEX users_email ON users (email); \
                      CREATE INDEX users_age ON users (age); \
                      INSERT INTO users (email, nick, team_id, age) VALUES ('a@b.c', 'ab', 1, 30)")
            .await
            .expect("seed");

        let mut users = Table::new(TableRef::new("users"), &adapter);
        users.remove_column("email");
        users.update().await.expect("remove indexed column");

        assert!(!adapter.has_column("users", "email").await.expect("query"));
        assert!(!adapter.has_index_by_name("users", "users_email").await.expect("query"));
        assert!(adapter.has_index_by_name("users", "users_age").await.expect("query"));
        assert!(adapter
            .has_index("users", &["nick".to_string()])
            .await
            .expect("query"));

        users.remove_column("team_id");
        users.update().await.expect("remove foreign key column");
        assert!(!adapter
            .has_foreign_key("users", &["team_id".to_string()], None)
            .await
            .expect("query"));

        users.remove_column("nick");
        users.update().await.expect("remove unique column");

        let names: Vec<String> = adapter
            .get_columns("users")
            .await
            .expect("columns")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id", "age"]);
        assert_eq!(adapter.execute("DELETE FROM users").await.expect("delete"), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_column_fails() {
        let adapter = adapter().await;
        adapter
            .execute("CREATE TABLE tags (name TEXT)")
            .await
            .expect("seed");
        assert!(adapter.drop_column("tags", "weight").await.is_err());
    }
}
