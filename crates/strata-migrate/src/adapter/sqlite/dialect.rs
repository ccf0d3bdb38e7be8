//! SQLite SQL generation.
//!
//! SQLite has limited ALTER TABLE support, so column changes and foreign
//! key changes use the "table recreation" strategy: create a new table,
//! copy data, drop the old table, rename the new table.

use crate::schema::{Column, ColumnType, DefaultValue, ForeignKey, Index, TableRef};

/// Generates SQLite statements from schema values.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type, verbatim.
    pub declared_type: String,
    /// NOT NULL constraint.
    pub not_null: bool,
    /// Default expression, verbatim.
    pub default: Option<String>,
    /// Position in the primary key (0 when not part of it).
    pub pk: i64,
}

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Quotes an identifier.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes and comma-joins identifiers.
    #[must_use]
    pub fn quote_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns the declared SQL type for a column.
    #[must_use]
    pub fn type_name(&self, column: &Column) -> String {
        match &column.column_type {
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Binary | ColumnType::Blob => "BLOB".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Char => format!("CHAR({})", column.limit.unwrap_or(255)),
            ColumnType::String | ColumnType::Enum | ColumnType::Set => {
                format!("VARCHAR({})", column.limit.unwrap_or(255))
            }
            ColumnType::Text | ColumnType::Json | ColumnType::Jsonb => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Decimal => match (column.precision, column.scale) {
                (Some(p), Some(s)) => format!("DECIMAL({p},{s})"),
                (Some(p), None) => format!("DECIMAL({p})"),
                _ => "DECIMAL".to_string(),
            },
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
            ColumnType::Literal(raw) => raw.clone(),
        }
    }

    /// Maps a declared SQLite type back to an abstract column type.
    #[must_use]
    pub fn column_type_from_sql(&self, declared: &str) -> (ColumnType, Option<u32>) {
        let upper = declared.trim().to_ascii_uppercase();
        let (base, args) = match upper.split_once('(') {
            Some((base, rest)) => (base.trim().to_string(), rest.trim_end_matches(')').to_string()),
            None => (upper.clone(), String::new()),
        };
        let limit = args.split(',').next().and_then(|a| a.trim().parse().ok());

        let column_type = match base.as_str() {
            "BIGINT" => ColumnType::BigInteger,
            "SMALLINT" => ColumnType::SmallInteger,
            "INTEGER" | "INT" => ColumnType::Integer,
            "BLOB" => ColumnType::Blob,
            "BOOLEAN" => ColumnType::Boolean,
            "CHAR" if limit == Some(36) => ColumnType::Uuid,
            "CHAR" => ColumnType::Char,
            "VARCHAR" => ColumnType::String,
            "TEXT" => ColumnType::Text,
            "DATE" => ColumnType::Date,
            "DATETIME" => ColumnType::DateTime,
            "TIME" => ColumnType::Time,
            "TIMESTAMP" => ColumnType::Timestamp,
            "DECIMAL" | "NUMERIC" => ColumnType::Decimal,
            "FLOAT" | "REAL" | "DOUBLE" => ColumnType::Float,
            _ => ColumnType::Literal(declared.to_string()),
        };
        (column_type, limit)
    }

    /// Generates a column definition.
    #[must_use]
    pub fn column_definition(&self, column: &Column) -> String {
        if column.identity {
            return format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                self.quote_identifier(&column.name)
            );
        }

        let mut parts = vec![self.quote_identifier(&column.name), self.type_name(column)];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if column.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(default_sql) = column.default.to_sql() {
            parts.push(format!("DEFAULT {default_sql}"));
        }
        if !column.values.is_empty() {
            let values: Vec<String> = column
                .values
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect();
            parts.push(format!(
                "CHECK ({} IN ({}))",
                self.quote_identifier(&column.name),
                values.join(", ")
            ));
        }

        parts.join(" ")
    }

    /// Generates a column definition from catalog information.
    #[must_use]
    pub fn column_info_definition(&self, info: &ColumnInfo, autoincrement: bool) -> String {
        let mut parts = vec![self.quote_identifier(&info.name), info.declared_type.clone()];
        if autoincrement {
            parts.push("PRIMARY KEY AUTOINCREMENT".to_string());
            return parts.join(" ");
        }
        if info.not_null {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &info.default {
            parts.push(format!("DEFAULT {default}"));
        }
        parts.join(" ")
    }

    /// Generates a foreign key clause for a CREATE TABLE body.
    #[must_use]
    pub fn foreign_key_clause(&self, fk: &ForeignKey) -> String {
        let mut sql = String::new();
        if let Some(name) = &fk.name {
            sql.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(name)));
        }
        sql.push_str(&format!(
            "FOREIGN KEY ({}) REFERENCES {}",
            self.quote_list(&fk.columns),
            self.quote_identifier(&fk.referenced_table),
        ));
        if !fk.referenced_columns.is_empty() {
            sql.push_str(&format!(" ({})", self.quote_list(&fk.referenced_columns)));
        }
        sql.push_str(&format!(
            " ON DELETE {} ON UPDATE {}",
            fk.on_delete.to_sql(),
            fk.on_update.to_sql()
        ));
        sql
    }

    /// Generates SQL for creating a table.
    #[must_use]
    pub fn create_table_sql(
        &self,
        table: &TableRef,
        columns: &[Column],
        foreign_keys: &[ForeignKey],
    ) -> String {
        let mut defs = Vec::with_capacity(columns.len() + foreign_keys.len() + 2);

        if let Some(id) = table.options.id_column() {
            let id_column = Column::new(id, ColumnType::Integer).identity();
            defs.push(self.column_definition(&id_column));
        }
        defs.extend(columns.iter().map(|c| self.column_definition(c)));

        if table.options.id_column().is_none() && !table.options.primary_key.is_empty() {
            defs.push(format!(
                "PRIMARY KEY ({})",
                self.quote_list(&table.options.primary_key)
            ));
        }
        defs.extend(foreign_keys.iter().map(|fk| self.foreign_key_clause(fk)));

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            defs.join(",\n  ")
        )
    }

    /// Generates SQL for dropping a table.
    #[must_use]
    pub fn drop_table_sql(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(name))
    }

    /// Generates SQL for renaming a table.
    #[must_use]
    pub fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for adding a column.
    #[must_use]
    pub fn add_column_sql(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// Generates SQL for renaming a column (SQLite 3.25.0+).
    #[must_use]
    pub fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for creating an index.
    #[must_use]
    pub fn create_index_sql(&self, table: &str, index: &Index) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name_for(table)),
            self.quote_identifier(table),
            self.quote_list(&index.columns)
        )
    }

    /// Generates SQL for dropping an index.
    #[must_use]
    pub fn drop_index_sql(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    /// Generates a parameterized INSERT for `row_count` rows.
    #[must_use]
    pub fn insert_sql(&self, table: &str, columns: &[String], row_count: usize) -> String {
        let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_identifier(table),
            self.quote_list(columns),
            vec![placeholders; row_count].join(", ")
        )
    }

    /// Generates the statements that rebuild a table with new definitions.
    ///
    /// `copy` pairs each target column with the source column it is filled
    /// from. Index statements are replayed after the rename.
    #[must_use]
    pub fn recreate_table_sql(
        &self,
        table: &str,
        definitions: &[String],
        copy: &[(String, String)],
        index_sql: &[String],
    ) -> Vec<String> {
        let tmp = format!("tmp_{table}");
        let targets: Vec<String> = copy.iter().map(|(t, _)| t.clone()).collect();
        let sources: Vec<String> = copy.iter().map(|(_, s)| s.clone()).collect();

        let mut statements = vec![
            format!(
                "CREATE TABLE {} (\n  {}\n)",
                self.quote_identifier(&tmp),
                definitions.join(",\n  ")
            ),
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                self.quote_identifier(&tmp),
                self.quote_list(&targets),
                self.quote_list(&sources),
                self.quote_identifier(table)
            ),
            self.drop_table_sql(table),
            self.rename_table_sql(&tmp, table),
        ];
        statements.extend(index_sql.iter().cloned());
        statements
    }
}

/// Renders a default value the way SQLite reports it in `PRAGMA table_info`.
#[must_use]
pub fn default_from_catalog(raw: Option<String>) -> DefaultValue {
    match raw {
        None => DefaultValue::None,
        Some(v) if v.eq_ignore_ascii_case("NULL") => DefaultValue::Null,
        Some(v) => v
            .parse::<i64>()
            .map(DefaultValue::Integer)
            .unwrap_or(DefaultValue::Expression(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnOptions, ForeignKeyAction, ForeignKeyOptions, IndexOptions, TableOptions};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_with_implicit_id() {
        let sql = dialect().create_table_sql(
            &TableRef::new("users"),
            &[Column::new("email", ColumnType::String).with_options(ColumnOptions::new().null(false))],
            &[],
        );

        assert!(sql.starts_with("CREATE TABLE \"users\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"email\" VARCHAR(255) NOT NULL"));
    }

    #[test]
    fn test_create_table_with_explicit_primary_key() {
        let table = TableRef::with_options(
            "log",
            TableOptions::new().without_id().primary_key(["version"]),
        );
        let sql = dialect().create_table_sql(
            &table,
            &[Column::new("version", ColumnType::BigInteger).not_null()],
            &[],
        );

        assert!(!sql.contains("AUTOINCREMENT"));
        assert!(sql.contains("PRIMARY KEY (\"version\")"));
    }

    #[test]
    fn test_foreign_key_clause() {
        let fk = ForeignKey::new(["user_id"], "users", ["id"])
            .with_options(ForeignKeyOptions::new().on_delete(ForeignKeyAction::Cascade));
        let clause = dialect().foreign_key_clause(&fk);

        assert_eq!(
            clause,
            "FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION"
        );
    }

    #[test]
    fn test_create_index_sql() {
        let index = Index::new(["email"]).with_options(IndexOptions::new().unique());
        assert_eq!(
            dialect().create_index_sql("users", &index),
            "CREATE UNIQUE INDEX \"users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn test_insert_sql() {
        let sql = dialect().insert_sql("users", &["a".to_string(), "b".to_string()], 2);
        assert_eq!(sql, "INSERT INTO \"users\" (\"a\", \"b\") VALUES (?, ?), (?, ?)");
    }

    #[test]
    fn test_column_type_round_trip_names() {
        let d = dialect();
        assert_eq!(d.column_type_from_sql("VARCHAR(100)"), (ColumnType::String, Some(100)));
        assert_eq!(d.column_type_from_sql("bigint").0, ColumnType::BigInteger);
        assert_eq!(
            d.column_type_from_sql("GEOMETRY").0,
            ColumnType::Literal("GEOMETRY".to_string())
        );
    }

    #[test]
    fn test_default_from_catalog() {
        assert_eq!(default_from_catalog(None), DefaultValue::None);
        assert_eq!(default_from_catalog(Some("0".into())), DefaultValue::Integer(0));
        assert_eq!(
            default_from_catalog(Some("CURRENT_TIMESTAMP".into())),
            DefaultValue::Expression("CURRENT_TIMESTAMP".into())
        );
    }
}
