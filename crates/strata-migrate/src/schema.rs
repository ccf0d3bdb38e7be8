//! Schema value types.
//!
//! These types describe tables, columns, indexes and foreign keys as a
//! migration author declares them. They carry no database state; adapters
//! translate them into DDL.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One buffered row for `insert`/`bulk_insert`, keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

/// Abstract column types understood by the planner.
///
/// Adapters advertise the subset they support; `Literal` carries a raw
/// backend type and bypasses validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit integer.
    BigInteger,
    /// 16-bit integer.
    SmallInteger,
    /// 32-bit integer.
    Integer,
    /// Fixed-length binary.
    Binary,
    /// Binary large object.
    Blob,
    /// Boolean.
    Boolean,
    /// Fixed-length character string.
    Char,
    /// Variable-length character string.
    String,
    /// Unbounded text.
    Text,
    /// Date only.
    Date,
    /// Date and time.
    DateTime,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Exact numeric with precision and scale.
    Decimal,
    /// Floating point.
    Float,
    /// UUID.
    Uuid,
    /// JSON document.
    Json,
    /// Binary JSON document.
    Jsonb,
    /// Enumerated string.
    Enum,
    /// String set.
    Set,
    /// Backend type passed through verbatim.
    Literal(String),
}

impl ColumnType {
    /// Returns true for the escape-hatch literal type.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::BigInteger => "biginteger",
            Self::SmallInteger => "smallinteger",
            Self::Integer => "integer",
            Self::Binary => "binary",
            Self::Blob => "blob",
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::String => "string",
            Self::Text => "text",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Jsonb => "jsonb",
            Self::Enum => "enum",
            Self::Set => "set",
            Self::Literal(raw) => raw,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = std::convert::Infallible;

    /// Parses a canonical name; anything unknown becomes a `Literal`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "biginteger" => Self::BigInteger,
            "smallinteger" | "smallint" => Self::SmallInteger,
            "integer" => Self::Integer,
            "binary" => Self::Binary,
            "blob" => Self::Blob,
            "boolean" => Self::Boolean,
            "char" => Self::Char,
            "string" => Self::String,
            "text" => Self::Text,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "decimal" => Self::Decimal,
            "float" => Self::Float,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            "enum" => Self::Enum,
            "set" => Self::Set,
            _ => Self::Literal(s.to_string()),
        })
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// No default value.
    None,
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Null => Some("NULL".to_string()),
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
            Self::Expression(expr) => Some(expr.clone()),
        }
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses the SQL spelling reported by database catalogs.
    #[must_use]
    pub fn from_sql(sql: &str) -> Self {
        match sql.to_ascii_uppercase().as_str() {
            "RESTRICT" => Self::Restrict,
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }
}

/// Definition of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Abstract type.
    pub column_type: ColumnType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value.
    pub default: DefaultValue,
    /// Length limit (strings, binaries).
    pub limit: Option<u32>,
    /// Decimal precision.
    pub precision: Option<u8>,
    /// Decimal scale.
    pub scale: Option<u8>,
    /// Whether numbers are signed.
    pub signed: bool,
    /// Whether this column is an auto-incrementing identity.
    pub identity: bool,
    /// Whether this column has a UNIQUE constraint.
    pub unique: bool,
    /// Column comment.
    pub comment: Option<String>,
    /// Place the column after another one (where supported).
    pub after: Option<String>,
    /// ON UPDATE expression for timestamps.
    pub update: Option<String>,
    /// Whether timestamps carry a time zone.
    pub timezone: bool,
    /// Allowed values for enum/set columns.
    pub values: Vec<String>,
    /// Collation for string columns.
    pub collation: Option<String>,
    /// Character encoding for string columns.
    pub encoding: Option<String>,
}

impl Column {
    /// Creates a new nullable column without a default.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: DefaultValue::None,
            limit: None,
            precision: None,
            scale: None,
            signed: true,
            identity: false,
            unique: false,
            comment: None,
            after: None,
            update: None,
            timezone: false,
            values: Vec::new(),
            collation: None,
            encoding: None,
        }
    }

    /// Applies column options.
    #[must_use]
    pub fn with_options(mut self, options: ColumnOptions) -> Self {
        options.apply(&mut self);
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = value;
        self
    }

    /// Sets the length limit.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Marks the column as an auto-incrementing identity.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Optional column attributes, applied on top of `Column::new`.
///
/// Only fields that are set override the column defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOptions {
    nullable: Option<bool>,
    default: Option<DefaultValue>,
    limit: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
    signed: Option<bool>,
    identity: bool,
    unique: bool,
    comment: Option<String>,
    after: Option<String>,
    update: Option<String>,
    timezone: bool,
    values: Vec<String>,
    collation: Option<String>,
    encoding: Option<String>,
}

impl ColumnOptions {
    /// Creates empty column options.
    #[must_use]
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    /// Sets nullability.
    #[must_use]
    pub fn null(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the length limit.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets decimal precision and scale.
    #[must_use]
    pub fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Sets signedness.
    #[must_use]
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = Some(signed);
        self
    }

    /// Marks the column as an identity.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Places the column after another.
    #[must_use]
    pub fn after(mut self, column: impl Into<String>) -> Self {
        self.after = Some(column.into());
        self
    }

    /// Sets the ON UPDATE expression.
    #[must_use]
    pub fn update(mut self, expr: impl Into<String>) -> Self {
        self.update = Some(expr.into());
        self
    }

    /// Stores timestamps with time zone.
    #[must_use]
    pub fn timezone(mut self, timezone: bool) -> Self {
        self.timezone = timezone;
        self
    }

    /// Sets the values of an enum/set column.
    #[must_use]
    pub fn values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets collation.
    #[must_use]
    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Sets encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    fn apply(self, column: &mut Column) {
        if let Some(nullable) = self.nullable {
            column.nullable = nullable;
        }
        if let Some(default) = self.default {
            column.default = default;
        }
        if self.limit.is_some() {
            column.limit = self.limit;
        }
        if self.precision.is_some() {
            column.precision = self.precision;
            column.scale = self.scale;
        }
        if let Some(signed) = self.signed {
            column.signed = signed;
        }
        if self.identity {
            column.identity = true;
            column.nullable = false;
        }
        column.unique |= self.unique;
        if self.comment.is_some() {
            column.comment = self.comment;
        }
        if self.after.is_some() {
            column.after = self.after;
        }
        if self.update.is_some() {
            column.update = self.update;
        }
        column.timezone |= self.timezone;
        if !self.values.is_empty() {
            column.values = self.values;
        }
        if self.collation.is_some() {
            column.collation = self.collation;
        }
        if self.encoding.is_some() {
            column.encoding = self.encoding;
        }
    }
}

/// Definition of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Explicit index name; adapters derive one when absent.
    pub name: Option<String>,
    /// Columns included in the index.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
}

impl Index {
    /// Creates a non-unique index over the given columns.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Creates a reference to an index by name only.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            columns: Vec::new(),
            unique: false,
        }
    }

    /// Applies index options.
    #[must_use]
    pub fn with_options(mut self, options: IndexOptions) -> Self {
        if options.name.is_some() {
            self.name = options.name;
        }
        self.unique |= options.unique;
        self
    }

    /// Returns the explicit name, or the conventional `<table>_<columns>` one.
    #[must_use]
    pub fn name_for(&self, table: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", table, self.columns.join("_")))
    }
}

/// Optional index attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    name: Option<String>,
    unique: bool,
}

impl IndexOptions {
    /// Creates empty index options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the index.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Definition of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name, when explicitly given.
    pub name: Option<String>,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced column(s).
    pub referenced_columns: Vec<String>,
    /// Action on delete.
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Creates a foreign key.
    #[must_use]
    pub fn new<I, S, J, T>(columns: I, referenced_table: impl Into<String>, referenced: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced.into_iter().map(Into::into).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Creates a reference used only to locate a constraint for dropping.
    #[must_use]
    pub fn reference<I, S>(columns: I, constraint: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: constraint,
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: String::new(),
            referenced_columns: Vec::new(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Applies foreign key options.
    #[must_use]
    pub fn with_options(mut self, options: ForeignKeyOptions) -> Self {
        if let Some(action) = options.on_delete {
            self.on_delete = action;
        }
        if let Some(action) = options.on_update {
            self.on_update = action;
        }
        if options.constraint.is_some() {
            self.name = options.constraint;
        }
        self
    }

    /// Returns true if this key covers exactly the given columns.
    #[must_use]
    pub fn matches_columns(&self, columns: &[String]) -> bool {
        self.columns == columns
    }
}

/// Optional foreign key attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyOptions {
    on_delete: Option<ForeignKeyAction>,
    on_update: Option<ForeignKeyAction>,
    constraint: Option<String>,
}

impl ForeignKeyOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Names the constraint.
    #[must_use]
    pub fn constraint(mut self, name: impl Into<String>) -> Self {
        self.constraint = Some(name.into());
        self
    }
}

/// How a new table gets its surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdColumn {
    /// An auto-incrementing integer column named `id`.
    #[default]
    Auto,
    /// An auto-incrementing integer column with a custom name.
    Named(String),
    /// No implicit key column.
    None,
}

/// Table-level options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableOptions {
    /// Implicit key column.
    pub id: IdColumn,
    /// Explicit primary key column(s), used when `id` is `None`.
    pub primary_key: Vec<String>,
    /// Table comment.
    pub comment: Option<String>,
}

impl TableOptions {
    /// Creates default options (implicit `id` column).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables the implicit key column.
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.id = IdColumn::None;
        self
    }

    /// Renames the implicit key column.
    #[must_use]
    pub fn id(mut self, name: impl Into<String>) -> Self {
        self.id = IdColumn::Named(name.into());
        self
    }

    /// Sets an explicit primary key.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Returns the implicit key column name, if any.
    #[must_use]
    pub fn id_column(&self) -> Option<&str> {
        match &self.id {
            IdColumn::Auto => Some("id"),
            IdColumn::Named(name) => Some(name),
            IdColumn::None => None,
        }
    }
}

/// A table name plus its options, shared by every action bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Table name as the adapter sees it.
    pub name: String,
    /// Table options.
    pub options: TableOptions,
}

impl TableRef {
    /// Creates a reference with default options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: TableOptions::default(),
        }
    }

    /// Creates a reference with explicit options.
    #[must_use]
    pub fn with_options(name: impl Into<String>, options: TableOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Returns a copy bound to another name, keeping the options.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: self.options.clone(),
        }
    }
}

/// Table-level changes carried by an `UpdateTable` action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableUpdate {
    /// New table comment.
    pub comment: Option<String>,
}
