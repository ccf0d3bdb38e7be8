//! Version log.
//!
//! The version log is the tool-owned schema table with one row per applied
//! migration. Its column names are configurable, and it is read back either
//! in creation order (by version) or execution order (by start time).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::adapter::Adapter;
use crate::error::Result;
use crate::schema::{ColumnOptions, ColumnType, DefaultValue, TableOptions, TableRef};
use crate::table::Table;

/// Default name of the schema table.
pub const DEFAULT_SCHEMA_TABLE: &str = "strata_log";

/// Format used to store log timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum stored length of a migration name.
pub const MIGRATION_NAME_LIMIT: u32 = 100;

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLogEntry {
    /// Migration version.
    pub version: i64,
    /// Migration name at the time it was applied.
    pub migration_name: Option<String>,
    /// When execution started.
    pub start_time: Option<NaiveDateTime>,
    /// When execution finished.
    pub end_time: Option<NaiveDateTime>,
    /// Whether rollbacks stop at this entry.
    pub breakpoint: bool,
}

impl VersionLogEntry {
    /// Creates an entry without timestamps.
    #[must_use]
    pub fn new(version: i64, migration_name: impl Into<String>) -> Self {
        Self {
            version,
            migration_name: Some(migration_name.into()),
            start_time: None,
            end_time: None,
            breakpoint: false,
        }
    }

    /// Returns the start time as a `YYYYMMDDHHMMSS` number, or 0.
    #[must_use]
    pub fn start_time_as_version(&self) -> i64 {
        self.start_time
            .and_then(|t| t.format("%Y%m%d%H%M%S").to_string().parse().ok())
            .unwrap_or(0)
    }
}

/// Column names used by the schema table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFields {
    /// Version column.
    pub version: String,
    /// Migration name column.
    pub migration_name: String,
    /// Start time column.
    pub start_time: String,
    /// End time column.
    pub end_time: String,
    /// Breakpoint column.
    pub breakpoint: String,
}

impl Default for LogFields {
    fn default() -> Self {
        Self {
            version: "version".to_string(),
            migration_name: "migration_name".to_string(),
            start_time: "start_time".to_string(),
            end_time: "end_time".to_string(),
            breakpoint: "breakpoint".to_string(),
        }
    }
}

/// Order in which the version log is read and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrder {
    /// Ordered by version number.
    #[default]
    Creation,
    /// Ordered by start time, then version.
    Execution,
}

impl VersionOrder {
    /// Sorts log entries in place according to this order.
    pub fn sort(self, entries: &mut [VersionLogEntry]) {
        match self {
            Self::Creation => entries.sort_by_key(|e| e.version),
            Self::Execution => entries.sort_by(|a, b| {
                a.start_time
                    .cmp(&b.start_time)
                    .then(a.version.cmp(&b.version))
            }),
        }
    }
}

/// Identity of a migration as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Version.
    pub version: i64,
    /// Migration name.
    pub name: String,
}

impl MigrationInfo {
    /// Creates a new info record.
    #[must_use]
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
        }
    }
}

/// Creates the schema table through the regular table API.
///
/// The version column is the primary key; no implicit `id` is added.
pub async fn create_schema_table(adapter: &dyn Adapter, name: &str, fields: &LogFields) -> Result<()> {
    let options = TableOptions::new()
        .without_id()
        .primary_key([fields.version.clone()]);
    let mut table = Table::new(TableRef::with_options(name, options), adapter);

    table
        .add_column(
            &fields.version,
            ColumnType::BigInteger,
            ColumnOptions::new().null(false),
        )?
        .add_column(
            &fields.migration_name,
            ColumnType::String,
            ColumnOptions::new().limit(MIGRATION_NAME_LIMIT).null(true),
        )?
        .add_column(&fields.start_time, ColumnType::DateTime, ColumnOptions::new().null(true))?
        .add_column(&fields.end_time, ColumnType::DateTime, ColumnOptions::new().null(true))?
        .add_column(
            &fields.breakpoint,
            ColumnType::Boolean,
            ColumnOptions::new()
                .null(false)
                .default(DefaultValue::Bool(false)),
        )?;

    table.create().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(h, m, 0))
    }

    #[test]
    fn test_start_time_as_version() {
        let mut entry = VersionLogEntry::new(1, "Init");
        assert_eq!(entry.start_time_as_version(), 0);

        entry.start_time = at(13, 5);
        assert_eq!(entry.start_time_as_version(), 20_240_301_130_500);
    }

    #[test]
    fn test_execution_order_sorts_by_start_time() {
        let mut a = VersionLogEntry::new(3, "Third");
        a.start_time = at(9, 0);
        let mut b = VersionLogEntry::new(1, "First");
        b.start_time = at(10, 0);
        let mut entries = vec![b, a];

        VersionOrder::Execution.sort(&mut entries);
        assert_eq!(entries[0].version, 3);

        VersionOrder::Creation.sort(&mut entries);
        assert_eq!(entries[0].version, 1);
    }

    #[test]
    fn test_log_fields_aliases_deserialize() {
        let fields: LogFields = serde_json::from_str(r#"{"version": "ver"}"#).expect("valid json");
        assert_eq!(fields.version, "ver");
        assert_eq!(fields.breakpoint, "breakpoint");
    }

    #[test]
    fn test_version_order_deserialize() {
        let order: VersionOrder = serde_json::from_str("\"execution\"").expect("valid json");
        assert_eq!(order, VersionOrder::Execution);
    }
}
