//! Migration status report.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Value};

use crate::history::{VersionLogEntry, VersionOrder};
use crate::migration::MigrationUnit;

/// Exit code when applied migrations are missing from the source.
pub const EXIT_STATUS_MISSING: u8 = 2;

/// Exit code when migrations are pending.
pub const EXIT_STATUS_DOWN: u8 = 3;

/// State of one row in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    /// Applied and discovered.
    Up,
    /// Discovered but not applied.
    Down,
    /// Applied but no longer discovered.
    Missing,
}

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Row state.
    pub state: MigrationState,
    /// Version.
    pub version: i64,
    /// Discovered name, or the logged name for missing entries.
    pub name: Option<String>,
    /// Logged start time.
    pub start_time: Option<NaiveDateTime>,
    /// Logged end time.
    pub end_time: Option<NaiveDateTime>,
    /// Whether a breakpoint is set.
    pub breakpoint: bool,
}

impl StatusEntry {
    fn up(unit: &MigrationUnit, entry: &VersionLogEntry) -> Self {
        Self {
            state: MigrationState::Up,
            version: unit.version,
            name: Some(unit.name.clone()),
            start_time: entry.start_time,
            end_time: entry.end_time,
            breakpoint: entry.breakpoint,
        }
    }

    fn down(unit: &MigrationUnit) -> Self {
        Self {
            state: MigrationState::Down,
            version: unit.version,
            name: Some(unit.name.clone()),
            start_time: None,
            end_time: None,
            breakpoint: false,
        }
    }

    fn missing(entry: &VersionLogEntry) -> Self {
        Self {
            state: MigrationState::Missing,
            version: entry.version,
            name: entry.migration_name.clone(),
            start_time: entry.start_time,
            end_time: entry.end_time,
            breakpoint: entry.breakpoint,
        }
    }
}

/// Discovered migrations cross-referenced with the version log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Ordering used for the applied rows.
    pub version_order: VersionOrder,
    /// Rows: applied ones in log order with missing entries placed
    /// among them, then pending ones by version, then leftover missing
    /// entries.
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    /// Builds a report from discovered units and the ordered log.
    #[must_use]
    pub fn build(
        migrations: &BTreeMap<i64, MigrationUnit>,
        log: &[VersionLogEntry],
        version_order: VersionOrder,
    ) -> Self {
        let mut missing = log
            .iter()
            .filter(|e| !migrations.contains_key(&e.version))
            .peekable();
        let applied: Vec<&VersionLogEntry> = log
            .iter()
            .filter(|e| migrations.contains_key(&e.version))
            .collect();
        let applied_versions: HashSet<i64> = applied.iter().map(|e| e.version).collect();

        let mut entries = Vec::with_capacity(log.len() + migrations.len());
        if applied.is_empty() {
            entries.extend(missing.by_ref().map(StatusEntry::missing));
        }

        for entry in applied {
            while let Some(gone) = missing.peek() {
                if comes_after(gone, entry, version_order) {
                    break;
                }
                entries.push(StatusEntry::missing(gone));
                missing.next();
            }
            if let Some(unit) = migrations.get(&entry.version) {
                entries.push(StatusEntry::up(unit, entry));
            }
        }

        entries.extend(
            migrations
                .values()
                .filter(|unit| !applied_versions.contains(&unit.version))
                .map(StatusEntry::down),
        );
        entries.extend(missing.map(StatusEntry::missing));

        Self {
            version_order,
            entries,
        }
    }

    /// Number of discovered migrations not yet applied.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.count(MigrationState::Down)
    }

    /// Number of applied migrations no longer discovered.
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.count(MigrationState::Missing)
    }

    /// Number of rows.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    fn count(&self, state: MigrationState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Process exit code: missing beats pending, 0 when fully up.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.missing_count() > 0 {
            EXIT_STATUS_MISSING
        } else if self.pending_count() > 0 {
            EXIT_STATUS_DOWN
        } else {
            0
        }
    }

    /// Machine-readable summary.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let migrations: Vec<Value> = self
            .entries
            .iter()
            .filter(|e| e.state != MigrationState::Missing)
            .map(|e| {
                json!({
                    "migration_status": e.state,
                    "migration_id": e.version.to_string(),
                    "migration_name": e.name,
                })
            })
            .collect();

        json!({
            "pending_count": self.pending_count(),
            "missing_count": self.missing_count(),
            "total_count": self.total_count(),
            "migrations": migrations,
        })
    }
}

/// True when a missing entry belongs after an applied one.
fn comes_after(missing: &VersionLogEntry, applied: &VersionLogEntry, order: VersionOrder) -> bool {
    match order {
        VersionOrder::Creation => missing.version > applied.version,
        VersionOrder::Execution => {
            missing.start_time > applied.start_time
                || (missing.start_time == applied.start_time && missing.version > applied.version)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::migration::{MigrationContext, ReversibleMigration};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct Noop;

    #[async_trait]
    impl ReversibleMigration for Noop {
        async fn change(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn discovered(versions: &[i64]) -> BTreeMap<i64, MigrationUnit> {
        versions
            .iter()
            .map(|&v| (v, MigrationUnit::change(v, format!("Migration{v}"), Noop)))
            .collect()
    }

    fn states(report: &StatusReport) -> Vec<(i64, MigrationState)> {
        report.entries.iter().map(|e| (e.version, e.state)).collect()
    }

    #[test]
    fn test_missing_entry_is_interleaved() {
        let migrations = discovered(&[1, 3]);
        let log = vec![
            VersionLogEntry::new(1, "Migration1"),
            VersionLogEntry::new(2, "Deleted"),
            VersionLogEntry::new(3, "Migration3"),
        ];
        let report = StatusReport::build(&migrations, &log, VersionOrder::Creation);

        assert_eq!(
            states(&report),
            vec![
                (1, MigrationState::Up),
                (2, MigrationState::Missing),
                (3, MigrationState::Up),
            ]
        );
        assert_eq!(report.entries[1].name.as_deref(), Some("Deleted"));
        assert_eq!(report.exit_code(), EXIT_STATUS_MISSING);
    }

    #[test]
    fn test_missing_beats_down() {
        let migrations = discovered(&[1, 3, 4]);
        let log = vec![VersionLogEntry::new(2, "Deleted"), VersionLogEntry::new(3, "Migration3")];
        let report = StatusReport::build(&migrations, &log, VersionOrder::Creation);

        assert_eq!(
            states(&report),
            vec![
                (2, MigrationState::Missing),
                (3, MigrationState::Up),
                (1, MigrationState::Down),
                (4, MigrationState::Down),
            ]
        );
        assert_eq!(report.pending_count(), 2);
        assert_eq!(report.exit_code(), EXIT_STATUS_MISSING);
    }

    #[test]
    fn test_only_missing_entries_come_first() {
        let migrations = discovered(&[5]);
        let log = vec![VersionLogEntry::new(9, "Deleted")];
        let report = StatusReport::build(&migrations, &log, VersionOrder::Creation);

        assert_eq!(
            states(&report),
            vec![(9, MigrationState::Missing), (5, MigrationState::Down)]
        );
    }

    #[test]
    fn test_execution_order_uses_start_time() {
        let at = |h| NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(h, 0, 0));
        let migrations = discovered(&[1, 3]);
        let mut third = VersionLogEntry::new(3, "Migration3");
        third.start_time = at(8);
        let mut gone = VersionLogEntry::new(2, "Deleted");
        gone.start_time = at(9);
        let mut first = VersionLogEntry::new(1, "Migration1");
        first.start_time = at(10);
        let log = vec![third, gone, first];

        let report = StatusReport::build(&migrations, &log, VersionOrder::Execution);
        assert_eq!(
            states(&report),
            vec![
                (3, MigrationState::Up),
                (2, MigrationState::Missing),
                (1, MigrationState::Up),
            ]
        );
    }

    #[test]
    fn test_exit_codes_and_json() {
        let migrations = discovered(&[1, 2]);
        let up = StatusReport::build(
            &migrations,
            &[VersionLogEntry::new(1, "Migration1"), VersionLogEntry::new(2, "Migration2")],
            VersionOrder::Creation,
        );
        assert_eq!(up.exit_code(), 0);

        let pending = StatusReport::build(
            &migrations,
            &[VersionLogEntry::new(1, "Migration1")],
            VersionOrder::Creation,
        );
        assert_eq!(pending.exit_code(), EXIT_STATUS_DOWN);

        let json = pending.to_json();
        assert_eq!(json["pending_count"], 1);
        assert_eq!(json["missing_count"], 0);
        assert_eq!(json["total_count"], 2);
        assert_eq!(json["migrations"][1]["migration_status"], "down");
        assert_eq!(json["migrations"][1]["migration_id"], "2");
        assert_eq!(json["migrations"][0]["migration_name"], "Migration1");
    }
}
