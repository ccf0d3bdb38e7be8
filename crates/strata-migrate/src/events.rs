//! Progress events.
//!
//! The manager reports what it does through an [`EventSink`] rather than
//! printing. [`TracingSink`] forwards events to `tracing`;
//! [`CollectingSink`] keeps them for inspection.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::migration::Direction;

/// Something the manager did or decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A migration is about to run.
    MigrationStarted {
        /// Version.
        version: i64,
        /// Name.
        name: String,
        /// Direction.
        direction: Direction,
    },
    /// A migration finished and was logged.
    MigrationFinished {
        /// Version.
        version: i64,
        /// Name.
        name: String,
        /// Direction.
        direction: Direction,
        /// Wall time including logging.
        elapsed: Duration,
    },
    /// A seed is about to run.
    SeedStarted {
        /// Seed name.
        name: String,
    },
    /// A seed finished.
    SeedFinished {
        /// Seed name.
        name: String,
        /// Wall time.
        elapsed: Duration,
    },
    /// A date was resolved to a migration version.
    TargetResolved {
        /// Version that will be migrated to.
        version: i64,
    },
    /// A requested version is not a discovered migration.
    InvalidVersion {
        /// The requested version.
        version: i64,
    },
    /// Rollback found nothing to revert.
    NothingToRollback,
    /// A breakpoint was toggled.
    BreakpointToggled {
        /// Version.
        version: i64,
        /// Migration name.
        name: String,
        /// Whether the breakpoint is now set.
        set: bool,
    },
    /// All breakpoints were cleared.
    BreakpointsCleared {
        /// How many entries changed.
        count: u64,
    },
}

/// Receives events as they happen.
pub trait EventSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: &Event);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::MigrationStarted {
                version,
                name,
                direction,
            } => {
                let verb = match direction {
                    Direction::Up => "migrating",
                    Direction::Down => "reverting",
                };
                info!(version, name = %name, "== {verb}");
            }
            Event::MigrationFinished {
                version,
                name,
                direction,
                elapsed,
            } => {
                let verb = match direction {
                    Direction::Up => "migrated",
                    Direction::Down => "reverted",
                };
                info!(
                    version,
                    name = %name,
                    elapsed = %format!("{:.4}s", elapsed.as_secs_f64()),
                    "== {verb}"
                );
            }
            Event::SeedStarted { name } => info!(seed = %name, "== seeding"),
            Event::SeedFinished { name, elapsed } => info!(
                seed = %name,
                elapsed = %format!("{:.4}s", elapsed.as_secs_f64()),
                "== seeded"
            ),
            Event::TargetResolved { version } => info!(version, "Migrating to version"),
            Event::InvalidVersion { version } => warn!(version, "Not a valid version"),
            Event::NothingToRollback => warn!("No migrations to rollback"),
            Event::BreakpointToggled { version, name, set } => info!(
                version,
                name = %name,
                "Breakpoint {}",
                if *set { "set" } else { "cleared" }
            ),
            Event::BreakpointsCleared { count } => info!(count, "Breakpoints cleared"),
        }
    }
}

/// Stores events in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.emit(&Event::NothingToRollback);
        sink.emit(&Event::BreakpointsCleared { count: 2 });

        assert_eq!(
            sink.events(),
            vec![Event::NothingToRollback, Event::BreakpointsCleared { count: 2 }]
        );
    }

    #[test]
    fn test_tracing_sink_handles_every_event() {
        let sink = TracingSink;
        sink.emit(&Event::MigrationFinished {
            version: 1,
            name: "Init".to_string(),
            direction: Direction::Down,
            elapsed: Duration::from_millis(5),
        });
        sink.emit(&Event::InvalidVersion { version: 7 });
    }
}
