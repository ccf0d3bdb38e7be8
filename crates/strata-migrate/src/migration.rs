//! Migration and seed units.
//!
//! A migration declares its body as one of two variants at registration:
//! explicit `up`/`down` bodies, or a single reversible `change` body that
//! runs forward on UP and is replayed backwards on DOWN.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::Adapter;
use crate::error::Result;
use crate::schema::{Row, TableOptions, TableRef};
use crate::table::Table;

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Apply.
    Up,
    /// Revert.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// A migration with explicit forward and backward bodies.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Applies the migration.
    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    /// Reverts the migration.
    async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()>;
}

/// A migration whose single body can be inverted automatically.
#[async_trait]
pub trait ReversibleMigration: Send + Sync {
    /// Describes the forward change.
    async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()>;
}

/// The body of a migration unit.
#[derive(Clone)]
pub enum MigrationBody {
    /// Explicit `up`/`down`.
    UpDown(Arc<dyn Migration>),
    /// Reversible `change`.
    Change(Arc<dyn ReversibleMigration>),
}

impl fmt::Debug for MigrationBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpDown(_) => f.write_str("UpDown"),
            Self::Change(_) => f.write_str("Change"),
        }
    }
}

/// A discovered migration.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    /// Version (`YYYYMMDDHHMMSS`).
    pub version: i64,
    /// Class-style name, e.g. `CreateUsersTable`.
    pub name: String,
    /// Where the unit was discovered.
    pub path: Option<PathBuf>,
    /// Namespace the unit belongs to.
    pub namespace: Option<String>,
    /// The body.
    pub body: MigrationBody,
}

impl MigrationUnit {
    /// Creates a unit with explicit `up`/`down` bodies.
    #[must_use]
    pub fn up_down(version: i64, name: impl Into<String>, migration: impl Migration + 'static) -> Self {
        Self {
            version,
            name: name.into(),
            path: None,
            namespace: None,
            body: MigrationBody::UpDown(Arc::new(migration)),
        }
    }

    /// Creates a unit with a reversible `change` body.
    #[must_use]
    pub fn change(
        version: i64,
        name: impl Into<String>,
        migration: impl ReversibleMigration + 'static,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            path: None,
            namespace: None,
            body: MigrationBody::Change(Arc::new(migration)),
        }
    }

    /// Sets the source path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Returns the namespaced name used for uniqueness checks.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}::{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Returns a printable source for error messages.
    #[must_use]
    pub fn source(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| self.qualified_name(), |p| p.display().to_string())
    }

    /// Returns true for `change` bodies.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        matches!(self.body, MigrationBody::Change(_))
    }
}

/// A data seeder.
#[async_trait]
pub trait Seed: Send + Sync {
    /// Names of seeds that must run first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Inserts the seed data.
    async fn run(&self, ctx: &MigrationContext<'_>) -> Result<()>;
}

/// A discovered seed.
#[derive(Clone)]
pub struct SeedUnit {
    /// Class-style name, e.g. `UserSeeder`.
    pub name: String,
    /// Namespace the seed belongs to.
    pub namespace: Option<String>,
    /// The seed.
    pub seed: Arc<dyn Seed>,
}

impl fmt::Debug for SeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedUnit")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl SeedUnit {
    /// Creates a seed unit.
    #[must_use]
    pub fn new(name: impl Into<String>, seed: impl Seed + 'static) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            seed: Arc::new(seed),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Returns the namespaced name dependencies refer to.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}::{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// What a migration or seed body sees while it runs.
///
/// Each execution gets a fresh context; tables obtained from it start with
/// no pending state.
pub struct MigrationContext<'a> {
    adapter: &'a dyn Adapter,
    environment: &'a str,
    direction: Direction,
}

impl<'a> MigrationContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(adapter: &'a dyn Adapter, environment: &'a str, direction: Direction) -> Self {
        Self {
            adapter,
            environment,
            direction,
        }
    }

    /// Returns the adapter, possibly decorated.
    #[must_use]
    pub fn adapter(&self) -> &'a dyn Adapter {
        self.adapter
    }

    /// Returns the environment name.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.environment
    }

    /// Returns the run direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true while applying.
    #[must_use]
    pub fn is_migrating_up(&self) -> bool {
        self.direction == Direction::Up
    }

    /// Returns a table handle with default options.
    #[must_use]
    pub fn table(&self, name: &str) -> Table<'a> {
        Table::new(TableRef::new(name), self.adapter)
    }

    /// Returns a table handle with explicit options.
    #[must_use]
    pub fn table_with_options(&self, name: &str, options: TableOptions) -> Table<'a> {
        Table::new(TableRef::with_options(name, options), self.adapter)
    }

    /// Checks if a table exists.
    pub async fn has_table(&self, name: &str) -> Result<bool> {
        self.adapter.has_table(name).await
    }

    /// Executes raw SQL, returning the affected row count.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        self.adapter.execute(sql).await
    }

    /// Inserts rows into a table immediately.
    pub async fn insert<I>(&self, table: &str, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Row> + Send,
    {
        let mut handle = self.table(table);
        handle.insert_rows(rows);
        handle.save().await
    }
}
