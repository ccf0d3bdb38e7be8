//! Orchestration.
//!
//! The [`Manager`] ties discovery, configuration and environments together:
//! it decides which migrations run in which direction, walks the version
//! log for rollbacks, enforces breakpoints and orders seeds.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapter::AdapterFactory;
use crate::config::Config;
use crate::discovery::{index_migrations, index_seeds, MigrationSource};
use crate::environment::Environment;
use crate::error::{MigrateError, Result};
use crate::events::{Event, EventSink, TracingSink};
use crate::history::VersionOrder;
use crate::migration::{Direction, MigrationUnit, SeedUnit};
use crate::status::StatusReport;

/// Where a rollback should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Revert the most recently applied migration.
    Latest,
    /// Revert everything.
    All,
    /// Stop at this version, leaving it applied.
    Version(i64),
    /// Stop at the logged migration with this name.
    Name(String),
    /// Revert everything applied after this moment.
    Date(NaiveDateTime),
}

impl RollbackTarget {
    /// Interprets a command-line target: `all`/`0`, a version, or a name.
    #[must_use]
    pub fn parse(target: &str) -> Self {
        match target {
            "all" | "0" => Self::All,
            _ => target
                .parse::<i64>()
                .map_or_else(|_| Self::Name(target.to_string()), Self::Version),
        }
    }
}

/// Flags for [`Manager::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Ignore breakpoints.
    pub force: bool,
    /// Require the target to be a discovered version.
    pub target_must_match_version: bool,
    /// Only update the log.
    pub fake: bool,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            force: false,
            target_must_match_version: true,
            fake: false,
        }
    }
}

impl RollbackOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignores breakpoints.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets whether the target must be a discovered version.
    #[must_use]
    pub fn target_must_match_version(mut self, must_match: bool) -> Self {
        self.target_must_match_version = must_match;
        self
    }

    /// Only updates the log.
    #[must_use]
    pub fn fake(mut self, fake: bool) -> Self {
        self.fake = fake;
        self
    }
}

/// Entry point for every migration command.
pub struct Manager {
    config: Config,
    source: Arc<dyn MigrationSource>,
    factory: AdapterFactory,
    sink: Arc<dyn EventSink>,
    environments: Mutex<BTreeMap<String, Arc<Environment>>>,
}

impl Manager {
    /// Creates a manager over a configuration and a unit source.
    #[must_use]
    pub fn new(config: Config, source: impl MigrationSource + 'static) -> Self {
        Self {
            config,
            source: Arc::new(source),
            factory: AdapterFactory::default(),
            sink: Arc::new(TracingSink),
            environments: Mutex::new(BTreeMap::new()),
        }
    }

    /// Replaces the adapter factory.
    #[must_use]
    pub fn with_factory(mut self, factory: AdapterFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers a prebuilt environment, bypassing configuration.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments
            .get_mut()
            .insert(environment.name().to_string(), Arc::new(environment));
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the environment, creating it from configuration on first use.
    pub async fn environment(&self, name: &str) -> Result<Arc<Environment>> {
        let mut environments = self.environments.lock().await;
        if let Some(env) = environments.get(name) {
            return Ok(env.clone());
        }
        let options = self.config.environment_options(name)?;
        let env = Arc::new(Environment::new(name, options, self.factory.clone()));
        environments.insert(name.to_string(), env.clone());
        Ok(env)
    }

    /// Returns the discovered migrations keyed by version.
    ///
    /// Units without a namespace pick one up from the configured
    /// namespace of their directory.
    pub fn migrations(&self) -> Result<BTreeMap<i64, MigrationUnit>> {
        let units = self
            .source
            .migrations()?
            .into_iter()
            .map(|mut unit| {
                if unit.namespace.is_none() {
                    unit.namespace = unit
                        .path
                        .as_deref()
                        .and_then(|p| p.parent())
                        .and_then(|dir| self.config.migration_namespace_by_path(dir))
                        .map(str::to_string);
                }
                unit
            })
            .collect();
        index_migrations(units)
    }

    /// Returns the discovered seeds in dependency order.
    pub fn seeds(&self) -> Result<Vec<SeedUnit>> {
        let seeds = index_seeds(self.source.seeds()?)?;
        Ok(order_seeds(&seeds)?.into_iter().cloned().collect())
    }

    /// Migrates to `version`, or to the newest known version.
    ///
    /// Returns the versions executed, in order. A version that is neither
    /// 0 nor discovered is reported and nothing runs.
    pub async fn migrate(&self, environment: &str, version: Option<i64>, fake: bool) -> Result<Vec<i64>> {
        let migrations = self.migrations()?;
        let env = self.environment(environment).await?;
        let applied: HashSet<i64> = env.versions().await?.into_iter().collect();
        let current = applied.iter().copied().max().unwrap_or(0);

        if applied.is_empty() && migrations.is_empty() {
            return Ok(Vec::new());
        }

        let target = match version {
            None => applied
                .iter()
                .chain(migrations.keys())
                .copied()
                .max()
                .unwrap_or(0),
            Some(v) if v != 0 && !migrations.contains_key(&v) => {
                self.sink.emit(&Event::InvalidVersion { version: v });
                return Ok(Vec::new());
            }
            Some(v) => v,
        };
        debug!(environment, current, target, "Resolved migration target");

        let mut executed = Vec::new();
        if target <= current {
            for unit in migrations.values().rev() {
                if unit.version <= target {
                    break;
                }
                if applied.contains(&unit.version) {
                    self.execute_migration(&env, unit, Direction::Down, fake).await?;
                    executed.push(unit.version);
                }
            }
        }

        for unit in migrations.values() {
            if unit.version > target {
                break;
            }
            if !applied.contains(&unit.version) {
                self.execute_migration(&env, unit, Direction::Up, fake).await?;
                executed.push(unit.version);
            }
        }
        Ok(executed)
    }

    /// Migrates to the newest discovered version not later than `date_time`.
    pub async fn migrate_to_date_time(
        &self,
        environment: &str,
        date_time: NaiveDateTime,
        fake: bool,
    ) -> Result<Vec<i64>> {
        let limit = date_to_version(date_time);
        let target = self
            .migrations()?
            .keys()
            .copied()
            .filter(|&v| v <= limit)
            .max();

        match target {
            Some(version) => {
                self.sink.emit(&Event::TargetResolved { version });
                self.migrate(environment, Some(version), fake).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Reverts applied migrations down to a target.
    ///
    /// Log entries with no discovered migration are ignored. Returns the
    /// versions reverted, newest first.
    ///
    /// # Errors
    ///
    /// `TargetNotFound` when a name or required version cannot be
    /// resolved, `BreakpointBlocked` when an unforced rollback reaches a
    /// breakpoint. Both leave everything after the stop point untouched.
    pub async fn rollback(
        &self,
        environment: &str,
        target: RollbackTarget,
        options: RollbackOptions,
    ) -> Result<Vec<i64>> {
        let migrations = self.migrations()?;
        let env = self.environment(environment).await?;
        let order = env.options().version_order;
        let executed: Vec<_> = env
            .version_log()
            .await?
            .into_iter()
            .filter(|e| migrations.contains_key(&e.version))
            .collect();

        let must_match = options.target_must_match_version && !matches!(target, RollbackTarget::Date(_));
        let resolved = match &target {
            RollbackTarget::Latest => None,
            RollbackTarget::All => Some(0),
            RollbackTarget::Version(v) => Some(*v),
            RollbackTarget::Date(date_time) => Some(date_to_version(*date_time)),
            RollbackTarget::Name(name) => Some(
                executed
                    .iter()
                    .find(|e| e.migration_name.as_deref() == Some(name.as_str()))
                    .map(|e| e.version)
                    .ok_or_else(|| {
                        MigrateError::TargetNotFound(format!("No migration found with name ({name})"))
                    })?,
            ),
        };

        let Some(last) = executed.last() else {
            self.sink.emit(&Event::NothingToRollback);
            return Ok(Vec::new());
        };
        if resolved == Some(last.version) {
            self.sink.emit(&Event::NothingToRollback);
            return Ok(Vec::new());
        }

        let target = resolved.unwrap_or_else(|| {
            executed
                .len()
                .checked_sub(2)
                .map_or(0, |prev| executed[prev].version)
        });
        if must_match && target != 0 && !migrations.contains_key(&target) {
            return Err(MigrateError::TargetNotFound(format!(
                "Target version ({target}) not found"
            )));
        }
        debug!(environment, target, must_match, "Resolved rollback target");

        let mut reverted = Vec::new();
        for entry in executed.iter().rev() {
            let reached = if must_match {
                entry.version == target
                    || (order == VersionOrder::Creation && entry.version < target)
            } else {
                let position = match order {
                    VersionOrder::Creation => entry.version,
                    VersionOrder::Execution => entry.start_time_as_version(),
                };
                position <= target
            };
            if reached {
                break;
            }
            if entry.breakpoint && !options.force {
                return Err(MigrateError::BreakpointBlocked {
                    version: entry.version,
                    reverted,
                });
            }
            if let Some(unit) = migrations.get(&entry.version) {
                self.execute_migration(&env, unit, Direction::Down, options.fake)
                    .await?;
                reverted.push(entry.version);
            }
        }

        if reverted.is_empty() {
            self.sink.emit(&Event::NothingToRollback);
        }
        Ok(reverted)
    }

    /// Cross-references discovered migrations with the version log.
    pub async fn status(&self, environment: &str) -> Result<StatusReport> {
        let migrations = self.migrations()?;
        let env = self.environment(environment).await?;
        let log = env.version_log().await?;
        Ok(StatusReport::build(&migrations, &log, env.options().version_order))
    }

    /// Runs one named seed, or every seed in dependency order.
    ///
    /// Returns the names of the seeds that ran.
    pub async fn seed(&self, environment: &str, name: Option<&str>) -> Result<Vec<String>> {
        let seeds = self.seeds()?;
        let selected: Vec<&SeedUnit> = match name {
            None => seeds.iter().collect(),
            Some(name) => vec![seeds
                .iter()
                .find(|s| s.qualified_name() == name || s.name == name)
                .ok_or_else(|| MigrateError::SeedNotFound(name.to_string()))?],
        };

        let env = self.environment(environment).await?;
        let mut ran = Vec::with_capacity(selected.len());
        for seed in selected {
            self.sink.emit(&Event::SeedStarted {
                name: seed.name.clone(),
            });
            let start = Instant::now();
            env.execute_seed(seed).await?;
            self.sink.emit(&Event::SeedFinished {
                name: seed.name.clone(),
                elapsed: start.elapsed(),
            });
            ran.push(seed.qualified_name());
        }
        Ok(ran)
    }

    /// Flips the breakpoint on `version`, or on the last log entry.
    ///
    /// Returns the new breakpoint state, or `None` when nothing changed.
    pub async fn toggle_breakpoint(&self, environment: &str, version: Option<i64>) -> Result<Option<bool>> {
        let migrations = self.migrations()?;
        let env = self.environment(environment).await?;
        let log = env.version_log().await?;

        let Some(last) = log.last() else {
            return Ok(None);
        };
        if migrations.is_empty() {
            return Ok(None);
        }

        let version = version.unwrap_or(last.version);
        let Some(unit) = migrations.get(&version) else {
            self.sink.emit(&Event::InvalidVersion { version });
            return Ok(None);
        };

        env.adapter().await?.toggle_breakpoint(version).await?;
        let set = env
            .version_log()
            .await?
            .iter()
            .find(|e| e.version == version)
            .is_some_and(|e| e.breakpoint);
        self.sink.emit(&Event::BreakpointToggled {
            version,
            name: unit.name.clone(),
            set,
        });
        Ok(Some(set))
    }

    /// Clears every breakpoint, returning how many were set.
    pub async fn remove_breakpoints(&self, environment: &str) -> Result<u64> {
        let env = self.environment(environment).await?;
        let count = env.adapter().await?.reset_all_breakpoints().await?;
        self.sink.emit(&Event::BreakpointsCleared { count });
        Ok(count)
    }

    async fn execute_migration(
        &self,
        env: &Environment,
        unit: &MigrationUnit,
        direction: Direction,
        fake: bool,
    ) -> Result<()> {
        self.sink.emit(&Event::MigrationStarted {
            version: unit.version,
            name: unit.name.clone(),
            direction,
        });
        let start = Instant::now();
        env.execute_migration(unit, direction, fake).await?;
        self.sink.emit(&Event::MigrationFinished {
            version: unit.version,
            name: unit.name.clone(),
            direction,
            elapsed: start.elapsed(),
        });
        Ok(())
    }
}

fn date_to_version(date_time: NaiveDateTime) -> i64 {
    date_time
        .format("%Y%m%d%H%M%S")
        .to_string()
        .parse()
        .unwrap_or(0)
}

/// Orders seeds so every dependency runs before its dependents.
///
/// Independent seeds keep their discovery order.
///
/// # Errors
///
/// `MissingDependency` for an unknown dependency, `CircularDependency`
/// for a cycle.
pub fn order_seeds(seeds: &[SeedUnit]) -> Result<Vec<&SeedUnit>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        index: usize,
        seeds: &'a [SeedUnit],
        lookup: &HashMap<String, usize>,
        marks: &mut Vec<Option<Mark>>,
        ordered: &mut Vec<&'a SeedUnit>,
    ) -> Result<()> {
        match marks[index] {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(MigrateError::CircularDependency),
            None => {}
        }
        marks[index] = Some(Mark::Visiting);

        let seed = &seeds[index];
        for dependency in seed.seed.dependencies() {
            let dep = lookup
                .get(&dependency)
                .copied()
                .ok_or_else(|| MigrateError::MissingDependency {
                    seed: seed.name.clone(),
                    dependency: dependency.clone(),
                })?;
            visit(dep, seeds, lookup, marks, ordered)?;
        }

        marks[index] = Some(Mark::Done);
        ordered.push(seed);
        Ok(())
    }

    let mut lookup = HashMap::new();
    for (i, seed) in seeds.iter().enumerate() {
        lookup.entry(seed.name.clone()).or_insert(i);
        lookup.insert(seed.qualified_name(), i);
    }

    let mut marks = vec![None; seeds.len()];
    let mut ordered = Vec::with_capacity(seeds.len());
    for index in 0..seeds.len() {
        visit(index, seeds, &lookup, &mut marks, &mut ordered)?;
    }
    Ok(ordered)
}
