//! Deployment targets.
//!
//! An [`Environment`] binds one named target to its adapter. The adapter is
//! built on first use and decorated in a fixed order: base, timing, the
//! configured wrapper, then table prefixing when an affix is set. The
//! environment owns the transaction around each migration or seed.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, SubsecRound};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::adapter::{Adapter, AdapterFactory, AdapterOptions, ProxyAdapter};
use crate::error::Result;
use crate::history::{MigrationInfo, VersionLogEntry};
use crate::migration::{Direction, MigrationBody, MigrationContext, MigrationUnit, SeedUnit};

/// One named deployment target.
pub struct Environment {
    name: String,
    options: AdapterOptions,
    factory: AdapterFactory,
    base: Option<Arc<dyn Adapter>>,
    adapter: OnceCell<Arc<dyn Adapter>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("adapter", &self.options.adapter)
            .field("connected", &self.adapter.initialized())
            .finish()
    }
}

impl Environment {
    /// Creates an environment whose base adapter comes from the factory.
    #[must_use]
    pub fn new(name: impl Into<String>, options: AdapterOptions, factory: AdapterFactory) -> Self {
        Self {
            name: name.into(),
            options,
            factory,
            base: None,
            adapter: OnceCell::new(),
        }
    }

    /// Creates an environment around an existing base adapter.
    ///
    /// The decorator chain is still applied on first use.
    #[must_use]
    pub fn with_adapter(name: impl Into<String>, base: Arc<dyn Adapter>) -> Self {
        Self {
            name: name.into(),
            options: base.options().clone(),
            factory: AdapterFactory::default(),
            base: Some(base),
            adapter: OnceCell::new(),
        }
    }

    /// Returns the environment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resolved adapter options.
    #[must_use]
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Returns the decorated adapter, building it on first use.
    pub async fn adapter(&self) -> Result<Arc<dyn Adapter>> {
        self.adapter
            .get_or_try_init(|| self.build_adapter())
            .await
            .cloned()
    }

    async fn build_adapter(&self) -> Result<Arc<dyn Adapter>> {
        let base = match &self.base {
            Some(base) => base.clone(),
            None => self.factory.get_adapter(self.options.clone()).await?,
        };
        if !base.has_schema_table().await? {
            debug!(environment = %self.name, table = %self.options.schema_table, "Creating schema table");
            base.create_schema_table().await?;
        }

        let mut adapter = self.factory.get_wrapper("timed", base)?;
        if let Some(wrapper) = &self.options.wrapper {
            adapter = self.factory.get_wrapper(wrapper, adapter)?;
        }
        if self.options.has_table_affixes() {
            adapter = self.factory.get_wrapper("prefix", adapter)?;
        }
        debug!(environment = %self.name, adapter = %adapter.adapter_type(), "Adapter ready");
        Ok(adapter)
    }

    /// Returns the version log in the configured order.
    pub async fn version_log(&self) -> Result<Vec<VersionLogEntry>> {
        self.adapter().await?.get_version_log().await
    }

    /// Returns the applied versions in the configured order.
    pub async fn versions(&self) -> Result<Vec<i64>> {
        self.adapter().await?.get_versions().await
    }

    /// Returns the highest applied version, or 0.
    pub async fn current_version(&self) -> Result<i64> {
        Ok(self.versions().await?.into_iter().max().unwrap_or(0))
    }

    /// Runs one migration in the given direction and records it.
    ///
    /// In fake mode the body is skipped and only the log changes. The log
    /// is written after the transaction commits; a failing body rolls the
    /// transaction back and leaves the log untouched.
    pub async fn execute_migration(
        &self,
        unit: &MigrationUnit,
        direction: Direction,
        fake: bool,
    ) -> Result<()> {
        let adapter = self.adapter().await?;
        let start_time = now();

        if !fake {
            self.in_transaction(&adapter, self.run_body(&adapter, unit, direction))
                .await?;
        }

        adapter
            .migrated(
                &MigrationInfo::new(unit.version, &unit.name),
                direction,
                start_time,
                now(),
            )
            .await
    }

    /// Runs one seed inside a transaction.
    pub async fn execute_seed(&self, unit: &SeedUnit) -> Result<()> {
        let adapter = self.adapter().await?;
        let ctx = MigrationContext::new(adapter.as_ref(), &self.name, Direction::Up);
        self.in_transaction(&adapter, unit.seed.run(&ctx)).await
    }

    async fn run_body(
        &self,
        adapter: &Arc<dyn Adapter>,
        unit: &MigrationUnit,
        direction: Direction,
    ) -> Result<()> {
        let ctx = MigrationContext::new(adapter.as_ref(), &self.name, direction);
        match (&unit.body, direction) {
            (MigrationBody::UpDown(body), Direction::Up) => body.up(&ctx).await,
            (MigrationBody::UpDown(body), Direction::Down) => body.down(&ctx).await,
            (MigrationBody::Change(body), Direction::Up) => body.change(&ctx).await,
            (MigrationBody::Change(body), Direction::Down) => {
                let proxy = ProxyAdapter::new(adapter.clone());
                let recording = MigrationContext::new(&proxy, &self.name, Direction::Down);
                body.change(&recording).await?;
                proxy.execute_inverted().await
            }
        }
    }

    async fn in_transaction<F>(&self, adapter: &Arc<dyn Adapter>, work: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let transactional = adapter.has_transactions();
        if transactional {
            adapter.begin_transaction().await?;
        }

        if let Err(err) = work.await {
            if transactional {
                if let Err(rollback) = adapter.rollback_transaction().await {
                    warn!(environment = %self.name, error = %rollback, "Rollback failed");
                }
            }
            return Err(err);
        }

        if transactional {
            adapter.commit_transaction().await?;
        }
        Ok(())
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::error::MigrateError;
    use crate::migration::{Migration, ReversibleMigration};
    use crate::schema::{ColumnOptions, ColumnType};
    use async_trait::async_trait;

    struct CreatePosts;

    #[async_trait]
    impl ReversibleMigration for CreatePosts {
        async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
            let mut posts = ctx.table("posts");
            posts.add_column("title", ColumnType::String, ColumnOptions::new())?;
            posts.create().await
        }
    }

    struct Failing;

    #[async_trait]
    impl Migration for Failing {
        async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
            ctx.table("drafts").create().await?;
            Err(MigrateError::InvalidState("boom".to_string()))
        }

        async fn down(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn memory() -> Arc<MemoryAdapter> {
        Arc::new(MemoryAdapter::new(AdapterOptions::new("memory")))
    }

    #[tokio::test]
    async fn test_schema_table_is_created_on_first_use() {
        let base = memory();
        let env = Environment::with_adapter("test", base.clone());
        assert!(!base.has_schema_table().await.expect("query"));

        env.adapter().await.expect("adapter");
        assert!(base.has_schema_table().await.expect("query"));
        assert_eq!(env.current_version().await.expect("version"), 0);
    }

    #[tokio::test]
    async fn test_change_body_runs_both_ways() {
        let base = memory();
        let env = Environment::with_adapter("test", base.clone());
        let unit = MigrationUnit::change(20_240_101_000_000, "CreatePosts", CreatePosts);

        env.execute_migration(&unit, Direction::Up, false)
            .await
            .expect("up");
        assert!(base.has_table("posts").await.expect("query"));
        assert_eq!(env.versions().await.expect("log"), vec![20_240_101_000_000]);

        env.execute_migration(&unit, Direction::Down, false)
            .await
            .expect("down");
        assert!(!base.has_table("posts").await.expect("query"));
        assert!(env.versions().await.expect("log").is_empty());
    }

    #[tokio::test]
    async fn test_failed_body_rolls_back_without_logging() {
        let base = memory();
        let env = Environment::with_adapter("test", base.clone());
        let unit = MigrationUnit::up_down(1, "Failing", Failing);

        let err = env
            .execute_migration(&unit, Direction::Up, false)
            .await
            .expect_err("body fails");
        assert!(matches!(err, MigrateError::InvalidState(_)));
        assert!(!base.has_table("drafts").await.expect("query"));
        assert!(env.versions().await.expect("log").is_empty());
    }

    #[tokio::test]
    async fn test_fake_run_only_logs() {
        let base = memory();
        let env = Environment::with_adapter("test", base.clone());
        let unit = MigrationUnit::up_down(1, "Failing", Failing);

        env.execute_migration(&unit, Direction::Up, true)
            .await
            .expect("fake up");
        assert!(!base.has_table("drafts").await.expect("query"));
        assert_eq!(env.versions().await.expect("log"), vec![1]);

        env.execute_migration(&unit, Direction::Down, true)
            .await
            .expect("fake down");
        assert!(env.versions().await.expect("log").is_empty());
    }

    #[tokio::test]
    async fn test_prefix_wrapper_applies_with_affixes() {
        let base = Arc::new(
            MemoryAdapter::new(AdapterOptions::new("memory").table_prefix("app_")),
        );
        let env = Environment::with_adapter("test", base.clone());
        let unit = MigrationUnit::change(1, "CreatePosts", CreatePosts);

        env.execute_migration(&unit, Direction::Up, false)
            .await
            .expect("up");
        assert!(base.has_table("app_posts").await.expect("query"));
        assert!(!base.has_table("posts").await.expect("query"));
    }

    #[tokio::test]
    async fn test_unknown_wrapper_fails() {
        let base = Arc::new(MemoryAdapter::new(AdapterOptions::new("memory").wrapper("audit")));
        let env = Environment::with_adapter("test", base);
        assert!(matches!(
            env.adapter().await,
            Err(MigrateError::UnknownWrapper(ref name)) if name == "audit"
        ));
    }
}
