//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use strata_migrate::prelude::*;

pub const CREATE_USERS: i64 = 20_240_101_000_000;
pub const ADD_EMAIL_INDEX: i64 = 20_240_102_000_000;
pub const CREATE_POSTS: i64 = 20_240_103_000_000;

pub const ENV: &str = "test";

// ============================================================================
// Migrations
// ============================================================================

pub struct CreateUsers;

#[async_trait]
impl ReversibleMigration for CreateUsers {
    async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let mut users = ctx.table("users");
        users
            .add_column("name", ColumnType::String, ColumnOptions::new().limit(100))?
            .add_column("email", ColumnType::String, ColumnOptions::new().null(true))?;
        users.create().await
    }
}

pub struct AddEmailIndex;

#[async_trait]
impl ReversibleMigration for AddEmailIndex {
    async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let mut users = ctx.table("users");
        users.add_index(["email"], IndexOptions::new().unique());
        users.update().await
    }
}

pub struct CreatePosts;

#[async_trait]
impl Migration for CreatePosts {
    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let mut posts = ctx.table("posts");
        posts
            .add_column("user_id", ColumnType::Integer, ColumnOptions::new())?
            .add_column("title", ColumnType::String, ColumnOptions::new())?
            .add_foreign_key(
                ["user_id"],
                "users",
                ["id"],
                ForeignKeyOptions::new().on_delete(ForeignKeyAction::Cascade),
            );
        posts.create().await
    }

    async fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.table("posts").drop_table().save().await
    }
}

/// Counts how often each direction runs.
#[derive(Clone, Default)]
pub struct Counter {
    pub ups: Arc<AtomicUsize>,
    pub downs: Arc<AtomicUsize>,
}

impl Counter {
    pub fn ups(&self) -> usize {
        self.ups.load(Ordering::SeqCst)
    }

    pub fn downs(&self) -> usize {
        self.downs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Migration for Counter {
    async fn up(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn down(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates a table, then fails.
pub struct HalfDone;

#[async_trait]
impl Migration for HalfDone {
    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let mut tags = ctx.table("tags");
        tags.add_column("label", ColumnType::String, ColumnOptions::new())?;
        tags.create().await?;
        ctx.table("nonexistent").remove_column("label").update().await
    }

    async fn down(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// A change body that cannot be inverted.
pub struct DropEmail;

#[async_trait]
impl ReversibleMigration for DropEmail {
    async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.table("users").remove_column("email").update().await
    }
}

// ============================================================================
// Seeds
// ============================================================================

pub struct UserSeeder;

#[async_trait]
impl Seed for UserSeeder {
    async fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let rows = ["ada", "grace"].into_iter().map(|name| {
            Row::from([
                ("name".to_string(), json!(name)),
                ("email".to_string(), json!(format!("{name}@example.com"))),
            ])
        });
        ctx.insert("users", rows).await
    }
}

pub struct PostSeeder;

#[async_trait]
impl Seed for PostSeeder {
    fn dependencies(&self) -> Vec<String> {
        vec!["UserSeeder".to_string()]
    }

    async fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let row = Row::from([
            ("user_id".to_string(), json!(1)),
            ("title".to_string(), json!("Hello")),
        ]);
        ctx.insert("posts", [row]).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// The three blog migrations.
pub fn blog_registry() -> Registry {
    Registry::new()
        .migration(MigrationUnit::change(CREATE_USERS, "CreateUsers", CreateUsers))
        .migration(MigrationUnit::change(ADD_EMAIL_INDEX, "AddEmailIndex", AddEmailIndex))
        .migration(MigrationUnit::up_down(CREATE_POSTS, "CreatePosts", CreatePosts))
}

/// Blog migrations plus both seeds.
pub fn seeded_registry() -> Registry {
    blog_registry()
        .seed(SeedUnit::new("PostSeeder", PostSeeder))
        .and_then(|r| r.seed(SeedUnit::new("UserSeeder", UserSeeder)))
        .unwrap_or_else(|e| panic!("Failed to register seeds: {e}"))
}

/// A manager over in-memory state.
pub struct Harness {
    pub manager: Manager,
    pub adapter: Arc<MemoryAdapter>,
    pub sink: Arc<CollectingSink>,
}

impl Harness {
    pub fn new(source: impl MigrationSource + 'static) -> Self {
        Self::with_adapter(source, Arc::new(MemoryAdapter::new(AdapterOptions::new("memory"))))
    }

    /// Builds a second harness over the same state, e.g. with fewer units.
    pub fn with_adapter(source: impl MigrationSource + 'static, adapter: Arc<MemoryAdapter>) -> Self {
        let sink = Arc::new(CollectingSink::new());
        let base: Arc<dyn Adapter> = adapter.clone();
        let manager = Manager::new(Config::default(), source)
            .with_environment(Environment::with_adapter(ENV, base))
            .with_sink(sink.clone());
        Self {
            manager,
            adapter,
            sink,
        }
    }

    pub async fn migrate(&self, target: Option<i64>) -> Vec<i64> {
        self.manager
            .migrate(ENV, target, false)
            .await
            .unwrap_or_else(|e| panic!("Failed to migrate: {e}"))
    }

    pub async fn rollback(&self, target: RollbackTarget) -> Result<Vec<i64>> {
        self.manager
            .rollback(ENV, target, RollbackOptions::new())
            .await
    }

    pub async fn logged(&self) -> Vec<i64> {
        let env = self
            .manager
            .environment(ENV)
            .await
            .unwrap_or_else(|e| panic!("Failed to open environment: {e}"));
        env.versions()
            .await
            .unwrap_or_else(|e| panic!("Failed to read versions: {e}"))
    }

    /// Tables other than the schema table.
    pub async fn tables(&self) -> Vec<String> {
        self.adapter
            .table_names()
            .await
            .into_iter()
            .filter(|t| t != "strata_log")
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.sink.events()
    }
}
