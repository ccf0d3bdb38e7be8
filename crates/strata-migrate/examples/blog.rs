//! Example: a project binary for a blog schema.
//!
//! Migrations are compiled in and registered under the file names they
//! would have on disk, so versions and names come from
//! `YYYYMMDDHHMMSS_snake_case` stems.
//!
//! Run with:
//!
//! ```bash
//! echo '{"environments": {"default_database": "dev", "dev": {"adapter": "sqlite", "name": "blog.db"}}}' > strata.json
//! cargo run --example blog -p strata-migrate -- migrate
//! cargo run --example blog -p strata-migrate -- seed:run
//! cargo run --example blog -p strata-migrate -- status
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use strata_migrate::cli::{self, Cli};
use strata_migrate::prelude::*;

// =============================================================================
// Migrations
// =============================================================================

struct CreateUsers;

#[async_trait]
impl ReversibleMigration for CreateUsers {
    async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let mut users = ctx.table("users");
        users
            .add_column("username", ColumnType::String, ColumnOptions::new().limit(100))?
            .add_column("email", ColumnType::String, ColumnOptions::new().limit(255))?
            .add_column(
                "is_active",
                ColumnType::Boolean,
                ColumnOptions::new().default(DefaultValue::Bool(true)),
            )?
            .add_timestamps(None, None)?
            .add_index(["username"], IndexOptions::new().unique());
        users.create().await
    }
}

struct CreatePosts;

#[async_trait]
impl ReversibleMigration for CreatePosts {
    async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let mut posts = ctx.table("posts");
        posts
            .add_column("user_id", ColumnType::Integer, ColumnOptions::new())?
            .add_column("title", ColumnType::String, ColumnOptions::new())?
            .add_column("body", ColumnType::Text, ColumnOptions::new().null(true))?
            .add_timestamps(None, None)?
            .add_foreign_key(
                ["user_id"],
                "users",
                ["id"],
                ForeignKeyOptions::new().on_delete(ForeignKeyAction::Cascade),
            );
        posts.create().await
    }
}

/// Data changes have no automatic inverse, so this one spells out both ways.
struct BackfillUsernames;

#[async_trait]
impl Migration for BackfillUsernames {
    async fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.execute("UPDATE users SET username = lower(username)").await?;
        Ok(())
    }

    async fn down(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Seeds
// =============================================================================

struct UserSeeder;

#[async_trait]
impl Seed for UserSeeder {
    async fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let row = Row::from([
            ("username".to_string(), json!("admin")),
            ("email".to_string(), json!("admin@example.com")),
        ]);
        ctx.insert("users", [row]).await
    }
}

struct PostSeeder;

#[async_trait]
impl Seed for PostSeeder {
    fn dependencies(&self) -> Vec<String> {
        vec!["UserSeeder".to_string()]
    }

    async fn run(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let row = Row::from([
            ("user_id".to_string(), json!(1)),
            ("title".to_string(), json!("Hello, world")),
        ]);
        ctx.insert("posts", [row]).await
    }
}

fn registry() -> Result<Registry> {
    Registry::new()
        .migration_file(
            "db/migrations/20240101120000_create_users.rs",
            MigrationBody::Change(Arc::new(CreateUsers)),
        )?
        .migration_file(
            "db/migrations/20240102090000_create_posts.rs",
            MigrationBody::Change(Arc::new(CreatePosts)),
        )?
        .migration_file(
            "db/migrations/20240215083000_backfill_usernames.rs",
            MigrationBody::UpDown(Arc::new(BackfillUsernames)),
        )?
        .seed(SeedUnit::new("UserSeeder", UserSeeder))?
        .seed(SeedUnit::new("PostSeeder", PostSeeder))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli::run(cli, registry()?).await {
        Ok(code) => Ok(ExitCode::from(code)),
        Err(err) if err.is_clean_stop() => {
            warn!("{err}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Err(err.into()),
    }
}
