//! Versioned schema migrations with reversible change bodies.
//!
//! `strata-migrate` tracks which timestamped migrations have been applied to
//! a database, works out what must run to reach a target version, and runs
//! each unit in a transaction while keeping an auditable version log:
//! - Migrations declare either explicit `up`/`down` bodies or a single
//!   `change` body that is inverted automatically on rollback
//! - Table changes are accumulated and planned before anything executes
//! - Rollbacks stop at breakpoints unless forced
//!
//! # Architecture
//!
//! - **Schema / Action** - Column, index and foreign key values, and the
//!   atomic changes built from them
//! - **Plan** - Orders and validates the actions queued on one table
//! - **Table** - Builder used by migration bodies
//! - **Adapter** - Backend capability trait (SQLite, in-memory) plus the
//!   timing, prefix and recording decorators
//! - **Environment** - One configured target and its decorated adapter
//! - **Manager** - Migrate, rollback, status, seeds and breakpoints
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::prelude::*;
//!
//! struct CreateUsers;
//!
//! #[async_trait]
//! impl ReversibleMigration for CreateUsers {
//!     async fn change(&self, ctx: &MigrationContext<'_>) -> Result<()> {
//!         let mut users = ctx.table("users");
//!         users
//!             .add_column("email", ColumnType::String, ColumnOptions::new().limit(255))?
//!             .add_index(["email"], IndexOptions::new().unique());
//!         users.create().await
//!     }
//! }
//!
//! let registry = Registry::new()
//!     .migration(MigrationUnit::change(20240101120000, "CreateUsers", CreateUsers));
//! let manager = Manager::new(Config::from_file("strata.json")?, registry);
//! manager.migrate("development", None, false).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply pending migrations
//! strata migrate
//!
//! # Show migration status (exit code 2 = missing, 3 = pending)
//! strata status --format json
//!
//! # Roll back to a named migration
//! strata rollback --target CreateUsers
//! ```

pub mod action;
pub mod adapter;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod events;
pub mod history;
pub mod manager;
pub mod migration;
pub mod plan;
pub mod schema;
pub mod status;
pub mod table;

/// Prelude for convenient imports.
pub mod prelude {
    pub use async_trait::async_trait;

    pub use crate::action::{Action, ActionKind};
    pub use crate::adapter::{Adapter, AdapterFactory, AdapterOptions, MemoryAdapter, SqliteAdapter};
    pub use crate::config::Config;
    pub use crate::discovery::{MigrationSource, Registry};
    pub use crate::environment::Environment;
    pub use crate::error::{MigrateError, Result};
    pub use crate::events::{CollectingSink, Event, EventSink, TracingSink};
    pub use crate::history::{VersionLogEntry, VersionOrder};
    pub use crate::manager::{Manager, RollbackOptions, RollbackTarget};
    pub use crate::migration::{
        Direction, Migration, MigrationBody, MigrationContext, MigrationUnit, ReversibleMigration,
        Seed, SeedUnit,
    };
    pub use crate::schema::{
        Column, ColumnOptions, ColumnType, DefaultValue, ForeignKeyAction, ForeignKeyOptions,
        IndexOptions, Row, TableOptions,
    };
    pub use crate::status::{MigrationState, StatusReport};
    pub use crate::table::Table;
}
