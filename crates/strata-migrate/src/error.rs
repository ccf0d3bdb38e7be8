//! Error types for the migration system.

use std::path::PathBuf;

use crate::action::ActionKind;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Two discovered migrations share a version.
    #[error("Duplicate migration - \"{path}\" has the same version as \"{existing}\"")]
    DuplicateVersion {
        /// Version shared by both units.
        version: i64,
        /// Source of the unit that was rejected.
        path: String,
        /// Source of the unit registered first.
        existing: String,
    },

    /// Two discovered units share a (namespaced) name.
    #[error("Migration \"{name}\" has the same name as \"{existing}\"")]
    DuplicateName {
        /// Rejected name.
        name: String,
        /// Source of the unit registered first.
        existing: String,
    },

    /// A unit does not follow the naming convention.
    #[error("Malformed unit \"{name}\": {reason}")]
    MalformedUnit {
        /// File or class name that was rejected.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested environment is not configured.
    #[error("The environment \"{0}\" does not exist")]
    UnknownEnvironment(String),

    /// The environment names no adapter kind.
    #[error("No adapter was specified for environment: {0}")]
    MissingAdapter(String),

    /// No adapter is registered under the configured kind.
    #[error("Adapter \"{0}\" has not been registered")]
    UnknownAdapter(String),

    /// No wrapper is registered under the configured name.
    #[error("Wrapper \"{0}\" has not been registered")]
    UnknownWrapper(String),

    /// A DSN could not be parsed.
    #[error("Invalid DSN \"{0}\"")]
    InvalidDsn(String),

    /// Configuration is structurally wrong.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The adapter (or decorator chain) cannot perform an operation.
    #[error("Adapter \"{adapter}\" does not support {operation}")]
    AdapterCapability {
        /// Adapter type reporting the problem.
        adapter: String,
        /// Operation that was requested.
        operation: String,
    },

    /// A column type is not supported by the bound adapter.
    #[error("An invalid column type \"{column_type}\" was specified for column \"{column}\"")]
    InvalidColumnType {
        /// Column name.
        column: String,
        /// Requested type.
        column_type: String,
    },

    /// An action depends on something the batch does not provide.
    #[error("Cannot plan changes for table \"{table}\": {message}")]
    UnresolvedDependency {
        /// Table the plan was built for.
        table: String,
        /// What could not be resolved.
        message: String,
    },

    /// An action failed while an adapter executed a plan.
    #[error("{kind} on table \"{table}\" failed: {source}")]
    ActionFailed {
        /// Kind of the failing action.
        kind: ActionKind,
        /// Table the action was bound to.
        table: String,
        /// Underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// A `change` body recorded something that cannot be reverted.
    #[error("Cannot reverse a \"{0}\" command")]
    IrreversibleAction(String),

    /// A rollback target could not be resolved.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// A breakpoint stopped a rollback.
    #[error("Breakpoint reached at {version}. Further rollbacks inhibited.")]
    BreakpointBlocked {
        /// Version carrying the breakpoint.
        version: i64,
        /// Versions reverted before the breakpoint was hit.
        reverted: Vec<i64>,
    },

    /// A seed dependency cycle was found.
    #[error("Circular dependency detected in seeds")]
    CircularDependency,

    /// A seed depends on another that doesn't exist.
    #[error("Seed '{seed}' depends on '{dependency}' which doesn't exist")]
    MissingDependency {
        /// The seed with the missing dependency.
        seed: String,
        /// The dependency that's missing.
        dependency: String,
    },

    /// Seed not found.
    #[error("The seed class \"{0}\" does not exist")]
    SeedNotFound(String),

    /// Invalid migration state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read a configuration file.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Returns true for conditions that end a run without being a crash.
    ///
    /// Rollback target resolution failures and breakpoints are reported to
    /// the operator and leave the database untouched past the stop point.
    #[must_use]
    pub fn is_clean_stop(&self) -> bool {
        matches!(
            self,
            Self::TargetNotFound(_) | Self::BreakpointBlocked { .. }
        )
    }

    /// Wraps an adapter failure with the action it happened in.
    #[must_use]
    pub fn action_failed(kind: ActionKind, table: impl Into<String>, source: Self) -> Self {
        Self::ActionFailed {
            kind,
            table: table.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn unsupported(adapter: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::AdapterCapability {
            adapter: adapter.into(),
            operation: operation.into(),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
