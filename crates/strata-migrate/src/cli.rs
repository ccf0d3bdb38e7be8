//! Command-line interface.
//!
//! Units are compiled in, so a project builds its own binary around
//! [`run`] with its [`Registry`](crate::discovery::Registry):
//!
//! ```rust,ignore
//! let cli = Cli::parse();
//! let code = strata_migrate::cli::run(cli, registry()).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::discovery::MigrationSource;
use crate::error::Result;
use crate::events::TracingSink;
use crate::manager::{Manager, RollbackOptions, RollbackTarget};
use crate::status::{MigrationState, StatusReport};

/// Versioned schema migrations.
#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "STRATA_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Target environment (defaults to `default_database`).
    #[arg(short, long, env = "STRATA_ENVIRONMENT", global = true)]
    pub environment: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Migrate the database.
    Migrate {
        /// Version to migrate to.
        #[arg(short, long)]
        target: Option<i64>,

        /// Migrate to the newest version not later than this date.
        #[arg(short, long, value_parser = parse_date, conflicts_with = "target")]
        date: Option<NaiveDateTime>,

        /// Only record the migrations in the log.
        #[arg(long)]
        fake: bool,
    },

    /// Roll back applied migrations.
    Rollback {
        /// Version, migration name, `all` or `0`.
        #[arg(short, long)]
        target: Option<String>,

        /// Revert everything applied after this date.
        #[arg(short, long, value_parser = parse_date, conflicts_with = "target")]
        date: Option<NaiveDateTime>,

        /// Ignore breakpoints.
        #[arg(short, long)]
        force: bool,

        /// Only remove the migrations from the log.
        #[arg(long)]
        fake: bool,
    },

    /// Show migration status.
    Status {
        /// Output format.
        #[arg(long, value_enum, default_value_t = StatusFormat::Text)]
        format: StatusFormat,
    },

    /// Toggle or clear rollback breakpoints.
    Breakpoint {
        /// Version to toggle (defaults to the last applied).
        #[arg(short, long)]
        target: Option<i64>,

        /// Clear every breakpoint.
        #[arg(short, long, conflicts_with = "target")]
        remove_all: bool,
    },

    /// Run seeders.
    #[command(name = "seed:run")]
    SeedRun {
        /// Seeds to run, comma separated (all if not specified).
        #[arg(short, long, value_delimiter = ',')]
        seed: Vec<String>,
    },
}

/// Status output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFormat {
    /// Human-readable table.
    Text,
    /// JSON summary.
    Json,
}

/// Accepts `YYYY[MM[DD[HH[MM[SS]]]]]` or `YYYY-MM-DD[ HH:MM:SS]`.
pub fn parse_date(value: &str) -> std::result::Result<NaiveDateTime, String> {
    const FILL: &str = "20000101000000";

    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    let valid_length = matches!(digits.len(), 4 | 6 | 8 | 10 | 12 | 14);
    let only_separators = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | ' ' | ':' | 'T'));
    if !valid_length || !only_separators {
        return Err(format!("invalid date \"{value}\""));
    }

    let padded = format!("{digits}{}", &FILL[digits.len()..]);
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .map_err(|e| format!("invalid date \"{value}\": {e}"))
}

/// Runs a parsed command line against a unit source.
///
/// Returns the process exit code. Clean stops (unresolved rollback
/// targets, breakpoints) are returned as errors for the caller to report.
pub async fn run(cli: Cli, source: impl MigrationSource + 'static) -> Result<u8> {
    let config = Config::from_file(&cli.config)?;
    let environment = match cli.environment {
        Some(environment) => environment,
        None => config.default_environment()?.to_string(),
    };
    info!(config = %cli.config.display(), environment = %environment, "Using environment");

    let manager = Manager::new(config, source).with_sink(Arc::new(TracingSink));

    match cli.command {
        Command::Migrate { target, date, fake } => {
            match date {
                Some(date) => manager.migrate_to_date_time(&environment, date, fake).await?,
                None => manager.migrate(&environment, target, fake).await?,
            };
            Ok(0)
        }

        Command::Rollback {
            target,
            date,
            force,
            fake,
        } => {
            let target = match (date, target) {
                (Some(date), _) => RollbackTarget::Date(date),
                (None, Some(target)) => RollbackTarget::parse(&target),
                (None, None) => RollbackTarget::Latest,
            };
            let options = RollbackOptions::new().force(force).fake(fake);
            manager.rollback(&environment, target, options).await?;
            Ok(0)
        }

        Command::Status { format } => {
            let report = manager.status(&environment).await?;
            match format {
                StatusFormat::Text => print!("{}", render_status(&report)),
                StatusFormat::Json => println!("{}", report.to_json()),
            }
            Ok(report.exit_code())
        }

        Command::Breakpoint { target, remove_all } => {
            if remove_all {
                manager.remove_breakpoints(&environment).await?;
            } else {
                manager.toggle_breakpoint(&environment, target).await?;
            }
            Ok(0)
        }

        Command::SeedRun { seed } => {
            if seed.is_empty() {
                manager.seed(&environment, None).await?;
            } else {
                for name in &seed {
                    manager.seed(&environment, Some(name)).await?;
                }
            }
            Ok(0)
        }
    }
}

/// Formats a status report as a text table.
#[must_use]
pub fn render_status(report: &StatusReport) -> String {
    if report.entries.is_empty() {
        return "\nThere are no available migrations.\n\n".to_string();
    }

    let mut out = String::from("\n Status  Migration ID    Started              Finished             Migration Name\n");
    out.push_str(&format!("{:-<100}\n", ""));
    for entry in &report.entries {
        let status = match entry.state {
            MigrationState::Up => "up",
            MigrationState::Down => "down",
            MigrationState::Missing => "missing",
        };
        let time = |t: Option<NaiveDateTime>| {
            t.map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        };
        let name = entry.name.as_deref().unwrap_or("");
        let suffix = if entry.state == MigrationState::Missing {
            "  ** MISSING **"
        } else {
            ""
        };
        out.push_str(&format!(
            "{status:>8} {:>14}  {:<19}  {:<19}  {name}{suffix}\n",
            entry.version,
            time(entry.start_time),
            time(entry.end_time),
        ));
        if entry.breakpoint {
            out.push_str("         BREAKPOINT SET\n");
        }
    }
    out.push('\n');
    out
}
