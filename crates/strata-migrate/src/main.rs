//! strata CLI
//!
//! The stock binary has no compiled-in migrations. It inspects and manages
//! the version log (status, breakpoints, fake runs); projects embed
//! [`strata_migrate::cli::run`] with their own registry to apply changes.

use std::process::ExitCode;

use clap::Parser;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use strata_migrate::cli::{self, Cli};
use strata_migrate::discovery::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli::run(cli, Registry::new()).await {
        Ok(code) => Ok(ExitCode::from(code)),
        Err(err) if err.is_clean_stop() => {
            warn!("{err}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Err(err.into()),
    }
}
