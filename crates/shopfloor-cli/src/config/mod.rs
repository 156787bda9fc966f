//! Command-line configuration.
//!
//! ```text
//! Cli
//! ├── postgres: PgConfig     # POSTGRES_URL and pool settings
//! ├── logging: LoggingConfig # --log-format
//! └── command: Command       # migrate | status | verify | purge
//! ```
//!
//! Every option can also be given through its environment variable.

mod logging;

use std::process;

use clap::Parser;
pub use logging::{LogFormat, LoggingConfig};
use shopfloor_postgres::PgConfig;

use crate::commands::Command;
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Maintains the shopfloor database.
#[derive(Debug, Clone, Parser)]
#[command(name = "shopfloor")]
#[command(about = "Shopfloor database maintenance")]
#[command(version)]
pub struct Cli {
    /// Database connection and pool settings.
    #[clap(flatten)]
    pub postgres: PgConfig,

    /// Log output settings.
    #[clap(flatten)]
    pub logging: LoggingConfig,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads `.env` (when enabled) and parses the command line.
    ///
    /// The `.env` file is read first so clap's `env` fallbacks can see it.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Logs build information and the configuration, without secrets.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            dotenv = cfg!(feature = "dotenv"),
            "Build information"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            command = self.command.name(),
            database_url = %self.postgres.database_url_masked(),
            postgres_max_connections = self.postgres.postgres_max_connections,
            postgres_connection_timeout_secs = ?self.postgres.postgres_connection_timeout_secs,
            postgres_idle_timeout_secs = ?self.postgres.postgres_idle_timeout_secs,
            "Database configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_url_and_subcommand() {
        let cli = Cli::try_parse_from([
            "shopfloor",
            "--postgres-url",
            "postgres://localhost/floor",
            "--log-format",
            "json",
            "purge",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.postgres.postgres_url, "postgres://localhost/floor");
        assert_eq!(cli.logging.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Purge(ref args) if args.dry_run));
    }

    #[test]
    fn subcommand_is_required() {
        let result = Cli::try_parse_from(["shopfloor", "--postgres-url", "postgres://localhost/floor"]);
        assert!(result.is_err());
    }
}
