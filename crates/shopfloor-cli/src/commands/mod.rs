//! Subcommands of the `shopfloor` binary.

mod migrate;
mod purge;
mod status;
mod verify;

use clap::Subcommand;
use shopfloor_postgres::PgClient;

pub use self::purge::PurgeArgs;
pub use self::status::StatusArgs;
use crate::TRACING_TARGET_COMMAND;

/// Database maintenance operation.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Show applied and pending migrations and pool health
    Status(StatusArgs),
    /// Check that the schema is fully migrated
    Verify,
    /// Delete expired sessions and invites
    Purge(PurgeArgs),
}

impl Command {
    /// Subcommand name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
            Self::Status(_) => "status",
            Self::Verify => "verify",
            Self::Purge(_) => "purge",
        }
    }
}

/// Runs `command` against the database behind `client`.
pub async fn execute(client: &PgClient, command: Command) -> anyhow::Result<()> {
    tracing::debug!(target: TRACING_TARGET_COMMAND, command = command.name(), "Running command");

    match command {
        Command::Migrate => migrate::run(client).await,
        Command::Status(args) => status::run(client, &args).await,
        Command::Verify => verify::run(client).await,
        Command::Purge(args) => purge::run(client, &args).await,
    }
}
