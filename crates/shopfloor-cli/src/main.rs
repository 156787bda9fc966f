#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod commands;
mod config;
mod telemetry;

use std::process;

use anyhow::Context;
use shopfloor_postgres::PgClient;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "shopfloor_cli::startup";
pub const TRACING_TARGET_COMMAND: &str = "shopfloor_cli::command";
pub const TRACING_TARGET_CONFIG: &str = "shopfloor_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_COMMAND,
            error = %format!("{error:#}"),
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    telemetry::init_tracing(&cli.logging).context("failed to initialize tracing")?;
    cli.log();

    cli.postgres
        .validate()
        .context("invalid database configuration")?;

    let client = PgClient::connect(cli.postgres.clone())
        .await
        .context("failed to connect to the database")?;

    commands::execute(&client, cli.command).await
}
