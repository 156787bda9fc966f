use anyhow::Context;
use clap::Args;
use serde::Serialize;
use shopfloor_postgres::{MigrationStatus, PgClient, PgClientMigrationExt};

/// Options of `shopfloor status`.
#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    migrations: MigrationStatus,
    latency_ms: u128,
    pool_size: usize,
    pool_max_size: usize,
}

pub async fn run(client: &PgClient, args: &StatusArgs) -> anyhow::Result<()> {
    let latency = client.ping().await.context("database did not answer")?;
    let migrations = client
        .get_migration_status()
        .await
        .context("failed to read migration status")?;
    let pool = client.pool_status();

    let report = StatusReport {
        migrations,
        latency_ms: latency.as_millis(),
        pool_size: pool.size,
        pool_max_size: pool.max_size,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let migrations = &report.migrations;
    println!("Database     {}", client.config().database_url_masked());
    println!("Latency      {} ms", report.latency_ms);
    println!("Pool         {}/{}", report.pool_size, report.pool_max_size);
    println!(
        "Migrations   {}/{} applied ({:.0}%)",
        migrations.applied_versions.len(),
        migrations.total_migrations(),
        migrations.progress_ratio() * 100.0
    );
    if let Some(version) = migrations.last_applied_version() {
        println!("Latest       {version}");
    }
    for version in &migrations.pending_versions {
        println!("pending      {version}");
    }
    for version in &migrations.unknown_versions {
        println!("unknown      {version}");
    }

    Ok(())
}
