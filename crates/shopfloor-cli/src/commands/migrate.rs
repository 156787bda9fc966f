use anyhow::Context;
use shopfloor_postgres::{PgClient, PgClientMigrationExt};

use crate::TRACING_TARGET_COMMAND;

pub async fn run(client: &PgClient) -> anyhow::Result<()> {
    let result = client
        .run_pending_migrations()
        .await
        .context("failed to apply migrations")?;

    if result.is_no_op() {
        println!("Schema is up to date");
        return Ok(());
    }

    for version in &result.processed_versions {
        println!("applied {version}");
    }
    println!(
        "Applied {} migrations in {:.2?}",
        result.processed_versions.len(),
        result.duration
    );

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        latest = result.last_processed_version(),
        "Migrate finished"
    );
    Ok(())
}
