use anyhow::Context;
use shopfloor_postgres::{PgClient, PgClientMigrationExt};

pub async fn run(client: &PgClient) -> anyhow::Result<()> {
    client
        .verify_schema_integrity()
        .await
        .context("schema verification failed")?;

    println!("Schema OK");
    Ok(())
}
