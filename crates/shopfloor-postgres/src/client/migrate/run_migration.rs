use std::ops::DerefMut;
use std::time::Instant;

use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_migrations::MigrationHarness;
use tokio::task::spawn_blocking;

use super::{MigrationResult, custom_hooks, get_migration_status};
use crate::{MIGRATIONS, PgClient, PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Applies every pending embedded migration.
///
/// Diesel's harness is synchronous, so the migrations run on a blocking
/// thread through [`AsyncConnectionWrapper`]. Calling this on an up to date
/// database is a no-op.
#[tracing::instrument(skip(pg), target = TRACING_TARGET_MIGRATION)]
pub async fn run_pending_migrations(pg: &PgClient) -> PgResult<MigrationResult> {
    let start = Instant::now();
    let mut conn = pg.get_pooled_connection().await?;

    let status = get_migration_status(&mut conn).await?;
    if status.is_up_to_date() {
        tracing::info!(target: TRACING_TARGET_MIGRATION, "Schema is up to date");
        return Ok(MigrationResult::new(start.elapsed(), Vec::new()));
    }

    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        pending = status.pending_versions.len(),
        next = status.next_pending_version(),
        "Applying pending migrations"
    );

    custom_hooks::pre_migrate(&mut conn, &status).await?;

    let mut wrapper: AsyncConnectionWrapper<_> = conn.into();
    let (applied, mut wrapper) = spawn_blocking(move || {
        let applied = wrapper
            .run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.iter().map(ToString::to_string).collect::<Vec<_>>());
        (applied, wrapper)
    })
    .await
    .map_err(|e| PgError::Migration(e.into()))?;

    let versions = applied.map_err(|e| {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            error = %e,
            elapsed = ?start.elapsed(),
            "Migration failed"
        );
        PgError::Migration(e)
    })?;

    custom_hooks::post_migrate(wrapper.deref_mut(), &versions).await?;

    let result = MigrationResult::new(start.elapsed(), versions);
    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        applied = result.processed_versions.len(),
        duration = ?result.duration,
        "Migrations applied"
    );

    Ok(result)
}
