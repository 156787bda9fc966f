//! Hooks around [`run_pending_migrations`](super::run_pending_migrations).

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::PoolableConnection;

use super::MigrationStatus;
use crate::{PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Runs before any migration is applied.
///
/// Refuses to migrate on a broken connection or when the database carries
/// migrations this build does not embed.
pub async fn pre_migrate(conn: &mut AsyncPgConnection, status: &MigrationStatus) -> PgResult<()> {
    if conn.is_broken() {
        return Err(PgError::Migration(
            "connection is broken before migrating".into(),
        ));
    }

    if !status.unknown_versions.is_empty() {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            unknown = ?status.unknown_versions,
            "Database was migrated by a newer build"
        );
        return Err(PgError::Migration(
            format!(
                "database has unknown migrations: {}",
                status.unknown_versions.join(", ")
            )
            .into(),
        ));
    }

    tracing::debug!(
        target: TRACING_TARGET_MIGRATION,
        hook = "pre_migrate",
        from = status.last_applied_version(),
        "Migration preconditions hold"
    );
    Ok(())
}

/// Runs after the pending migrations were applied.
pub async fn post_migrate(conn: &mut AsyncPgConnection, applied: &[String]) -> PgResult<()> {
    if conn.is_broken() {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            hook = "post_migrate",
            "Connection is broken after migrating"
        );
    }

    tracing::debug!(
        target: TRACING_TARGET_MIGRATION,
        hook = "post_migrate",
        to = applied.last().map(String::as_str),
        "Migration hooks finished"
    );
    Ok(())
}
