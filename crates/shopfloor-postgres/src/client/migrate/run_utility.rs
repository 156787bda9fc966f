use diesel::migration::MigrationSource;
use diesel::pg::Pg;
use diesel::sql_query;
use diesel::sql_types::{Array, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::{debug, info, instrument, warn};

use super::MigrationStatus;
use crate::{MIGRATIONS, PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Tables the embedded migrations create.
const EXPECTED_TABLES: &[&str] = &[
    "users",
    "organizations",
    "memberships",
    "invites",
    "stages",
    "vehicles",
    "tasks",
    "task_progress",
    "sessions",
];

/// Versions of the migrations compiled into this build.
pub fn embedded_migration_versions() -> PgResult<Vec<String>> {
    let migrations = MigrationSource::<Pg>::migrations(&MIGRATIONS).map_err(PgError::Migration)?;
    let mut versions: Vec<String> = migrations
        .iter()
        .map(|migration| migration.name().version().to_string())
        .collect();
    versions.sort();
    Ok(versions)
}

/// Compares the applied migrations with the embedded ones.
///
/// A database that was never migrated reports every migration as pending.
#[instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn get_migration_status(conn: &mut AsyncPgConnection) -> PgResult<MigrationStatus> {
    let embedded = embedded_migration_versions()?;
    let recorded = if migration_table_exists(conn).await? {
        get_applied_migrations(conn).await?
    } else {
        Vec::new()
    };

    let status = MigrationStatus::compare(&embedded, &recorded);

    debug!(
        target: TRACING_TARGET_MIGRATION,
        applied = status.applied_versions.len(),
        pending = status.pending_versions.len(),
        unknown = status.unknown_versions.len(),
        "Migration status retrieved"
    );

    Ok(status)
}

/// Checks that the database is migrated and every model table exists.
#[instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn verify_schema_integrity(conn: &mut AsyncPgConnection) -> PgResult<()> {
    if !migration_table_exists(conn).await? {
        return Err(PgError::Migration(
            "__diesel_schema_migrations does not exist; run migrations first".into(),
        ));
    }

    let status = get_migration_status(conn).await?;
    if !status.is_up_to_date() {
        return Err(PgError::Migration(
            format!(
                "{} pending migrations, next is {}",
                status.pending_versions.len(),
                status.next_pending_version().unwrap_or_default()
            )
            .into(),
        ));
    }
    if !status.unknown_versions.is_empty() {
        warn!(
            target: TRACING_TARGET_MIGRATION,
            unknown = ?status.unknown_versions,
            "Database has migrations this build does not know"
        );
    }

    let missing = missing_tables(conn).await?;
    if !missing.is_empty() {
        return Err(PgError::Migration(
            format!("missing tables: {}", missing.join(", ")).into(),
        ));
    }

    info!(target: TRACING_TARGET_MIGRATION, "Schema integrity verified");
    Ok(())
}

/// Lists applied migration versions in ascending order.
#[instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub async fn get_applied_migrations(conn: &mut AsyncPgConnection) -> PgResult<Vec<String>> {
    #[derive(diesel::QueryableByName)]
    struct MigrationVersion {
        #[diesel(sql_type = Text)]
        version: String,
    }

    let rows: Vec<MigrationVersion> =
        sql_query("SELECT version FROM __diesel_schema_migrations ORDER BY version")
            .load(conn)
            .await?;

    Ok(rows.into_iter().map(|row| row.version).collect())
}

async fn migration_table_exists(conn: &mut AsyncPgConnection) -> PgResult<bool> {
    #[derive(diesel::QueryableByName)]
    struct Exists {
        #[diesel(sql_type = diesel::sql_types::Bool)]
        exists: bool,
    }

    let row: Exists = sql_query(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_name = '__diesel_schema_migrations'
        ) AS exists",
    )
    .get_result(conn)
    .await?;

    Ok(row.exists)
}

async fn missing_tables(conn: &mut AsyncPgConnection) -> PgResult<Vec<&'static str>> {
    #[derive(diesel::QueryableByName)]
    struct TableName {
        #[diesel(sql_type = Text)]
        table_name: String,
    }

    let expected: Vec<&str> = EXPECTED_TABLES.to_vec();
    let present: Vec<TableName> = sql_query(
        "SELECT table_name::text AS table_name FROM information_schema.tables
         WHERE table_schema = current_schema() AND table_name = ANY($1)",
    )
    .bind::<Array<Text>, _>(&expected)
    .load(conn)
    .await?;

    Ok(EXPECTED_TABLES
        .iter()
        .copied()
        .filter(|table| !present.iter().any(|row| row.table_name == *table))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_every_migration() {
        let versions = embedded_migration_versions().unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[0], "00000000000000");
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
