//! Migration entry points on [`PgClient`].

use std::future::Future;

use super::{
    MigrationResult, MigrationStatus, get_migration_status, run_pending_migrations,
    verify_schema_integrity,
};
use crate::{PgClient, PgResult};

/// Migration operations that check out their own connection.
pub trait PgClientMigrationExt {
    /// Applies every pending migration.
    fn run_pending_migrations(&self) -> impl Future<Output = PgResult<MigrationResult>> + Send;

    /// Compares applied and embedded migrations.
    fn get_migration_status(&self) -> impl Future<Output = PgResult<MigrationStatus>> + Send;

    /// Fails unless the schema is fully migrated and every table exists.
    fn verify_schema_integrity(&self) -> impl Future<Output = PgResult<()>> + Send;
}

impl PgClientMigrationExt for PgClient {
    async fn run_pending_migrations(&self) -> PgResult<MigrationResult> {
        run_pending_migrations(self).await
    }

    async fn get_migration_status(&self) -> PgResult<MigrationStatus> {
        let mut conn = self.get_pooled_connection().await?;
        get_migration_status(&mut conn).await
    }

    async fn verify_schema_integrity(&self) -> PgResult<()> {
        let mut conn = self.get_pooled_connection().await?;
        verify_schema_integrity(&mut conn).await
    }
}
