//! Embedded schema migrations.
//!
//! Migrations under `migrations/` are compiled into the crate. They are
//! applied through [`PgClientMigrationExt`] or the free functions below,
//! which take a client or a bare connection.

mod client_ext;
mod custom_hooks;
mod migrate_result;
mod run_migration;
mod run_utility;

pub use client_ext::PgClientMigrationExt;
pub use migrate_result::{MigrationResult, MigrationStatus};
pub use run_migration::run_pending_migrations;
pub use run_utility::{
    embedded_migration_versions, get_applied_migrations, get_migration_status,
    verify_schema_integrity,
};
