#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Embeds all migrations into the final binary.
pub(crate) const MIGRATIONS: diesel_migrations::EmbeddedMigrations =
    diesel_migrations::embed_migrations!("./migrations");

// Tracing target constants for consistent logging.

/// Tracing target for client-related operations.
///
/// Use this target for logging client initialization, configuration, and lifecycle events.
pub const TRACING_TARGET_CLIENT: &str = "shopfloor_postgres::client";

/// Tracing target for database query operations.
///
/// Use this target for logging query execution, results, and query-related errors.
pub const TRACING_TARGET_QUERY: &str = "shopfloor_postgres::queries";

/// Tracing target for database migration operations.
pub const TRACING_TARGET_MIGRATION: &str = "shopfloor_postgres::migrations";

/// Tracing target for database connection operations.
///
/// Use this target for logging connection establishment, pool management, and connection errors.
pub const TRACING_TARGET_CONNECTION: &str = "shopfloor_postgres::connection";

/// Tracing target for transaction scopes and batches.
pub const TRACING_TARGET_TRANSACTION: &str = "shopfloor_postgres::transactions";

mod client;
pub mod error;
pub mod model;
pub mod prelude;
pub mod query;
mod schema;
pub mod types;

pub use diesel_async::AsyncPgConnection as PgConnection;

pub use crate::client::{
    BatchOp, ConnectionPool, IsolationLevel, MigrationResult, MigrationStatus, PgClient,
    PgClientMigrationExt, PgConfig, PgConn, PgPoolStatus, PooledConnection, TransactionOptions,
    batch_op, embedded_migration_versions, get_applied_migrations, get_migration_status,
    run_pending_migrations, verify_schema_integrity,
};
pub use crate::error::{ErrorHint, PgError, PgResult};
