//! Pooled PostgreSQL client, transactions and migrations.

mod custom_hooks;
pub mod migrate;
mod pg_client;
mod pg_config;
mod transaction;

use deadpool::managed::{Object, Pool};
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
pub use migrate::{
    MigrationResult, MigrationStatus, PgClientMigrationExt, embedded_migration_versions,
    get_applied_migrations, get_migration_status, run_pending_migrations, verify_schema_integrity,
};
pub use pg_client::{PgClient, PgConn, PgPoolStatus};
pub use pg_config::PgConfig;
pub use transaction::{BatchOp, IsolationLevel, TransactionOptions, batch_op};

/// Connection pool shared by every [`PgClient`] clone.
pub type ConnectionPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Connection checked out of the [`ConnectionPool`].
pub type PooledConnection = Object<AsyncDieselConnectionManager<AsyncPgConnection>>;
