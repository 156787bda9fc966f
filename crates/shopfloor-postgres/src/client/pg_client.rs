use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool::managed::{Hook, Pool};
use derive_more::{Deref, DerefMut};
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::scoped_futures::ScopedBoxFuture;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::custom_hooks;
use crate::{
    ConnectionPool, PgConfig, PgError, PgResult, PooledConnection, TRACING_TARGET_CLIENT,
    TRACING_TARGET_CONNECTION,
};

/// Acquisitions slower than this are logged as warnings.
const SLOW_ACQUIRE: Duration = Duration::from_millis(100);

/// Snapshot of the connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgPoolStatus {
    /// Configured pool capacity.
    pub max_size: usize,
    /// Open connections, idle or checked out.
    pub size: usize,
    /// Idle connections ready to be handed out.
    pub available: usize,
    /// Callers queued for a connection.
    pub waiting: usize,
}

impl PgPoolStatus {
    /// Connections currently checked out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.available)
    }

    /// Share of the capacity checked out, from 0.0 to 1.0.
    #[inline]
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.in_use() as f64 / self.max_size as f64
        }
    }

    /// Whether callers are queueing or most connections are busy.
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.waiting > 0 || self.utilization() > 0.8
    }
}

/// Pooled database client.
///
/// Cheap to clone; clones share the pool. Use [`PgClient::get_connection`]
/// for repository calls and delegates, and [`PgClient::transaction`] for
/// atomic units of work.
#[derive(Clone)]
pub struct PgClient {
    inner: Arc<PgClientInner>,
}

struct PgClientInner {
    pool: ConnectionPool,
    config: PgConfig,
}

impl PgClient {
    /// Creates a client and its pool without opening a connection.
    ///
    /// Prefer [`PgConfig::build`], which validates the configuration first.
    #[tracing::instrument(
        skip(config),
        target = TRACING_TARGET_CLIENT,
        fields(database_url = %config.database_url_masked())
    )]
    pub fn new(config: PgConfig) -> PgResult<Self> {
        let mut manager_config = ManagerConfig::default();
        manager_config.custom_setup = Box::new(custom_hooks::setup_callback);
        let manager =
            AsyncDieselConnectionManager::new_with_config(&config.postgres_url, manager_config);

        let pool = Pool::builder(manager)
            .max_size(config.postgres_max_connections as usize)
            .wait_timeout(config.connection_timeout())
            .create_timeout(config.connection_timeout())
            .recycle_timeout(config.idle_timeout())
            .runtime(deadpool::Runtime::Tokio1)
            .post_create(Hook::sync_fn(custom_hooks::post_create))
            .pre_recycle(Hook::sync_fn(custom_hooks::pre_recycle))
            .post_recycle(Hook::sync_fn(custom_hooks::post_recycle))
            .build()
            .map_err(|e| PgError::Config(format!("invalid pool configuration: {e}")))?;

        tracing::info!(
            target: TRACING_TARGET_CLIENT,
            max_connections = config.postgres_max_connections,
            "Database client created"
        );

        Ok(Self {
            inner: Arc::new(PgClientInner { pool, config }),
        })
    }

    /// Validates `config`, creates the client and checks the database answers.
    #[tracing::instrument(
        skip(config),
        target = TRACING_TARGET_CLIENT,
        fields(database_url = %config.database_url_masked())
    )]
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        let this = config.build()?;
        let latency = this.ping().await?;

        tracing::info!(
            target: TRACING_TARGET_CLIENT,
            latency_ms = latency.as_millis(),
            "Database reachable"
        );

        Ok(this)
    }

    /// Runs `SELECT 1` and returns the round trip time.
    pub async fn ping(&self) -> PgResult<Duration> {
        #[derive(diesel::QueryableByName)]
        struct Ping {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            #[allow(dead_code)]
            one: i32,
        }

        let mut conn = self.get_pooled_connection().await?;
        let start = Instant::now();
        let _: Ping = diesel::sql_query("SELECT 1 AS one")
            .get_result(&mut *conn)
            .await
            .map_err(|e| {
                tracing::error!(target: TRACING_TARGET_CONNECTION, error = %e, "Ping failed");
                PgError::from(e)
            })?;

        Ok(start.elapsed())
    }

    /// Checks out a connection, waiting up to the configured timeout.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CONNECTION)]
    pub async fn get_connection(&self) -> PgResult<PgConn> {
        self.get_pooled_connection().await.map(PgConn::new)
    }

    pub(crate) async fn get_pooled_connection(&self) -> PgResult<PooledConnection> {
        let start = Instant::now();
        let conn = self.inner.pool.get().await.map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                error = %e,
                elapsed = ?start.elapsed(),
                "Failed to acquire connection from pool"
            );
            PgError::from(e)
        })?;

        let elapsed = start.elapsed();
        if elapsed > SLOW_ACQUIRE {
            tracing::warn!(
                target: TRACING_TARGET_CONNECTION,
                elapsed = ?elapsed,
                status = ?self.pool_status(),
                "Slow connection acquisition"
            );
        }

        Ok(conn)
    }

    /// Returns a snapshot of the pool.
    #[inline]
    pub fn pool_status(&self) -> PgPoolStatus {
        let status = self.inner.pool.status();
        PgPoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    /// Returns the configuration the client was built from.
    #[inline]
    pub fn config(&self) -> &PgConfig {
        &self.inner.config
    }
}

impl fmt::Debug for PgClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgClient")
            .field("config", &self.inner.config)
            .field("pool", &self.pool_status())
            .finish()
    }
}

/// A connection checked out of the pool.
///
/// Dereferences to [`PgConnection`], so every `XRepository` trait and
/// [`DelegateExt`] method is available on it. Dropping it returns the
/// connection to the pool.
///
/// ```ignore
/// let mut conn = client.get_connection().await?;
/// let vehicle = conn.find_vehicle_by_tracking_token(token).await?;
/// let open = conn.count_open_tasks(&vehicle_id).await?;
/// ```
///
/// [`PgConnection`]: crate::PgConnection
/// [`DelegateExt`]: crate::query::DelegateExt
#[derive(Deref, DerefMut)]
pub struct PgConn {
    #[deref]
    #[deref_mut]
    conn: PooledConnection,
}

impl PgConn {
    /// Wraps a pooled connection.
    pub fn new(conn: PooledConnection) -> Self {
        Self { conn }
    }

    /// Runs `f` in a transaction on this connection, without time budgets.
    pub async fn transaction<'a, T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: for<'r> FnOnce(&'r mut PooledConnection) -> ScopedBoxFuture<'a, 'r, Result<T, E>>
            + Send
            + 'a,
        T: Send + 'a,
        E: From<diesel::result::Error> + Send + 'a,
    {
        self.conn.transaction(f).await
    }
}

impl fmt::Debug for PgConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_status_pressure() {
        let idle = PgPoolStatus {
            max_size: 10,
            size: 4,
            available: 4,
            waiting: 0,
        };
        assert_eq!(idle.in_use(), 0);
        assert!(!idle.is_under_pressure());

        let busy = PgPoolStatus {
            available: 0,
            size: 9,
            ..idle
        };
        assert!((busy.utilization() - 0.9).abs() < f64::EPSILON);
        assert!(busy.is_under_pressure());

        let queued = PgPoolStatus { waiting: 1, ..idle };
        assert!(queued.is_under_pressure());
    }

    #[tokio::test]
    async fn pool_is_lazy() {
        let client = PgConfig::new("postgres://nobody@127.0.0.1:1/none")
            .build()
            .unwrap();
        let status = client.pool_status();
        assert_eq!(status.size, 0);
        assert_eq!(status.max_size, 10);
    }
}
