//! Connection setup and [`deadpool`] lifecycle hooks.
//!
//! The hooks never reject a connection; they only report its health.
//! `AsyncDieselConnectionManager` drops broken connections on recycle.

use std::time::Instant;

use deadpool::managed::{HookResult, Metrics};
use diesel::ConnectionResult;
use diesel_async::pooled_connection::{PoolError, PoolableConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use futures::FutureExt;
use futures::future::BoxFuture;

use super::pg_config::mask_url;
use crate::TRACING_TARGET_CONNECTION;

/// Establishes a new connection, logging how long it took.
///
/// Installed as the manager's [`SetupCallback`].
///
/// [`SetupCallback`]: diesel_async::pooled_connection::SetupCallback
pub fn setup_callback<C>(addr: &str) -> BoxFuture<'_, ConnectionResult<C>>
where
    C: AsyncConnection + 'static,
{
    async move {
        let start = Instant::now();
        let result = C::establish(addr).await;
        let elapsed_ms = start.elapsed().as_millis();

        match &result {
            Ok(_) => tracing::info!(
                target: TRACING_TARGET_CONNECTION,
                addr = %mask_url(addr),
                elapsed_ms,
                "Database connection established"
            ),
            Err(error) => tracing::error!(
                target: TRACING_TARGET_CONNECTION,
                addr = %mask_url(addr),
                elapsed_ms,
                %error,
                "Failed to establish database connection"
            ),
        }

        result
    }
    .boxed()
}

fn report(hook: &'static str, conn: &mut AsyncPgConnection, metrics: &Metrics) {
    let is_broken = conn.is_broken();

    tracing::debug!(
        target: TRACING_TARGET_CONNECTION,
        hook,
        is_broken,
        age = ?metrics.age(),
        recycle_count = metrics.recycle_count,
        "Pooled connection checked"
    );

    if is_broken {
        tracing::warn!(
            target: TRACING_TARGET_CONNECTION,
            hook,
            recycle_count = metrics.recycle_count,
            "Pooled connection is broken"
        );
    }
}

/// Runs after a connection joins the pool.
pub fn post_create(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    report("post_create", conn, metrics);
    Ok(())
}

/// Runs before an idle connection is handed out again.
pub fn pre_recycle(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    report("pre_recycle", conn, metrics);
    Ok(())
}

/// Runs after an idle connection passed the manager's health check.
pub fn post_recycle(conn: &mut AsyncPgConnection, metrics: &Metrics) -> HookResult<PoolError> {
    report("post_recycle", conn, metrics);
    Ok(())
}
