//! Transaction scopes and batches on a [`PgClient`].
//!
//! ```ignore
//! use diesel_async::scoped_futures::ScopedFutureExt;
//! use shopfloor_postgres::query::{StageRepository, VehicleRepository};
//! use shopfloor_postgres::{IsolationLevel, TransactionOptions};
//!
//! let options = TransactionOptions::default().isolation(IsolationLevel::Serializable);
//! let vehicle = client
//!     .transaction_with(options, |conn| {
//!         async move {
//!             let next = conn.find_next_stage(&org_id, sequence).await?;
//!             conn.move_vehicle_to_stage(&vehicle_id, next.as_ref().map(|s| s.id.as_str()))
//!                 .await
//!         }
//!         .scope_boxed()
//!     })
//!     .await?;
//! ```

use std::time::{Duration, Instant};

use deadpool::managed::Object;
use diesel_async::scoped_futures::{ScopedBoxFuture, ScopedFutureExt};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::constants::transaction::{DEFAULT_MAX_WAIT, DEFAULT_TIMEOUT};
use crate::{PgClient, PgConnection, PgError, PgResult, TRACING_TARGET_TRANSACTION};

/// SQL isolation level of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Settings of an interactive transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Isolation level; the server default (read committed) when `None`.
    pub isolation_level: Option<IsolationLevel>,
    /// Starts the transaction `READ ONLY`.
    pub read_only: bool,
    /// Longest wait for a pooled connection.
    pub max_wait: Duration,
    /// Longest run of the whole transaction, commit included.
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: None,
            read_only: false,
            max_wait: DEFAULT_MAX_WAIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransactionOptions {
    /// Sets the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Makes the transaction read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Sets the connection wait budget.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the transaction time budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One step of a [`PgClient::batch`].
pub type BatchOp<T> = Box<
    dyn for<'r> FnOnce(&'r mut PgConnection) -> ScopedBoxFuture<'static, 'r, PgResult<T>> + Send,
>;

/// Boxes a closure into a [`BatchOp`].
pub fn batch_op<T, F>(op: F) -> BatchOp<T>
where
    F: for<'r> FnOnce(&'r mut PgConnection) -> ScopedBoxFuture<'static, 'r, PgResult<T>>
        + Send
        + 'static,
{
    Box::new(op)
}

impl PgClient {
    /// Runs `f` in a transaction with the default options.
    ///
    /// Commits when `f` returns `Ok` and rolls back otherwise.
    pub async fn transaction<'a, T, F>(&self, f: F) -> PgResult<T>
    where
        F: for<'r> FnOnce(&'r mut PgConnection) -> ScopedBoxFuture<'a, 'r, PgResult<T>>
            + Send
            + 'a,
        T: Send + 'a,
    {
        self.transaction_with(TransactionOptions::default(), f)
            .await
    }

    /// Runs `f` in a transaction configured by `options`.
    ///
    /// Exceeding `max_wait` or `timeout` yields [`PgError::TransactionTimeout`];
    /// a transaction cut short by its timeout is rolled back by the server
    /// when its connection is discarded.
    #[tracing::instrument(
        skip_all,
        target = TRACING_TARGET_TRANSACTION,
        fields(
            isolation = ?options.isolation_level,
            read_only = options.read_only,
        )
    )]
    pub async fn transaction_with<'a, T, F>(
        &self,
        options: TransactionOptions,
        f: F,
    ) -> PgResult<T>
    where
        F: for<'r> FnOnce(&'r mut PgConnection) -> ScopedBoxFuture<'a, 'r, PgResult<T>>
            + Send
            + 'a,
        T: Send + 'a,
    {
        let start = Instant::now();

        let mut conn = tokio::time::timeout(options.max_wait, self.get_pooled_connection())
            .await
            .map_err(|_| {
                tracing::warn!(
                    target: TRACING_TARGET_TRANSACTION,
                    max_wait = ?options.max_wait,
                    "Timed out waiting for a transaction connection"
                );
                PgError::TransactionTimeout(options.max_wait)
            })??;

        let mut builder = conn.build_transaction();
        if options.read_only {
            builder = builder.read_only();
        }
        builder = match options.isolation_level {
            Some(IsolationLevel::ReadCommitted) => builder.read_committed(),
            Some(IsolationLevel::RepeatableRead) => builder.repeatable_read(),
            Some(IsolationLevel::Serializable) => builder.serializable(),
            None => builder,
        };

        let outcome = tokio::time::timeout(options.timeout, builder.run(f)).await;
        match outcome {
            Ok(result) => {
                tracing::debug!(
                    target: TRACING_TARGET_TRANSACTION,
                    committed = result.is_ok(),
                    elapsed = ?start.elapsed(),
                    "Transaction finished"
                );
                result
            }
            Err(_) => {
                // The interrupted transaction may still be open on the server.
                drop(Object::take(conn));
                tracing::warn!(
                    target: TRACING_TARGET_TRANSACTION,
                    timeout = ?options.timeout,
                    "Transaction timed out and its connection was discarded"
                );
                Err(PgError::TransactionTimeout(options.timeout))
            }
        }
    }

    /// Runs `ops` in order inside one transaction and returns their results.
    ///
    /// The first failing step rolls back every earlier one.
    #[tracing::instrument(skip_all, target = TRACING_TARGET_TRANSACTION, fields(ops = ops.len()))]
    pub async fn batch<T>(&self, ops: Vec<BatchOp<T>>) -> PgResult<Vec<T>>
    where
        T: Send + 'static,
    {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        self.transaction(move |conn| {
            async move {
                let mut results = Vec::with_capacity(ops.len());
                for op in ops {
                    results.push(op(&mut *conn).await?);
                }
                Ok(results)
            }
            .scope_boxed()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{DelegateExt, FindManyArgs};

    #[test]
    fn defaults_follow_constants() {
        let options = TransactionOptions::default();
        assert_eq!(options.max_wait, Duration::from_secs(2));
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.isolation_level, None);
        assert!(!options.read_only);
    }

    #[test]
    fn builder_overrides() {
        let options = TransactionOptions::default()
            .isolation(IsolationLevel::RepeatableRead)
            .read_only()
            .timeout(Duration::from_secs(30));
        assert_eq!(options.isolation_level, Some(IsolationLevel::RepeatableRead));
        assert!(options.read_only);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.max_wait, DEFAULT_MAX_WAIT);
    }

    #[test]
    fn isolation_level_names() {
        assert_eq!(IsolationLevel::RepeatableRead.to_string(), "repeatable_read");
        assert_eq!(
            "serializable".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
    }

    #[test]
    fn delegate_calls_box_into_batch_ops() {
        let ops: Vec<BatchOp<i64>> = vec![
            batch_op(|conn| async move { conn.user().count(FindManyArgs::new()).await }.scope_boxed()),
            batch_op(|conn| {
                async move { conn.session().count(FindManyArgs::new()).await }.scope_boxed()
            }),
        ];
        assert_eq!(ops.len(), 2);
    }
}
