//! Everything a caller usually needs, in one import.
//!
//! ```rust,no_run
//! use shopfloor_postgres::prelude::*;
//!
//! # async fn example() -> PgResult<()> {
//! let client = PgClient::connect(PgConfig::new("postgresql://localhost/shopfloor")).await?;
//! let mut conn = client.get_connection().await?;
//! let stages = conn.list_organization_stages("org-id").await?;
//! # Ok(())
//! # }
//! ```

pub use diesel_async::scoped_futures::ScopedFutureExt;

pub use crate::query::{
    DelegateExt, FindManyArgs, InviteRepository, MembershipRepository, OrganizationRepository,
    SessionRepository, StageRepository, TaskProgressRepository, TaskRepository, UserRepository,
    VehicleRepository,
};
pub use crate::types::{
    CursorPagination, ListRelationFilter, NullableFilter, OffsetPagination, RelationFilter,
    SortBy, SortOrder, StringFilter,
};
pub use crate::{
    ErrorHint, IsolationLevel, PgClient, PgClientMigrationExt, PgConfig, PgConn, PgConnection,
    PgError, PgResult, TransactionOptions,
};
