//! Typed query layer for every model in the system.
//!
//! Each model gets two surfaces:
//!
//! - a generic [`Delegate`] (through [`DelegateExt`]) offering the uniform
//!   find/create/update/upsert/delete/count/aggregate/group-by operations,
//!   driven by the model's `XWhere` filter tree and `XField` enum;
//! - a bespoke `XRepository` trait implemented on [`PgConnection`] for the
//!   queries the application runs directly.
//!
//! Filters compile to boxed diesel predicates, so nested relation filters
//! (`some`/`every`/`none`, `is`/`is_not`) become `IN (SELECT ..)` subqueries
//! rather than joins. Distinct windows, aggregates and groups run in the
//! database as well, through the hand-built statements of `statement`.
//!
//! [`PgConnection`]: crate::PgConnection

pub(crate) mod predicate;

mod aggregate;
mod args;
mod delegate;
mod entity;
mod projection;
mod statement;

pub mod invite;
pub mod membership;
pub mod organization;
pub mod session;
pub mod stage;
pub mod task;
pub mod task_progress;
pub mod user;
pub mod vehicle;

pub use aggregate::{
    AggregateResult, AggregateSelection, AggregateTarget, GroupByRow, GroupOrder, Grouping, Having,
};
pub use args::{AggregateArgs, FindManyArgs, GroupByArgs};
pub use delegate::{Delegate, DelegateExt};
pub use entity::{Entity, SelectQuery, WhereInput};
pub use invite::{InviteField, InviteInclude, InviteRepository, InviteWhere, InviteWhereUnique};
pub use membership::{
    MemberCredential, MembershipField, MembershipInclude, MembershipRepository, MembershipWhere,
    MembershipWhereUnique,
};
pub use organization::{
    OrganizationField, OrganizationInclude, OrganizationRepository, OrganizationWhere,
    OrganizationWhereUnique,
};
pub use projection::Projection;
pub use session::{
    SessionField, SessionInclude, SessionRepository, SessionWhere, SessionWhereUnique,
};
pub use stage::{StageField, StageInclude, StageRepository, StageWhere, StageWhereUnique};
pub use task::{TaskField, TaskInclude, TaskRepository, TaskWhere, TaskWhereUnique};
pub use task_progress::{
    TaskProgressField, TaskProgressInclude, TaskProgressRepository, TaskProgressWhere,
    TaskProgressWhereUnique,
};
pub use user::{UserField, UserInclude, UserRepository, UserWhere, UserWhereUnique};
pub use vehicle::{
    VehicleField, VehicleInclude, VehicleRepository, VehicleWhere, VehicleWhereUnique,
};
