//! Generic model operations.
//!
//! A [`Delegate`] borrows a connection and exposes the same set of reads,
//! writes and aggregations for every model:
//!
//! ```ignore
//! use shopfloor_postgres::query::{DelegateExt, FindManyArgs, UserField, UserWhere};
//! use shopfloor_postgres::types::{SortBy, StringFilter};
//!
//! let users = conn
//!     .user()
//!     .find_many(
//!         FindManyArgs::new()
//!             .filter(UserWhere::Email(StringFilter::ends_with("@garage.test")))
//!             .order_by(SortBy::desc(UserField::CreatedAt))
//!             .take(20),
//!     )
//!     .await?;
//! ```

use std::marker::PhantomData;

use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::aggregate::{AggregateResult, GroupByRow};
use super::args::{AggregateArgs, FindManyArgs, GroupByArgs};
use super::entity::{Entity, SelectQuery, WhereInput};
use super::projection::Projection;
use crate::model::{
    Changeset, Invite, Membership, Organization, Session, Stage, Task, TaskProgress, User,
    Vehicle,
};
use crate::types::{CmpOp, ScalarField, ScalarValue, SortBy};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY};

/// Model operations on a borrowed connection.
pub struct Delegate<'c, M> {
    conn: &'c mut PgConnection,
    model: PhantomData<fn() -> M>,
}

impl<'c, M: Entity> Delegate<'c, M> {
    /// Creates a delegate for model `M`.
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self {
            conn,
            model: PhantomData,
        }
    }

    /// Finds the row identified by `unique`.
    pub async fn find_unique(&mut self, unique: M::Unique) -> PgResult<Option<M>> {
        let rows = M::load(self.conn, SelectQuery::unique(unique)).await?;
        Ok(rows.into_iter().next())
    }

    /// Like [`find_unique`](Self::find_unique), failing with
    /// [`PgError::NotFound`] when there is no such row.
    pub async fn find_unique_or_throw(&mut self, unique: M::Unique) -> PgResult<M> {
        self.find_unique(unique)
            .await?
            .ok_or_else(|| PgError::not_found(M::MODEL, "find_unique_or_throw"))
    }

    /// Finds the first row `find_many(args)` would return.
    pub async fn find_first(&mut self, mut args: FindManyArgs<M>) -> PgResult<Option<M>> {
        args.take = Some(first_take(args.take));
        Ok(self.rows(args).await?.into_iter().next())
    }

    /// Like [`find_first`](Self::find_first), failing with
    /// [`PgError::NotFound`] when no row matches.
    pub async fn find_first_or_throw(&mut self, args: FindManyArgs<M>) -> PgResult<M> {
        self.find_first(args)
            .await?
            .ok_or_else(|| PgError::not_found(M::MODEL, "find_first_or_throw"))
    }

    /// Finds every row matching `args`.
    pub async fn find_many(&mut self, args: FindManyArgs<M>) -> PgResult<Vec<M>> {
        self.rows(args).await
    }

    /// [`find_unique`](Self::find_unique) with the selected relations loaded.
    pub async fn find_unique_with(
        &mut self,
        unique: M::Unique,
        include: M::Include,
    ) -> PgResult<Option<M::WithRelations>> {
        let rows = M::load(self.conn, SelectQuery::unique(unique)).await?;
        let rows = M::include(self.conn, rows, include).await?;
        Ok(rows.into_iter().next())
    }

    /// [`find_first`](Self::find_first) with the selected relations loaded.
    pub async fn find_first_with(
        &mut self,
        args: FindManyArgs<M>,
        include: M::Include,
    ) -> PgResult<Option<M::WithRelations>> {
        let rows = self.find_first(args).await?.into_iter().collect();
        let rows = M::include(self.conn, rows, include).await?;
        Ok(rows.into_iter().next())
    }

    /// [`find_many`](Self::find_many) with the selected relations loaded.
    pub async fn find_many_with(
        &mut self,
        args: FindManyArgs<M>,
        include: M::Include,
    ) -> PgResult<Vec<M::WithRelations>> {
        let rows = self.rows(args).await?;
        M::include(self.conn, rows, include).await
    }

    /// [`find_many`](Self::find_many) reduced to the listed fields.
    ///
    /// An empty field list projects every field.
    pub async fn find_many_select(
        &mut self,
        args: FindManyArgs<M>,
        fields: &[M::Field],
    ) -> PgResult<Vec<Projection<M::Field>>> {
        let rows = self.rows(args).await?;
        Ok(rows
            .iter()
            .map(|row| Projection::of(row, fields, M::value))
            .collect())
    }

    /// Inserts one row.
    pub async fn create(&mut self, data: M::Create) -> PgResult<M> {
        let row = M::insert(self.conn, vec![data], false)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PgError::Unexpected("insert returned no row".into()))?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            id = row.id(),
            "Record created",
        );

        Ok(row)
    }

    /// Inserts rows and returns how many were written.
    ///
    /// With `skip_duplicates`, rows violating a unique constraint are skipped.
    pub async fn create_many(
        &mut self,
        data: Vec<M::Create>,
        skip_duplicates: bool,
    ) -> PgResult<usize> {
        let requested = data.len();
        let written = M::insert_count(self.conn, data, skip_duplicates).await?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            requested,
            written,
            "Records created",
        );

        Ok(written)
    }

    /// Inserts rows and returns the written ones.
    pub async fn create_many_and_return(
        &mut self,
        data: Vec<M::Create>,
        skip_duplicates: bool,
    ) -> PgResult<Vec<M>> {
        let requested = data.len();
        let rows = M::insert(self.conn, data, skip_duplicates).await?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            requested,
            written = rows.len(),
            "Records created",
        );

        Ok(rows)
    }

    /// Updates the row identified by `unique`.
    ///
    /// An empty change set returns the current row untouched.
    pub async fn update(&mut self, unique: M::Unique, changes: M::Update) -> PgResult<M> {
        if changes.is_empty() {
            return self
                .find_unique(unique)
                .await?
                .ok_or_else(|| PgError::not_found(M::MODEL, "update"));
        }

        let row = M::update(self.conn, M::unique_where(unique), changes)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PgError::not_found(M::MODEL, "update"))?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            id = row.id(),
            "Record updated",
        );

        Ok(row)
    }

    /// Updates every matching row and returns how many matched.
    pub async fn update_many(&mut self, filter: M::Where, changes: M::Update) -> PgResult<usize> {
        let updated = if changes.is_empty() {
            M::count(self.conn, SelectQuery::filtered(filter)).await? as usize
        } else {
            M::update_count(self.conn, filter, changes).await?
        };

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            updated,
            "Records updated",
        );

        Ok(updated)
    }

    /// Updates every matching row and returns the rows after the update.
    pub async fn update_many_and_return(
        &mut self,
        filter: M::Where,
        changes: M::Update,
    ) -> PgResult<Vec<M>> {
        let rows = if changes.is_empty() {
            M::load(self.conn, SelectQuery::filtered(filter)).await?
        } else {
            M::update(self.conn, filter, changes).await?
        };

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            updated = rows.len(),
            "Records updated",
        );

        Ok(rows)
    }

    /// Updates the row identified by `unique`, or inserts `create` when it
    /// does not exist.
    ///
    /// Lookup and write share one transaction, which becomes a savepoint
    /// when one is already open.
    pub async fn upsert(
        &mut self,
        unique: M::Unique,
        create: M::Create,
        update: M::Update,
    ) -> PgResult<M> {
        let row = self
            .conn
            .transaction(|conn| {
                async move {
                    let existing = M::load(conn, SelectQuery::unique(unique.clone()))
                        .await?
                        .into_iter()
                        .next();

                    let rows = match existing {
                        Some(row) if update.is_empty() => vec![row],
                        Some(_) => M::update(conn, M::unique_where(unique), update).await?,
                        None => M::insert(conn, vec![create], false).await?,
                    };

                    rows.into_iter()
                        .next()
                        .ok_or_else(|| PgError::not_found(M::MODEL, "upsert"))
                }
                .scope_boxed()
            })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            id = row.id(),
            "Record upserted",
        );

        Ok(row)
    }

    /// Deletes the row identified by `unique` and returns it.
    pub async fn delete(&mut self, unique: M::Unique) -> PgResult<M> {
        let row = M::delete(self.conn, M::unique_where(unique))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PgError::not_found(M::MODEL, "delete"))?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            id = row.id(),
            "Record deleted",
        );

        Ok(row)
    }

    /// Deletes every matching row and returns how many were removed.
    pub async fn delete_many(&mut self, filter: M::Where) -> PgResult<usize> {
        let deleted = M::delete_count(self.conn, filter).await?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = M::MODEL,
            deleted,
            "Records deleted",
        );

        Ok(deleted)
    }

    /// Counts the rows `find_many(args)` would return.
    pub async fn count(&mut self, args: FindManyArgs<M>) -> PgResult<i64> {
        match self.window(args).await? {
            Some(plan) => M::count(self.conn, plan.query).await,
            None => Ok(0),
        }
    }

    /// Aggregates the rows `find_many(args.window)` would return.
    pub async fn aggregate(&mut self, args: AggregateArgs<M>) -> PgResult<AggregateResult<M::Field>> {
        args.select.validate()?;
        let query = self
            .window(args.window)
            .await?
            .map_or_else(SelectQuery::nothing, |plan| plan.query);

        let statement = args.select.statement(M::TABLE, M::restrict(query), M::column)?;
        let rows = statement
            .load::<Vec<Option<String>>>(self.conn)
            .await
            .map_err(PgError::from)?;
        args.select.decode(rows)
    }

    /// Groups matching rows and aggregates every group.
    pub async fn group_by(&mut self, args: GroupByArgs<M>) -> PgResult<Vec<GroupByRow<M::Field>>> {
        args.grouping.validate()?;
        let statement = args
            .grouping
            .statement(M::TABLE, M::predicate(&args.filter), M::column)?;
        let rows = statement
            .load::<Vec<Option<String>>>(self.conn)
            .await
            .map_err(PgError::from)?;
        args.grouping.decode(rows)
    }

    async fn rows(&mut self, args: FindManyArgs<M>) -> PgResult<Vec<M>> {
        let Some(plan) = self.window(args).await? else {
            return Ok(Vec::new());
        };

        let mut rows = M::load(self.conn, plan.query).await?;
        if plan.backwards {
            rows.reverse();
        }
        Ok(rows)
    }

    /// Plans `args` and resolves its cursor into a keyset condition.
    ///
    /// Returns `None` when the cursor row does not exist.
    async fn window(&mut self, args: FindManyArgs<M>) -> PgResult<Option<Plan<M>>> {
        let mut plan = Plan::new(args)?;
        if let Some(unique) = plan.cursor.take() {
            let anchor = M::load(self.conn, SelectQuery::unique(unique))
                .await?
                .into_iter()
                .next();
            let Some(anchor) = anchor else {
                return Ok(None);
            };

            let after = keyset(&anchor, &plan.query.order_by)?;
            let filter = std::mem::take(&mut plan.query.filter);
            plan.query.filter = M::Where::and(vec![filter, after]);
        }
        Ok(Some(plan))
    }
}

/// `take` of `find_first`: one row, from the end when paging backwards.
fn first_take(take: Option<i64>) -> i64 {
    if take.is_some_and(|take| take < 0) { -1 } else { 1 }
}

/// Checked `find_many` arguments before the cursor is resolved.
struct Plan<M: Entity> {
    query: SelectQuery<M>,
    cursor: Option<M::Unique>,
    /// Rows are read in reversed order and flipped back after loading.
    backwards: bool,
}

impl<M: Entity> Plan<M> {
    fn new(args: FindManyArgs<M>) -> PgResult<Self> {
        let FindManyArgs {
            filter,
            mut order_by,
            cursor,
            skip,
            take,
            distinct,
        } = args;

        if skip.is_some_and(|skip| skip < 0) {
            return Err(PgError::validation("skip must not be negative"));
        }
        if let Some(sort) = order_by.iter().find(|sort| !sort.field.is_comparable()) {
            return Err(PgError::validation(format!(
                "cannot order by list field `{}`",
                sort.field.name()
            )));
        }

        let backwards = take.is_some_and(|take| take < 0);
        if !order_by.iter().any(|sort| sort.field == M::ID) {
            order_by.push(SortBy::asc(M::ID));
        }
        if backwards {
            order_by = order_by.into_iter().map(SortBy::reversed).collect();
        }

        Ok(Self {
            query: SelectQuery {
                filter,
                order_by,
                offset: skip,
                limit: take.map(i64::saturating_abs),
                distinct,
            },
            cursor,
            backwards,
        })
    }
}

/// Rows at or after `anchor` under `order_by`.
///
/// Expands to `(k1 > v1) OR (k1 = v1 AND k2 > v2) OR ... OR (all equal)`,
/// with `NULL` placed last in ascending and first in descending order.
fn keyset<M: Entity>(anchor: &M, order_by: &[SortBy<M::Field>]) -> PgResult<M::Where> {
    let mut branches = Vec::with_capacity(order_by.len() + 1);
    let mut equal = Vec::with_capacity(order_by.len());

    for sort in order_by {
        let value = anchor.value(sort.field);

        let mut branch = equal.clone();
        branch.push(strictly_after::<M>(*sort, value.clone())?);
        branches.push(M::Where::and(branch));

        equal.push(M::field_where(sort.field, CmpOp::Eq, value)?);
    }
    branches.push(M::Where::and(equal));

    Ok(M::Where::or(branches))
}

fn strictly_after<M: Entity>(sort: SortBy<M::Field>, value: ScalarValue) -> PgResult<M::Where> {
    let field = sort.field;
    match (sort.is_asc(), value.is_null()) {
        (true, true) => Ok(M::Where::or(Vec::new())),
        (false, true) => M::field_where(field, CmpOp::Ne, ScalarValue::Null),
        (true, false) if field.is_nullable() => Ok(M::Where::or(vec![
            M::field_where(field, CmpOp::Gt, value)?,
            M::field_where(field, CmpOp::Eq, ScalarValue::Null)?,
        ])),
        (true, false) => M::field_where(field, CmpOp::Gt, value),
        (false, false) => M::field_where(field, CmpOp::Lt, value),
    }
}

/// Per-model delegates on a connection.
pub trait DelegateExt {
    /// Delegate for any model.
    fn delegate<M: Entity>(&mut self) -> Delegate<'_, M>;

    /// [`User`] operations.
    fn user(&mut self) -> Delegate<'_, User> {
        self.delegate()
    }

    /// [`Organization`] operations.
    fn organization(&mut self) -> Delegate<'_, Organization> {
        self.delegate()
    }

    /// [`Membership`] operations.
    fn membership(&mut self) -> Delegate<'_, Membership> {
        self.delegate()
    }

    /// [`Invite`] operations.
    fn invite(&mut self) -> Delegate<'_, Invite> {
        self.delegate()
    }

    /// [`Vehicle`] operations.
    fn vehicle(&mut self) -> Delegate<'_, Vehicle> {
        self.delegate()
    }

    /// [`Stage`] operations.
    fn stage(&mut self) -> Delegate<'_, Stage> {
        self.delegate()
    }

    /// [`Task`] operations.
    fn task(&mut self) -> Delegate<'_, Task> {
        self.delegate()
    }

    /// [`TaskProgress`] operations.
    fn task_progress(&mut self) -> Delegate<'_, TaskProgress> {
        self.delegate()
    }

    /// [`Session`] operations.
    fn session(&mut self) -> Delegate<'_, Session> {
        self.delegate()
    }
}

impl DelegateExt for PgConnection {
    fn delegate<M: Entity>(&mut self) -> Delegate<'_, M> {
        Delegate::new(self)
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;
    use jiff::Timestamp;

    use super::*;
    use crate::query::{MembershipField, VehicleField, VehicleWhere, VehicleWhereUnique};
    use crate::types::{IntFilter, NullableFilter, StringFilter};

    fn vehicle(year: Option<i32>) -> Vehicle {
        Vehicle {
            id: "v2".into(),
            vin: None,
            qr_code_token: "qr-v2".into(),
            tracking_token: "track-v2".into(),
            brand: "Audi".into(),
            model: "A4".into(),
            year,
            registration_number: "AB-123".into(),
            customer_name: "Ada".into(),
            customer_email: "ada@garage.test".into(),
            customer_phone: "555-0100".into(),
            is_active: true,
            notes: String::new(),
            entry_time: Timestamp::UNIX_EPOCH.into(),
            estimated_completion: None,
            organization_id: "org".into(),
            current_stage_id: None,
        }
    }

    fn sql(filter: &VehicleWhere) -> String {
        debug_query::<Pg, _>(&Vehicle::predicate(filter)).to_string()
    }

    fn after(sort: SortBy<VehicleField>, value: ScalarValue) -> VehicleWhere {
        strictly_after::<Vehicle>(sort, value).unwrap()
    }

    #[test]
    fn nothing_follows_a_null_in_ascending_order() {
        let filter = after(SortBy::asc(VehicleField::Year), ScalarValue::Null);
        assert_eq!(filter, VehicleWhere::Or(Vec::new()));
        assert!(sql(&filter).starts_with("FALSE"), "{}", sql(&filter));
    }

    #[test]
    fn values_follow_a_null_in_descending_order() {
        let filter = after(SortBy::desc(VehicleField::Year), ScalarValue::Null);
        assert_eq!(filter, VehicleWhere::Year(NullableFilter::IsNotNull));
    }

    #[test]
    fn nulls_follow_values_in_ascending_order() {
        let filter = after(SortBy::asc(VehicleField::Year), ScalarValue::Int(2015));
        assert_eq!(
            filter,
            VehicleWhere::Or(vec![
                VehicleWhere::Year(NullableFilter::Value(IntFilter::Gt(2015))),
                VehicleWhere::Year(NullableFilter::IsNull),
            ])
        );

        let filter = after(SortBy::desc(VehicleField::Year), ScalarValue::Int(2015));
        assert_eq!(filter, VehicleWhere::Year(NullableFilter::Value(IntFilter::Lt(2015))));
    }

    #[test]
    fn required_fields_compare_strictly() {
        let filter = after(SortBy::asc(VehicleField::Brand), ScalarValue::from("Audi"));
        assert_eq!(filter, VehicleWhere::Brand(StringFilter::Gt("Audi".into())));
    }

    #[test]
    fn keyset_expands_every_prefix() {
        let order_by = [SortBy::desc(VehicleField::Year), SortBy::asc(VehicleField::Id)];
        let filter = keyset(&vehicle(None), &order_by).unwrap();

        assert_eq!(
            filter,
            VehicleWhere::Or(vec![
                VehicleWhere::And(vec![VehicleWhere::Year(NullableFilter::IsNotNull)]),
                VehicleWhere::And(vec![
                    VehicleWhere::Year(NullableFilter::IsNull),
                    VehicleWhere::Id(StringFilter::Gt("v2".into())),
                ]),
                VehicleWhere::And(vec![
                    VehicleWhere::Year(NullableFilter::IsNull),
                    VehicleWhere::Id(StringFilter::equals("v2")),
                ]),
            ])
        );

        let sql = sql(&filter);
        assert!(sql.contains("\"vehicles\".\"year\" IS NOT NULL"), "{sql}");
        assert!(sql.contains("\"vehicles\".\"id\" > $1"), "{sql}");
        assert!(sql.contains("\"vehicles\".\"id\" = $2"), "{sql}");
    }

    #[test]
    fn keyset_with_a_present_value() {
        let order_by = [SortBy::asc(VehicleField::Year), SortBy::asc(VehicleField::Id)];
        let filter = keyset(&vehicle(Some(2015)), &order_by).unwrap();

        let VehicleWhere::Or(branches) = filter else {
            panic!("keyset is a disjunction");
        };
        assert_eq!(branches.len(), 3);
        assert_eq!(
            branches[2],
            VehicleWhere::And(vec![
                VehicleWhere::Year(NullableFilter::Value(IntFilter::Equals(2015))),
                VehicleWhere::Id(StringFilter::equals("v2")),
            ])
        );
    }

    #[test]
    fn primary_key_breaks_ties() {
        let plan = Plan::<Vehicle>::new(
            FindManyArgs::new().order_by(SortBy::desc(VehicleField::Year)),
        )
        .unwrap();
        assert_eq!(
            plan.query.order_by,
            vec![SortBy::desc(VehicleField::Year), SortBy::asc(VehicleField::Id)]
        );
        assert!(!plan.backwards);

        let plan =
            Plan::<Vehicle>::new(FindManyArgs::new().order_by(SortBy::desc(VehicleField::Id)))
                .unwrap();
        assert_eq!(plan.query.order_by, vec![SortBy::desc(VehicleField::Id)]);
    }

    #[test]
    fn negative_take_reads_backwards() {
        let args = FindManyArgs::new()
            .order_by(SortBy::desc(VehicleField::Year))
            .cursor(VehicleWhereUnique::Id("v2".into()))
            .skip(1)
            .take(-3);
        let plan = Plan::<Vehicle>::new(args).unwrap();

        assert!(plan.backwards);
        assert_eq!(
            plan.query.order_by,
            vec![SortBy::asc(VehicleField::Year), SortBy::desc(VehicleField::Id)]
        );
        assert_eq!(plan.query.limit, Some(3));
        assert_eq!(plan.query.offset, Some(1));
        assert_eq!(plan.cursor, Some(VehicleWhereUnique::Id("v2".into())));
    }

    #[test]
    fn distinct_windows_the_query() {
        let args = FindManyArgs::<Vehicle>::new().distinct([VehicleField::Brand]);
        let plan = Plan::new(args).unwrap();
        assert_eq!(plan.query.distinct, vec![VehicleField::Brand]);
        assert!(plan.query.is_windowed());

        assert!(!Plan::<Vehicle>::new(FindManyArgs::new()).unwrap().query.is_windowed());
    }

    #[test]
    fn find_first_takes_one_row_from_either_end() {
        assert_eq!(first_take(None), 1);
        assert_eq!(first_take(Some(10)), 1);
        assert_eq!(first_take(Some(-10)), -1);
    }

    #[test]
    fn negative_skip_is_rejected() {
        assert!(Plan::<Vehicle>::new(FindManyArgs::new().skip(-1)).is_err());
    }

    #[test]
    fn ordering_by_a_list_is_rejected() {
        let args = FindManyArgs::new().order_by(SortBy::asc(MembershipField::AuthMethods));
        assert!(Plan::<Membership>::new(args).is_err());
    }
}
