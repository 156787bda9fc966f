//! The per-model contract the generic [`Delegate`](super::Delegate) runs on.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use super::statement::Fragment;
use crate::model::Changeset;
use crate::types::{CmpOp, ScalarField, ScalarValue, SortBy};
use crate::{PgConnection, PgResult};

/// Filter tree of a model (`XWhere`).
///
/// The default value is the empty conjunction, which matches every row.
pub trait WhereInput: fmt::Debug + Clone + Default + Send + Sync + 'static {
    /// All conditions hold. Empty is `TRUE`.
    fn and(conditions: Vec<Self>) -> Self;

    /// At least one condition holds. Empty is `FALSE`.
    fn or(conditions: Vec<Self>) -> Self;

    /// The condition does not hold.
    fn not(condition: Self) -> Self;
}

/// Implements [`WhereInput`] and [`Default`] for a `XWhere` enum with
/// `And`, `Or` and `Not` variants.
macro_rules! where_input {
    ($ty:ident) => {
        impl Default for $ty {
            fn default() -> Self {
                $ty::And(Vec::new())
            }
        }

        impl $crate::query::WhereInput for $ty {
            fn and(conditions: Vec<Self>) -> Self {
                $ty::And(conditions)
            }

            fn or(conditions: Vec<Self>) -> Self {
                $ty::Or(conditions)
            }

            fn not(condition: Self) -> Self {
                $ty::Not(Box::new(condition))
            }
        }
    };
}

pub(crate) use where_input;

/// A single `SELECT` against one table.
#[derive(Debug, Clone)]
pub struct SelectQuery<M: Entity> {
    /// Row filter.
    pub filter: M::Where,
    /// Sort keys, most significant first.
    pub order_by: Vec<SortBy<M::Field>>,
    /// Rows to skip.
    pub offset: Option<i64>,
    /// Maximum rows to return.
    pub limit: Option<i64>,
    /// Keep only the first row of every value combination of these fields.
    pub distinct: Vec<M::Field>,
}

impl<M: Entity> SelectQuery<M> {
    /// Selects every row matching `filter` in unspecified order.
    pub fn filtered(filter: M::Where) -> Self {
        Self {
            filter,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            distinct: Vec::new(),
        }
    }

    /// Selects nothing.
    pub fn nothing() -> Self {
        Self::filtered(M::Where::or(Vec::new()))
    }

    /// Selects at most one row matching the unique selector.
    pub fn unique(unique: M::Unique) -> Self {
        Self {
            limit: Some(1),
            ..Self::filtered(M::unique_where(unique))
        }
    }

    /// Returns whether the window narrows the filtered rows.
    pub fn is_windowed(&self) -> bool {
        self.offset.is_some() || self.limit.is_some() || !self.distinct.is_empty()
    }
}

/// A database model with its filter, ordering, write and include shapes.
///
/// The async hooks are the only place SQL is issued for the generic
/// operations; the delegate composes them.
pub trait Entity: Sized + Clone + Send + Sync + 'static {
    /// Model name used in errors and logs.
    const MODEL: &'static str;

    /// Table name.
    const TABLE: &'static str;

    /// Scalar field enum.
    type Field: ScalarField;
    /// Filter tree.
    type Where: WhereInput;
    /// Unique selector.
    type Unique: fmt::Debug + Clone + Send + Sync + 'static;
    /// Insert payload.
    type Create: Send + Sync + 'static;
    /// Change set.
    type Update: Changeset + Send + Sync + 'static;
    /// Relation selection for `*_with` reads.
    type Include: Clone + Default + Send + Sync + 'static;
    /// Row with its selected relations.
    type WithRelations: Send + 'static;

    /// Primary key field, appended to every ordering as the tiebreaker.
    const ID: Self::Field;

    /// Primary key of the row.
    fn id(&self) -> &str;

    /// Reads a scalar field.
    fn value(&self, field: Self::Field) -> ScalarValue;

    /// Builds the condition `field <op> value`.
    fn field_where(field: Self::Field, op: CmpOp, value: ScalarValue) -> PgResult<Self::Where>;

    /// Turns a unique selector into a filter.
    fn unique_where(unique: Self::Unique) -> Self::Where;

    /// Qualified column of a scalar field.
    fn column(field: Self::Field) -> Fragment;

    /// Compiled filter.
    fn predicate(filter: &Self::Where) -> Fragment;

    /// Condition selecting exactly the rows of `query`.
    ///
    /// Windowed queries become `id IN (SELECT id ..)`.
    fn restrict(query: SelectQuery<Self>) -> Fragment;

    /// Runs a `SELECT`.
    fn load(
        conn: &mut PgConnection,
        query: SelectQuery<Self>,
    ) -> impl Future<Output = PgResult<Vec<Self>>> + Send;

    /// Counts the rows of `query` with `COUNT(*)`.
    fn count(
        conn: &mut PgConnection,
        query: SelectQuery<Self>,
    ) -> impl Future<Output = PgResult<i64>> + Send;

    /// Inserts rows and returns them.
    fn insert(
        conn: &mut PgConnection,
        rows: Vec<Self::Create>,
        skip_duplicates: bool,
    ) -> impl Future<Output = PgResult<Vec<Self>>> + Send;

    /// Inserts rows and returns how many were written.
    fn insert_count(
        conn: &mut PgConnection,
        rows: Vec<Self::Create>,
        skip_duplicates: bool,
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Updates matching rows and returns them.
    fn update(
        conn: &mut PgConnection,
        filter: Self::Where,
        changes: Self::Update,
    ) -> impl Future<Output = PgResult<Vec<Self>>> + Send;

    /// Updates matching rows and returns how many changed.
    fn update_count(
        conn: &mut PgConnection,
        filter: Self::Where,
        changes: Self::Update,
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Deletes matching rows and returns them.
    fn delete(
        conn: &mut PgConnection,
        filter: Self::Where,
    ) -> impl Future<Output = PgResult<Vec<Self>>> + Send;

    /// Deletes matching rows and returns how many were removed.
    fn delete_count(
        conn: &mut PgConnection,
        filter: Self::Where,
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Loads the selected relations of `rows`, preserving row order.
    fn include(
        conn: &mut PgConnection,
        rows: Vec<Self>,
        include: Self::Include,
    ) -> impl Future<Output = PgResult<Vec<Self::WithRelations>>> + Send;
}

/// Loads the rows matching `filter`, keyed by primary key.
///
/// Used by `include` to attach to-one relations.
pub(crate) async fn index_by_id<M: Entity>(
    conn: &mut PgConnection,
    filter: M::Where,
) -> PgResult<HashMap<String, M>> {
    let rows = M::load(conn, SelectQuery::filtered(filter)).await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.id().to_owned(), row))
        .collect())
}

/// Builds the boxed `SELECT` of a [`SelectQuery`] on `$table`, distinct
/// window included.
macro_rules! window_statement {
    ($table:ident, $compile:path, $order:path, $query:expr) => {{
        use diesel::pg::Pg;
        use diesel::prelude::*;

        let query: $crate::query::SelectQuery<Self> = $query;
        let mut statement: $table::BoxedQuery<'static, Pg> =
            $table::table.into_boxed().filter($compile(&query.filter));
        if !query.distinct.is_empty() {
            statement = statement.filter($crate::query::predicate::in_subselect(
                $table::id,
                $crate::query::statement::distinct_ids(&query),
                false,
            ));
        }
        for sort in &query.order_by {
            statement = $order(statement, *sort);
        }
        if let Some(offset) = query.offset {
            statement = statement.offset(offset);
        }
        if let Some(limit) = query.limit {
            statement = statement.limit(limit);
        }
        statement
    }};
}

/// Predicate on `$table` selecting exactly the rows of a [`SelectQuery`].
macro_rules! window_predicate {
    ($table:ident, $compile:path, $order:path, $query:expr) => {{
        use diesel::prelude::*;

        let query: $crate::query::SelectQuery<Self> = $query;
        if query.is_windowed() {
            $crate::query::predicate::in_subselect(
                $table::id,
                $crate::query::entity::window_statement!($table, $compile, $order, query)
                    .select($table::id),
                false,
            )
        } else {
            $compile(&query.filter)
        }
    }};
}

/// Implements the SQL hooks of [`Entity`] for a table.
///
/// `$compile` turns `&Self::Where` into a boxed predicate, `$order` appends
/// one sort key to a boxed query of the table and `$column` maps a field to
/// its column. The last two come from
/// [`field_columns!`](crate::query::predicate::field_columns).
macro_rules! entity_queries {
    ($table:ident, $compile:path, $order:path, $column:path) => {
        const TABLE: &'static str = stringify!($table);

        fn column(field: Self::Field) -> $crate::query::statement::Fragment {
            $column(field)
        }

        fn predicate(filter: &Self::Where) -> $crate::query::statement::Fragment {
            Box::new($compile(filter))
        }

        fn restrict(query: $crate::query::SelectQuery<Self>) -> $crate::query::statement::Fragment {
            Box::new($crate::query::entity::window_predicate!(
                $table, $compile, $order, query
            ))
        }

        async fn load(
            conn: &mut $crate::PgConnection,
            query: $crate::query::SelectQuery<Self>,
        ) -> $crate::PgResult<Vec<Self>> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            $crate::query::entity::window_statement!($table, $compile, $order, query)
                .select(Self::as_select())
                .load(conn)
                .await
                .map_err($crate::PgError::from)
        }

        async fn count(
            conn: &mut $crate::PgConnection,
            query: $crate::query::SelectQuery<Self>,
        ) -> $crate::PgResult<i64> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            $table::table
                .filter($crate::query::entity::window_predicate!(
                    $table, $compile, $order, query
                ))
                .count()
                .get_result(conn)
                .await
                .map_err($crate::PgError::from)
        }

        async fn insert(
            conn: &mut $crate::PgConnection,
            rows: Vec<Self::Create>,
            skip_duplicates: bool,
        ) -> $crate::PgResult<Vec<Self>> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            use $crate::types::constants::database::INSERT_CHUNK_SIZE;

            let mut inserted = Vec::with_capacity(rows.len());
            for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                let statement = diesel::insert_into($table::table).values(chunk);
                let mut batch: Vec<Self> = if skip_duplicates {
                    statement
                        .on_conflict_do_nothing()
                        .returning(Self::as_returning())
                        .get_results(conn)
                        .await
                } else {
                    statement
                        .returning(Self::as_returning())
                        .get_results(conn)
                        .await
                }
                .map_err($crate::PgError::from)?;
                inserted.append(&mut batch);
            }

            Ok(inserted)
        }

        async fn insert_count(
            conn: &mut $crate::PgConnection,
            rows: Vec<Self::Create>,
            skip_duplicates: bool,
        ) -> $crate::PgResult<usize> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            use $crate::types::constants::database::INSERT_CHUNK_SIZE;

            let mut written = 0;
            for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
                let statement = diesel::insert_into($table::table).values(chunk);
                written += if skip_duplicates {
                    statement.on_conflict_do_nothing().execute(conn).await
                } else {
                    statement.execute(conn).await
                }
                .map_err($crate::PgError::from)?;
            }

            Ok(written)
        }

        async fn update(
            conn: &mut $crate::PgConnection,
            filter: Self::Where,
            changes: Self::Update,
        ) -> $crate::PgResult<Vec<Self>> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            diesel::update($table::table)
                .filter($compile(&filter))
                .set(&changes)
                .returning(Self::as_returning())
                .get_results(conn)
                .await
                .map_err($crate::PgError::from)
        }

        async fn update_count(
            conn: &mut $crate::PgConnection,
            filter: Self::Where,
            changes: Self::Update,
        ) -> $crate::PgResult<usize> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            diesel::update($table::table)
                .filter($compile(&filter))
                .set(&changes)
                .execute(conn)
                .await
                .map_err($crate::PgError::from)
        }

        async fn delete(
            conn: &mut $crate::PgConnection,
            filter: Self::Where,
        ) -> $crate::PgResult<Vec<Self>> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            diesel::delete($table::table)
                .filter($compile(&filter))
                .returning(Self::as_returning())
                .get_results(conn)
                .await
                .map_err($crate::PgError::from)
        }

        async fn delete_count(
            conn: &mut $crate::PgConnection,
            filter: Self::Where,
        ) -> $crate::PgResult<usize> {
            use diesel::prelude::*;
            use diesel_async::RunQueryDsl;

            diesel::delete($table::table)
                .filter($compile(&filter))
                .execute(conn)
                .await
                .map_err($crate::PgError::from)
        }
    };
}

pub(crate) use {entity_queries, window_predicate, window_statement};
