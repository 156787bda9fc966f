//! Boxed diesel predicates built from filter trees.
//!
//! Every `XWhere` tree compiles to a [`BoxedPredicate`] on its table. Leaf
//! conditions come from the column macros in this module; relation filters
//! become `column [NOT] IN (subquery)` through [`InSubselect`].

use diesel::dsl::sql;
use diesel::expression::{
    AppearsOnTable, BoxableExpression, Expression, SelectableExpression, ValidGrouping,
    is_aggregate,
};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{AstPass, QueryFragment, QueryId};
use diesel::sql_types::{Bool, Nullable};

/// Type-erased `WHERE` condition on table `T`.
pub type BoxedPredicate<T> = Box<dyn BoxableExpression<T, Pg, SqlType = Nullable<Bool>>>;

/// Boxes a nullable boolean expression.
#[inline]
pub fn boxed<T, E>(expression: E) -> BoxedPredicate<T>
where
    E: BoxableExpression<T, Pg, SqlType = Nullable<Bool>> + 'static,
{
    Box::new(expression)
}

/// Predicate that holds for every row.
pub fn always<T: 'static>() -> BoxedPredicate<T> {
    boxed(sql::<Nullable<Bool>>("TRUE"))
}

/// Predicate that holds for no row.
pub fn never<T: 'static>() -> BoxedPredicate<T> {
    boxed(sql::<Nullable<Bool>>("FALSE"))
}

/// Conjunction of the predicates; `TRUE` when there are none.
pub fn and_all<T, I>(predicates: I) -> BoxedPredicate<T>
where
    T: 'static,
    I: IntoIterator<Item = BoxedPredicate<T>>,
{
    predicates
        .into_iter()
        .reduce(|lhs, rhs| boxed(lhs.and(rhs)))
        .unwrap_or_else(always)
}

/// Disjunction of the predicates; `FALSE` when there are none.
pub fn or_any<T, I>(predicates: I) -> BoxedPredicate<T>
where
    T: 'static,
    I: IntoIterator<Item = BoxedPredicate<T>>,
{
    predicates
        .into_iter()
        .reduce(|lhs, rhs| boxed(lhs.or(rhs)))
        .unwrap_or_else(never)
}

/// Negation; `NULL` operands stay `NULL`.
pub fn negate<T: 'static>(predicate: BoxedPredicate<T>) -> BoxedPredicate<T> {
    boxed(diesel::dsl::not(predicate))
}

/// Escapes `LIKE` wildcards so user input matches literally.
///
/// PostgreSQL uses `\` as the default escape character.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%value%`
pub fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

/// `value%`
pub fn prefix_pattern(value: &str) -> String {
    format!("{}%", escape_like(value))
}

/// `%value`
pub fn suffix_pattern(value: &str) -> String {
    format!("%{}", escape_like(value))
}

/// `column [NOT] IN (subquery)`.
///
/// The subquery is any complete `SELECT` producing a single column of the
/// same type as `column`. It must never yield `NULL` when negated.
pub struct InSubselect<C> {
    column: C,
    negated: bool,
    subquery: Box<dyn QueryFragment<Pg> + Send>,
}

impl<C> InSubselect<C> {
    /// Creates the membership test.
    pub fn new<Q>(column: C, subquery: Q, negated: bool) -> Self
    where
        Q: QueryFragment<Pg> + Send + 'static,
    {
        Self {
            column,
            negated,
            subquery: Box::new(subquery),
        }
    }
}

impl<C: Expression> Expression for InSubselect<C> {
    type SqlType = Nullable<Bool>;
}

impl<C, QS> AppearsOnTable<QS> for InSubselect<C> where C: AppearsOnTable<QS> {}

impl<C, QS> SelectableExpression<QS> for InSubselect<C> where C: SelectableExpression<QS> {}

impl<C> ValidGrouping<()> for InSubselect<C> {
    type IsAggregate = is_aggregate::No;
}

impl<C> QueryId for InSubselect<C> {
    type QueryId = ();

    const HAS_STATIC_QUERY_ID: bool = false;
}

impl<C: QueryFragment<Pg>> QueryFragment<Pg> for InSubselect<C> {
    fn walk_ast<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        self.column.walk_ast(out.reborrow())?;
        out.push_sql(if self.negated { " NOT IN (" } else { " IN (" });
        self.subquery.walk_ast(out.reborrow())?;
        out.push_sql(")");
        Ok(())
    }
}

/// Boxes `column [NOT] IN (subquery)` as a predicate on table `T`.
pub fn in_subselect<T, C, Q>(column: C, subquery: Q, negated: bool) -> BoxedPredicate<T>
where
    T: 'static,
    C: SelectableExpression<T> + QueryFragment<Pg> + Send + 'static,
    Q: QueryFragment<Pg> + Send + 'static,
{
    Box::new(InSubselect::new(column, subquery, negated))
}

/// Defines `fn $name(&StringFilter) -> BoxedPredicate<$table::table>` for a text column.
macro_rules! text_column {
    ($name:ident, $table:ident, $column:expr) => {
        fn $name(
            filter: &$crate::types::StringFilter,
        ) -> $crate::query::predicate::BoxedPredicate<$table::table> {
            use diesel::prelude::*;
            use $crate::query::predicate::{
                boxed, contains_pattern, escape_like, negate, prefix_pattern, suffix_pattern,
            };
            use $crate::types::{QueryMode, StringFilter};

            let column = $column;
            match filter {
                StringFilter::Equals(value, QueryMode::Default) => {
                    boxed(column.eq(value.clone()).nullable())
                }
                StringFilter::Equals(value, QueryMode::Insensitive) => {
                    boxed(column.ilike(escape_like(value)).nullable())
                }
                StringFilter::In(values) => boxed(column.eq_any(values.clone()).nullable()),
                StringFilter::NotIn(values) => boxed(column.ne_all(values.clone()).nullable()),
                StringFilter::Lt(value) => boxed(column.lt(value.clone()).nullable()),
                StringFilter::Lte(value) => boxed(column.le(value.clone()).nullable()),
                StringFilter::Gt(value) => boxed(column.gt(value.clone()).nullable()),
                StringFilter::Gte(value) => boxed(column.ge(value.clone()).nullable()),
                StringFilter::Contains(value, QueryMode::Default) => {
                    boxed(column.like(contains_pattern(value)).nullable())
                }
                StringFilter::Contains(value, QueryMode::Insensitive) => {
                    boxed(column.ilike(contains_pattern(value)).nullable())
                }
                StringFilter::StartsWith(value, QueryMode::Default) => {
                    boxed(column.like(prefix_pattern(value)).nullable())
                }
                StringFilter::StartsWith(value, QueryMode::Insensitive) => {
                    boxed(column.ilike(prefix_pattern(value)).nullable())
                }
                StringFilter::EndsWith(value, QueryMode::Default) => {
                    boxed(column.like(suffix_pattern(value)).nullable())
                }
                StringFilter::EndsWith(value, QueryMode::Insensitive) => {
                    boxed(column.ilike(suffix_pattern(value)).nullable())
                }
                StringFilter::Not(inner) => negate($name(inner)),
            }
        }
    };
}

/// Defines a predicate fn for an integer, boolean or timestamp column.
///
/// `$convert` maps the filter operand into the column's Rust type.
macro_rules! scalar_column {
    ($name:ident, $table:ident, $column:expr, $ty:ty, $convert:path) => {
        fn $name(
            filter: &$crate::types::ScalarFilter<$ty>,
        ) -> $crate::query::predicate::BoxedPredicate<$table::table> {
            use diesel::prelude::*;
            use $crate::query::predicate::{boxed, negate};
            use $crate::types::ScalarFilter;

            let column = $column;
            match filter {
                ScalarFilter::Equals(value) => boxed(column.eq($convert(*value)).nullable()),
                ScalarFilter::In(values) => boxed(
                    column
                        .eq_any(values.iter().copied().map($convert).collect::<Vec<_>>())
                        .nullable(),
                ),
                ScalarFilter::NotIn(values) => boxed(
                    column
                        .ne_all(values.iter().copied().map($convert).collect::<Vec<_>>())
                        .nullable(),
                ),
                ScalarFilter::Lt(value) => boxed(column.lt($convert(*value)).nullable()),
                ScalarFilter::Lte(value) => boxed(column.le($convert(*value)).nullable()),
                ScalarFilter::Gt(value) => boxed(column.gt($convert(*value)).nullable()),
                ScalarFilter::Gte(value) => boxed(column.ge($convert(*value)).nullable()),
                ScalarFilter::Not(inner) => negate($name(inner)),
            }
        }
    };
}

/// Defines a predicate fn for a `text[]` column.
macro_rules! list_column {
    ($name:ident, $table:ident, $column:expr) => {
        fn $name(
            filter: &$crate::types::StringListFilter,
        ) -> $crate::query::predicate::BoxedPredicate<$table::table> {
            use diesel::prelude::*;
            use $crate::query::predicate::boxed;
            use $crate::types::StringListFilter;

            let column = $column;
            match filter {
                StringListFilter::Has(value) => {
                    boxed(column.contains(vec![value.clone()]).nullable())
                }
                StringListFilter::HasEvery(values) => {
                    boxed(column.contains(values.clone()).nullable())
                }
                StringListFilter::HasSome(values) => {
                    boxed(column.overlaps_with(values.clone()).nullable())
                }
                StringListFilter::IsEmpty(true) => {
                    boxed(column.eq(Vec::<String>::new()).nullable())
                }
                StringListFilter::IsEmpty(false) => {
                    boxed(column.ne(Vec::<String>::new()).nullable())
                }
                StringListFilter::Equals(values) => boxed(column.eq(values.clone()).nullable()),
            }
        }
    };
}

/// Defines a predicate fn for a nullable column on top of the fn `$inner`
/// generated for its `assume_not_null()` form.
macro_rules! nullable_column {
    ($name:ident, $table:ident, $column:expr, $filter:ty, $inner:ident) => {
        fn $name(
            filter: &$crate::types::NullableFilter<$filter>,
        ) -> $crate::query::predicate::BoxedPredicate<$table::table> {
            use diesel::prelude::*;
            use $crate::query::predicate::boxed;
            use $crate::types::NullableFilter;

            let column = $column;
            match filter {
                NullableFilter::IsNull => boxed(column.is_null().nullable()),
                NullableFilter::IsNotNull => boxed(column.is_not_null().nullable()),
                NullableFilter::Value(inner) => {
                    boxed(column.is_not_null().nullable().and($inner(inner)))
                }
            }
        }
    };
}

/// Compiles a [`ListRelationFilter`](crate::types::ListRelationFilter) on a
/// to-many relation.
///
/// `every` keeps parents without a child whose predicate is not `TRUE`.
macro_rules! to_many {
    ($filter:expr, $parent_key:expr, $child:ident, $child_key:expr, $compile:path) => {{
        use diesel::prelude::*;
        use $crate::query::predicate::in_subselect;
        use $crate::types::ListRelationFilter;

        match $filter {
            ListRelationFilter::Some(inner) => in_subselect(
                $parent_key,
                $child::table
                    .filter($compile(inner))
                    .filter($child_key.is_not_null())
                    .select($child_key),
                false,
            ),
            ListRelationFilter::None(inner) => in_subselect(
                $parent_key,
                $child::table
                    .filter($compile(inner))
                    .filter($child_key.is_not_null())
                    .select($child_key),
                true,
            ),
            ListRelationFilter::Every(inner) => in_subselect(
                $parent_key,
                $child::table
                    .filter($compile(inner).is_distinct_from(true))
                    .filter($child_key.is_not_null())
                    .select($child_key),
                true,
            ),
        }
    }};
}

/// Compiles a [`RelationFilter`](crate::types::RelationFilter) on a to-one
/// relation. `optional` relations also match a `NULL` key for `is_not`.
macro_rules! to_one {
    (required $filter:expr, $key:expr, $parent:ident, $compile:path) => {{
        use diesel::prelude::*;
        use $crate::query::predicate::in_subselect;
        use $crate::types::RelationFilter;

        match $filter {
            RelationFilter::Is(inner) => in_subselect(
                $key,
                $parent::table.filter($compile(inner)).select($parent::id),
                false,
            ),
            RelationFilter::IsNot(inner) => in_subselect(
                $key,
                $parent::table.filter($compile(inner)).select($parent::id),
                true,
            ),
        }
    }};
    (optional $filter:expr, $key:expr, $parent:ident, $compile:path) => {{
        use diesel::prelude::*;
        use $crate::query::predicate::{boxed, in_subselect};
        use $crate::types::RelationFilter;

        match $filter {
            RelationFilter::Is(inner) => in_subselect(
                $key,
                $parent::table.filter($compile(inner)).select($parent::id),
                false,
            ),
            RelationFilter::IsNot(inner) => boxed(
                $key.is_null().nullable().or(in_subselect(
                    $key,
                    $parent::table.filter($compile(inner)).select($parent::id),
                    true,
                )),
            ),
        }
    }};
}

/// Appends `ORDER BY column ASC|DESC` to a boxed query.
macro_rules! order_column {
    ($query:expr, $column:expr, $order:expr) => {
        match $order {
            $crate::types::SortOrder::Asc => $query.then_order_by($column.asc()),
            $crate::types::SortOrder::Desc => $query.then_order_by($column.desc()),
        }
    };
}

/// Defines `fn order` and `fn column` for a field enum from its
/// field-to-column mapping.
///
/// `order` appends `ORDER BY column ASC|DESC` to a boxed query of `$table`;
/// `column` boxes the qualified column for hand-built statements.
macro_rules! field_columns {
    ($table:ident, $field:ident { $($variant:ident => $column:ident),+ $(,)? }) => {
        fn order(
            query: $table::BoxedQuery<'static, diesel::pg::Pg>,
            sort: $crate::types::SortBy<$field>,
        ) -> $table::BoxedQuery<'static, diesel::pg::Pg> {
            use diesel::prelude::*;

            match sort.field {
                $($field::$variant => {
                    $crate::query::predicate::order_column!(query, $table::$column, sort.order)
                })+
            }
        }

        fn column(field: $field) -> $crate::query::statement::Fragment {
            match field {
                $($field::$variant => Box::new($table::$column),)+
            }
        }
    };
}

pub(crate) use {
    field_columns, list_column, nullable_column, order_column, scalar_column, text_column,
    to_many, to_one,
};

#[cfg(test)]
mod tests {
    use diesel::debug_query;

    use super::*;
    use crate::schema::{memberships, users};
    use crate::types::{ListRelationFilter, NullableFilter, StringFilter, StringListFilter};

    text_column!(email_filter, users, users::email);
    text_column!(password_value, users, users::password.assume_not_null());
    nullable_column!(password_filter, users, users::password, StringFilter, password_value);
    list_column!(auth_filter, memberships, memberships::auth_methods);

    fn render<P>(predicate: P) -> String
    where
        P: Expression<SqlType = Nullable<Bool>>
            + AppearsOnTable<users::table>
            + ValidGrouping<(), IsAggregate = is_aggregate::No>
            + QueryFragment<Pg>,
    {
        let query = users::table.filter(predicate).select(users::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(prefix_pattern("ab"), "ab%");
        assert_eq!(suffix_pattern("ab"), "%ab");
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        let sql = render(and_all::<users::table, _>(Vec::new()));
        assert!(sql.contains("WHERE TRUE"), "{sql}");

        let sql = render(or_any::<users::table, _>(Vec::new()));
        assert!(sql.contains("WHERE FALSE"), "{sql}");
    }

    #[test]
    fn insensitive_contains_uses_ilike() {
        let sql = render(email_filter(&StringFilter::contains("50%").insensitive()));
        assert!(sql.contains("\"users\".\"email\" ILIKE $1"), "{sql}");
        assert!(sql.contains("50\\\\%"), "{sql}");
    }

    #[test]
    fn negation_wraps_the_inner_condition() {
        let sql = render(email_filter(&StringFilter::equals("a@b.c").not()));
        assert!(sql.contains("NOT ("), "{sql}");
        assert!(sql.contains("\"users\".\"email\" = $1"), "{sql}");
    }

    #[test]
    fn nullable_value_requires_non_null() {
        let filter = NullableFilter::Value(StringFilter::starts_with("$argon"));
        let sql = render(password_filter(&filter));
        assert!(sql.contains("\"users\".\"password\" IS NOT NULL"), "{sql}");
        assert!(sql.contains("LIKE $1"), "{sql}");

        let sql = render(password_filter(&NullableFilter::IsNull));
        assert!(sql.contains("\"users\".\"password\" IS NULL"), "{sql}");
    }

    #[test]
    fn list_filters_use_array_operators() {
        let filter = StringListFilter::HasSome(vec!["rfid".into(), "qr".into()]);
        let query = memberships::table
            .filter(auth_filter(&filter))
            .select(memberships::id);
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("\"memberships\".\"auth_methods\" && $1"), "{sql}");
    }

    #[test]
    fn relation_filters_render_subselects() {
        fn compile_membership(
            filter: &StringFilter,
        ) -> BoxedPredicate<memberships::table> {
            let column = memberships::access_role;
            match filter {
                StringFilter::Equals(value, _) => boxed(column.eq(value.clone()).nullable()),
                _ => always(),
            }
        }

        let filter = ListRelationFilter::some(StringFilter::equals("owner"));
        let predicate: BoxedPredicate<users::table> = to_many!(
            &filter,
            users::id,
            memberships,
            memberships::user_id,
            compile_membership
        );
        let sql = render(predicate);
        assert!(
            sql.contains("\"users\".\"id\" IN (SELECT \"memberships\".\"user_id\""),
            "{sql}"
        );

        let filter = ListRelationFilter::every(StringFilter::equals("owner"));
        let predicate: BoxedPredicate<users::table> = to_many!(
            &filter,
            users::id,
            memberships,
            memberships::user_id,
            compile_membership
        );
        let sql = render(predicate);
        assert!(sql.contains("NOT IN (SELECT"), "{sql}");
        assert!(sql.contains("IS DISTINCT FROM"), "{sql}");
    }
}
