//! Hand-built statements for reads whose column list is only known at run
//! time: distinct windows, aggregates and groups.
//!
//! The typed DSL carries the selected columns in the query type, so these
//! statements walk boxed column fragments instead. Every selected value is
//! rendered as text and decoded by its [`Output`] kind, which keeps the row
//! type a fixed `text[]`.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{AstPass, Query, QueryFragment, QueryId};
use diesel::sql_types::{Array, BigInt, Bool, Nullable, Text, Timestamptz};
use jiff::Timestamp;

use super::entity::{Entity, SelectQuery};
use crate::types::{FieldKind, ScalarValue, SortOrder};
use crate::{PgError, PgResult};

/// Type-erased piece of SQL.
pub type Fragment = Box<dyn QueryFragment<Pg> + Send>;

/// Primary keys of the first row of every distinct combination of
/// `partition`, where first follows `order`.
///
/// ```sql
/// SELECT "distinct_rows"."id" FROM (
///     SELECT "t"."id" AS "id", row_number() OVER (PARTITION BY .. ORDER BY ..) AS "position"
///     FROM "t" WHERE ..
/// ) AS "distinct_rows" WHERE "distinct_rows"."position" = 1
/// ```
pub struct DistinctIds {
    table: &'static str,
    id: Fragment,
    partition: Vec<Fragment>,
    order: Vec<(Fragment, SortOrder)>,
    filter: Fragment,
}

/// Distinct rows of `query` by its `distinct` fields.
pub(crate) fn distinct_ids<M: Entity>(query: &SelectQuery<M>) -> DistinctIds {
    DistinctIds {
        table: M::TABLE,
        id: M::column(M::ID),
        partition: query.distinct.iter().map(|field| M::column(*field)).collect(),
        order: query
            .order_by
            .iter()
            .map(|sort| (M::column(sort.field), sort.order))
            .collect(),
        filter: M::predicate(&query.filter),
    }
}

impl QueryFragment<Pg> for DistinctIds {
    fn walk_ast<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        out.push_sql("SELECT \"distinct_rows\".\"id\" FROM (SELECT ");
        self.id.walk_ast(out.reborrow())?;
        out.push_sql(" AS \"id\", row_number() OVER (PARTITION BY ");
        comma_separated(&self.partition, out.reborrow())?;
        if !self.order.is_empty() {
            out.push_sql(" ORDER BY ");
            for (i, (column, order)) in self.order.iter().enumerate() {
                if i > 0 {
                    out.push_sql(", ");
                }
                column.walk_ast(out.reborrow())?;
                push_direction(*order, out.reborrow());
            }
        }
        out.push_sql(") AS \"position\" FROM ");
        out.push_identifier(self.table)?;
        out.push_sql(" WHERE ");
        self.filter.walk_ast(out.reborrow())?;
        out.push_sql(") AS \"distinct_rows\" WHERE \"distinct_rows\".\"position\" = 1");
        Ok(())
    }
}

/// Kind of a selected value once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// `bigint` or `integer`.
    Int,
    /// `numeric`.
    Decimal,
    /// `boolean`.
    Bool,
    /// `text`.
    Text,
    /// `timestamptz`, rendered as RFC 3339 in UTC.
    Timestamp,
}

impl Output {
    /// Kind of a column of `kind`. Lists have no scalar rendering.
    pub fn of(kind: FieldKind) -> Option<Self> {
        match kind {
            FieldKind::Int => Some(Output::Int),
            FieldKind::Bool => Some(Output::Bool),
            FieldKind::Text => Some(Output::Text),
            FieldKind::Timestamp => Some(Output::Timestamp),
            FieldKind::TextList => None,
        }
    }

    /// Parses the text rendering of a value.
    pub fn decode(self, text: Option<String>) -> PgResult<ScalarValue> {
        let Some(text) = text else {
            return Ok(ScalarValue::Null);
        };

        let malformed = |kind: &str| {
            PgError::Unexpected(format!("malformed {kind} value `{text}` in aggregate").into())
        };
        Ok(match self {
            Output::Int => ScalarValue::Int(text.parse().map_err(|_| malformed("integer"))?),
            Output::Decimal => {
                ScalarValue::Decimal(BigDecimal::from_str(&text).map_err(|_| malformed("decimal"))?)
            }
            Output::Bool => match text.as_str() {
                "true" => ScalarValue::Bool(true),
                "false" => ScalarValue::Bool(false),
                _ => return Err(malformed("boolean")),
            },
            Output::Text => ScalarValue::Text(text),
            Output::Timestamp => ScalarValue::Timestamp(
                text.parse::<Timestamp>()
                    .map_err(|_| malformed("timestamp"))?,
            ),
        })
    }

    /// Returns whether `value` can be compared against a value of this kind.
    pub fn accepts(self, value: &ScalarValue) -> bool {
        matches!(
            (self, value),
            (
                Output::Int | Output::Decimal,
                ScalarValue::Int(_) | ScalarValue::Decimal(_)
            ) | (Output::Bool, ScalarValue::Bool(_))
                | (Output::Text, ScalarValue::Text(_))
                | (Output::Timestamp, ScalarValue::Timestamp(_))
        )
    }
}

/// SQL function applied to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// The bare column.
    Column,
    /// `COUNT(*)`
    CountAll,
    /// `COUNT(column)`
    Count,
    /// `AVG(column)`
    Avg,
    /// `SUM(column)`
    Sum,
    /// `MIN(column)`
    Min,
    /// `MAX(column)`
    Max,
    /// `BOOL_AND(column)`, the minimum of a boolean.
    Every,
    /// `BOOL_OR(column)`, the maximum of a boolean.
    Any,
}

impl Function {
    fn name(self) -> Option<&'static str> {
        match self {
            Function::Column | Function::CountAll => None,
            Function::Count => Some("COUNT"),
            Function::Avg => Some("AVG"),
            Function::Sum => Some("SUM"),
            Function::Min => Some("MIN"),
            Function::Max => Some("MAX"),
            Function::Every => Some("BOOL_AND"),
            Function::Any => Some("BOOL_OR"),
        }
    }
}

/// One selected, compared or ordered expression.
pub struct Term {
    function: Function,
    column: Option<Fragment>,
    output: Output,
}

impl Term {
    /// `COUNT(*)`.
    pub fn count_all() -> Self {
        Self {
            function: Function::CountAll,
            column: None,
            output: Output::Int,
        }
    }

    /// `function(column)`.
    pub fn new(function: Function, column: Fragment, output: Output) -> Self {
        Self {
            function,
            column: Some(column),
            output,
        }
    }

    /// Kind of the value this term produces.
    pub fn output(&self) -> Output {
        self.output
    }

    fn walk_value<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        match (self.function, &self.column) {
            (Function::CountAll, _) => out.push_sql("COUNT(*)"),
            (Function::Column, Some(column)) => column.walk_ast(out.reborrow())?,
            (function, Some(column)) => {
                out.push_sql(function.name().unwrap_or_default());
                out.push_sql("(");
                column.walk_ast(out.reborrow())?;
                out.push_sql(")");
            }
            (_, None) => {
                return Err(diesel::result::Error::QueryBuilderError(
                    "aggregate term without a column".into(),
                ));
            }
        }
        Ok(())
    }

    fn walk_text<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        if self.output == Output::Timestamp {
            out.push_sql("to_char((");
            self.walk_value(out.reborrow())?;
            out.push_sql(") AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.US\"Z\"')");
        } else {
            out.push_sql("CAST(");
            self.walk_value(out.reborrow())?;
            out.push_sql(" AS text)");
        }
        Ok(())
    }
}

/// Bound right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    Int(i64),
    Numeric(String),
    Bool(bool),
    Text(String),
    Timestamp(jiff_diesel::Timestamp),
}

impl Operand {
    /// Binds a non-null scalar. Lists and `NULL` cannot be bound.
    pub fn bind(value: &ScalarValue) -> PgResult<Self> {
        Ok(match value {
            ScalarValue::Int(value) => Operand::Int(*value),
            ScalarValue::Decimal(value) => Operand::Numeric(value.to_string()),
            ScalarValue::Bool(value) => Operand::Bool(*value),
            ScalarValue::Text(value) => Operand::Text(value.clone()),
            ScalarValue::Timestamp(value) => Operand::Timestamp(jiff_diesel::Timestamp::from(*value)),
            ScalarValue::Null | ScalarValue::TextList(_) => {
                return Err(PgError::validation(format!(
                    "cannot compare against a {} value",
                    value.type_name()
                )));
            }
        })
    }

    fn walk_ast<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        match self {
            Operand::Int(value) => out.push_bind_param::<BigInt, _>(value)?,
            Operand::Numeric(value) => {
                out.push_sql("CAST(");
                out.push_bind_param::<Text, _>(value)?;
                out.push_sql(" AS numeric)");
            }
            Operand::Bool(value) => out.push_bind_param::<Bool, _>(value)?,
            Operand::Text(value) => out.push_bind_param::<Text, _>(value)?,
            Operand::Timestamp(value) => out.push_bind_param::<Timestamptz, _>(value)?,
        }
        Ok(())
    }
}

/// Comparison operator of a `HAVING` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => " = ",
            Comparison::Lt => " < ",
            Comparison::Lte => " <= ",
            Comparison::Gt => " > ",
            Comparison::Gte => " >= ",
        }
    }
}

/// `HAVING` condition tree.
pub enum Condition {
    /// Every condition holds; `TRUE` when empty.
    All(Vec<Condition>),
    /// Some condition holds; `FALSE` when empty.
    Any(Vec<Condition>),
    /// `NOT (condition)`.
    Not(Box<Condition>),
    /// `term <op> operand`.
    Compare(Term, Comparison, Operand),
    /// `term [NOT] IN (operands)`.
    In(Term, Vec<Operand>, bool),
    /// `term IS NULL`.
    IsNull(Term),
}

impl Condition {
    fn walk_ast<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        match self {
            Condition::All(items) | Condition::Any(items) if items.is_empty() => {
                out.push_sql(if matches!(self, Condition::All(_)) { "TRUE" } else { "FALSE" });
            }
            Condition::All(items) | Condition::Any(items) => {
                let joint = if matches!(self, Condition::All(_)) { " AND " } else { " OR " };
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_sql(joint);
                    }
                    out.push_sql("(");
                    item.walk_ast(out.reborrow())?;
                    out.push_sql(")");
                }
            }
            Condition::Not(inner) => {
                out.push_sql("NOT (");
                inner.walk_ast(out.reborrow())?;
                out.push_sql(")");
            }
            Condition::Compare(term, op, operand) => {
                term.walk_value(out.reborrow())?;
                out.push_sql(op.sql());
                operand.walk_ast(out.reborrow())?;
            }
            Condition::In(_, operands, negated) if operands.is_empty() => {
                out.push_sql(if *negated { "TRUE" } else { "FALSE" });
            }
            Condition::In(term, operands, negated) => {
                term.walk_value(out.reborrow())?;
                out.push_sql(if *negated { " NOT IN (" } else { " IN (" });
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        out.push_sql(", ");
                    }
                    operand.walk_ast(out.reborrow())?;
                }
                out.push_sql(")");
            }
            Condition::IsNull(term) => {
                term.walk_value(out.reborrow())?;
                out.push_sql(" IS NULL");
            }
        }
        Ok(())
    }
}

/// `SELECT ARRAY[..]::text[] FROM "t" WHERE .. [GROUP BY ..] [HAVING ..]
/// [ORDER BY ..] [LIMIT ..] [OFFSET ..]`
pub struct AggregateStatement {
    table: &'static str,
    filter: Fragment,
    select: Vec<Term>,
    group_by: Vec<Fragment>,
    having: Option<Condition>,
    order_by: Vec<(Term, SortOrder)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl AggregateStatement {
    /// Selects `select` over the rows of `table` matching `filter`.
    pub fn new(table: &'static str, filter: Fragment, select: Vec<Term>) -> Self {
        Self {
            table,
            filter,
            select,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Groups on `columns`.
    pub fn group_by(mut self, columns: Vec<Fragment>) -> Self {
        self.group_by = columns;
        self
    }

    /// Keeps groups satisfying `condition`.
    pub fn having(mut self, condition: Option<Condition>) -> Self {
        self.having = condition;
        self
    }

    /// Orders the groups.
    pub fn order_by(mut self, order_by: Vec<(Term, SortOrder)>) -> Self {
        self.order_by = order_by;
        self
    }

    /// Windows the groups.
    pub fn window(mut self, offset: Option<i64>, limit: Option<i64>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

impl QueryId for AggregateStatement {
    type QueryId = ();

    const HAS_STATIC_QUERY_ID: bool = false;
}

impl Query for AggregateStatement {
    type SqlType = Array<Nullable<Text>>;
}

impl QueryFragment<Pg> for AggregateStatement {
    fn walk_ast<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        out.push_sql("SELECT ARRAY[");
        for (i, term) in self.select.iter().enumerate() {
            if i > 0 {
                out.push_sql(", ");
            }
            term.walk_text(out.reborrow())?;
        }
        out.push_sql("]::text[] FROM ");
        out.push_identifier(self.table)?;
        out.push_sql(" WHERE ");
        self.filter.walk_ast(out.reborrow())?;

        if !self.group_by.is_empty() {
            out.push_sql(" GROUP BY ");
            comma_separated(&self.group_by, out.reborrow())?;
        }
        if let Some(having) = &self.having {
            out.push_sql(" HAVING ");
            having.walk_ast(out.reborrow())?;
        }
        if !self.order_by.is_empty() {
            out.push_sql(" ORDER BY ");
            for (i, (term, order)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    out.push_sql(", ");
                }
                term.walk_value(out.reborrow())?;
                push_direction(*order, out.reborrow());
            }
        }
        if let Some(limit) = &self.limit {
            out.push_sql(" LIMIT ");
            out.push_bind_param::<BigInt, _>(limit)?;
        }
        if let Some(offset) = &self.offset {
            out.push_sql(" OFFSET ");
            out.push_bind_param::<BigInt, _>(offset)?;
        }
        Ok(())
    }
}

fn comma_separated<'b>(fragments: &'b [Fragment], mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
    for (i, fragment) in fragments.iter().enumerate() {
        if i > 0 {
            out.push_sql(", ");
        }
        fragment.walk_ast(out.reborrow())?;
    }
    Ok(())
}

fn push_direction(order: SortOrder, mut out: AstPass<'_, '_, Pg>) {
    out.push_sql(match order {
        SortOrder::Asc => " ASC",
        SortOrder::Desc => " DESC",
    });
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;

    use super::*;
    use crate::schema::vehicles;

    fn column<C>(column: C) -> Fragment
    where
        C: QueryFragment<Pg> + Send + 'static,
    {
        Box::new(column)
    }

    fn render(statement: &AggregateStatement) -> String {
        debug_query::<Pg, _>(statement).to_string()
    }

    #[test]
    fn selects_a_text_array() {
        let statement = AggregateStatement::new(
            "vehicles",
            column(diesel::dsl::sql::<Bool>("TRUE")),
            vec![
                Term::count_all(),
                Term::new(Function::Avg, column(vehicles::year), Output::Decimal),
                Term::new(Function::Max, column(vehicles::entry_time), Output::Timestamp),
            ],
        );
        let sql = render(&statement);
        assert!(
            sql.starts_with(
                "SELECT ARRAY[CAST(COUNT(*) AS text), CAST(AVG(\"vehicles\".\"year\") AS text), \
                 to_char((MAX(\"vehicles\".\"entry_time\")) AT TIME ZONE 'UTC'"
            ),
            "{sql}"
        );
        assert!(sql.contains("]::text[] FROM \"vehicles\" WHERE TRUE"), "{sql}");
        assert!(!sql.contains("GROUP BY"), "{sql}");
    }

    #[test]
    fn groups_filter_order_and_window() {
        let statement = AggregateStatement::new(
            "vehicles",
            column(diesel::dsl::sql::<Bool>("TRUE")),
            vec![Term::new(Function::Column, column(vehicles::brand), Output::Text)],
        )
        .group_by(vec![column(vehicles::brand)])
        .having(Some(Condition::All(vec![
            Condition::Compare(Term::count_all(), Comparison::Gte, Operand::Int(2)),
            Condition::Not(Box::new(Condition::IsNull(Term::new(
                Function::Min,
                column(vehicles::year),
                Output::Int,
            )))),
        ])))
        .order_by(vec![(Term::count_all(), SortOrder::Desc)])
        .window(Some(1), Some(5));
        let sql = render(&statement);

        assert!(sql.contains("GROUP BY \"vehicles\".\"brand\""), "{sql}");
        assert!(
            sql.contains("HAVING (COUNT(*) >= $1) AND (NOT (MIN(\"vehicles\".\"year\") IS NULL))"),
            "{sql}"
        );
        assert!(sql.contains("ORDER BY COUNT(*) DESC LIMIT $2 OFFSET $3"), "{sql}");
    }

    #[test]
    fn empty_membership_lists_are_constant() {
        let statement = AggregateStatement::new(
            "vehicles",
            column(diesel::dsl::sql::<Bool>("TRUE")),
            vec![Term::count_all()],
        )
        .group_by(vec![column(vehicles::brand)])
        .having(Some(Condition::Any(vec![
            Condition::In(Term::count_all(), Vec::new(), false),
            Condition::In(Term::count_all(), Vec::new(), true),
        ])));
        let sql = render(&statement);
        assert!(sql.contains("HAVING (FALSE) OR (TRUE)"), "{sql}");
    }

    #[test]
    fn decimal_operands_are_cast() {
        let statement = AggregateStatement::new(
            "vehicles",
            column(diesel::dsl::sql::<Bool>("TRUE")),
            vec![Term::count_all()],
        )
        .group_by(vec![column(vehicles::brand)])
        .having(Some(Condition::Compare(
            Term::new(Function::Avg, column(vehicles::year), Output::Decimal),
            Comparison::Gt,
            Operand::bind(&ScalarValue::Decimal("2010.5".parse().unwrap())).unwrap(),
        )));
        let sql = render(&statement);
        assert!(sql.contains("AVG(\"vehicles\".\"year\") > CAST($1 AS numeric)"), "{sql}");
    }

    #[test]
    fn distinct_ids_partition_and_keep_the_first() {
        let ids = DistinctIds {
            table: "vehicles",
            id: column(vehicles::id),
            partition: vec![column(vehicles::brand), column(vehicles::model)],
            order: vec![
                (column(vehicles::year), SortOrder::Desc),
                (column(vehicles::id), SortOrder::Asc),
            ],
            filter: column(diesel::dsl::sql::<Bool>("TRUE")),
        };
        let sql = debug_query::<Pg, _>(&ids).to_string();
        assert!(
            sql.contains(
                "row_number() OVER (PARTITION BY \"vehicles\".\"brand\", \"vehicles\".\"model\" \
                 ORDER BY \"vehicles\".\"year\" DESC, \"vehicles\".\"id\" ASC)"
            ),
            "{sql}"
        );
        assert!(sql.contains("FROM \"vehicles\" WHERE TRUE"), "{sql}");
        assert!(sql.ends_with("WHERE \"distinct_rows\".\"position\" = 1 -- binds: []"), "{sql}");
    }

    #[test]
    fn decodes_text_renderings() {
        assert_eq!(Output::Int.decode(Some("42".into())).unwrap(), ScalarValue::Int(42));
        assert_eq!(
            Output::Decimal.decode(Some("30.0000000000000000".into())).unwrap(),
            ScalarValue::Decimal(BigDecimal::from(30))
        );
        assert_eq!(Output::Bool.decode(Some("false".into())).unwrap(), ScalarValue::Bool(false));
        assert_eq!(
            Output::Timestamp
                .decode(Some("2025-01-10T08:30:00.000000Z".into()))
                .unwrap(),
            ScalarValue::Timestamp("2025-01-10T08:30:00Z".parse().unwrap())
        );
        assert_eq!(Output::Text.decode(None).unwrap(), ScalarValue::Null);
        assert!(Output::Int.decode(Some("4.5".into())).is_err());
    }

    #[test]
    fn operands_match_output_kinds() {
        assert!(Output::Decimal.accepts(&ScalarValue::Int(3)));
        assert!(Output::Int.accepts(&ScalarValue::Decimal(BigDecimal::from(3))));
        assert!(!Output::Text.accepts(&ScalarValue::Int(3)));
        assert!(Operand::bind(&ScalarValue::Null).is_err());
    }
}
