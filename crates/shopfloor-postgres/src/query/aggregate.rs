//! Aggregates and grouping computed by the database.
//!
//! Selections, `having` trees and group orderings are turned into an
//! [`AggregateStatement`] through a `column(field)` mapping, so the same
//! code serves every model. The statement returns one `text[]` per row,
//! decoded here into [`AggregateResult`] and [`GroupByRow`].

use std::collections::BTreeMap;

use serde::Serialize;

use super::statement::{
    AggregateStatement, Comparison, Condition, Fragment, Function, Operand, Output, Term,
};
use crate::types::{FieldKind, ScalarField, ScalarFilter, ScalarValue, SortOrder};
use crate::{PgError, PgResult};

/// Aggregates to compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSelection<F> {
    /// `_count._all`
    pub count_all: bool,
    /// `_count` per field (non-null values).
    pub count: Vec<F>,
    /// `_avg`
    pub avg: Vec<F>,
    /// `_sum`
    pub sum: Vec<F>,
    /// `_min`
    pub min: Vec<F>,
    /// `_max`
    pub max: Vec<F>,
}

impl<F> Default for AggregateSelection<F> {
    fn default() -> Self {
        Self {
            count_all: false,
            count: Vec::new(),
            avg: Vec::new(),
            sum: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
        }
    }
}

impl<F: ScalarField> AggregateSelection<F> {
    /// Selects nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every row.
    pub fn count_all(mut self) -> Self {
        self.count_all = true;
        self
    }

    /// Counts non-null values of `field`.
    pub fn count(mut self, field: F) -> Self {
        self.count.push(field);
        self
    }

    /// Averages `field`.
    pub fn avg(mut self, field: F) -> Self {
        self.avg.push(field);
        self
    }

    /// Sums `field`.
    pub fn sum(mut self, field: F) -> Self {
        self.sum.push(field);
        self
    }

    /// Smallest value of `field`.
    pub fn min(mut self, field: F) -> Self {
        self.min.push(field);
        self
    }

    /// Largest value of `field`.
    pub fn max(mut self, field: F) -> Self {
        self.max.push(field);
        self
    }

    /// Rejects averages or sums of non-numeric fields and extremes of lists.
    pub fn validate(&self) -> PgResult<()> {
        for field in self.avg.iter().chain(&self.sum) {
            ensure_numeric(*field)?;
        }
        for field in self.min.iter().chain(&self.max) {
            ensure_comparable(*field)?;
        }
        Ok(())
    }

    /// Selected aggregates in the order they are rendered.
    fn targets(&self) -> Vec<AggregateTarget<F>> {
        let mut targets = Vec::new();
        if self.count_all {
            targets.push(AggregateTarget::CountAll);
        }
        targets.extend(self.count.iter().map(|field| AggregateTarget::Count(*field)));
        targets.extend(self.avg.iter().map(|field| AggregateTarget::Avg(*field)));
        targets.extend(self.sum.iter().map(|field| AggregateTarget::Sum(*field)));
        targets.extend(self.min.iter().map(|field| AggregateTarget::Min(*field)));
        targets.extend(self.max.iter().map(|field| AggregateTarget::Max(*field)));
        targets
    }

    /// Computes the selection over the rows of `table` matching `filter`.
    pub(crate) fn statement(
        &self,
        table: &'static str,
        filter: Fragment,
        column: impl Fn(F) -> Fragment,
    ) -> PgResult<AggregateStatement> {
        let select = self
            .targets()
            .into_iter()
            .map(|target| target.term(&column))
            .collect::<PgResult<_>>()?;
        Ok(AggregateStatement::new(table, filter, select))
    }

    /// Reads the single row of [`statement`](Self::statement).
    pub(crate) fn decode(&self, rows: Vec<Vec<Option<String>>>) -> PgResult<AggregateResult<F>> {
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| PgError::Unexpected("aggregate returned no row".into()))?;
        self.read(row)
    }

    fn read(&self, row: Vec<Option<String>>) -> PgResult<AggregateResult<F>> {
        let targets = self.targets();
        if row.len() != targets.len() {
            return Err(PgError::Unexpected(
                format!(
                    "aggregate returned {} values for {} terms",
                    row.len(),
                    targets.len()
                )
                .into(),
            ));
        }

        let mut result = AggregateResult::default();
        for (target, text) in targets.into_iter().zip(row) {
            let value = target.output()?.decode(text)?;
            result.record(target, value);
        }
        Ok(result)
    }
}

fn ensure_numeric<F: ScalarField>(field: F) -> PgResult<()> {
    if field.is_numeric() {
        Ok(())
    } else {
        Err(PgError::validation(format!(
            "field `{}` is not numeric and cannot be averaged or summed",
            field.name()
        )))
    }
}

fn ensure_comparable<F: ScalarField>(field: F) -> PgResult<()> {
    if field.is_comparable() {
        Ok(())
    } else {
        Err(PgError::validation(format!(
            "field `{}` has no ordering",
            field.name()
        )))
    }
}

/// Computed aggregates. Fields that were not selected are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult<F: Ord> {
    /// `_count._all`
    #[serde(rename = "_count_all", skip_serializing_if = "Option::is_none")]
    pub count_all: Option<i64>,
    /// `_count`
    #[serde(rename = "_count")]
    pub count: BTreeMap<F, i64>,
    /// `_avg`, `Null` when there is no value to average.
    #[serde(rename = "_avg")]
    pub avg: BTreeMap<F, ScalarValue>,
    /// `_sum`, `Null` when there is no value to sum.
    #[serde(rename = "_sum")]
    pub sum: BTreeMap<F, ScalarValue>,
    /// `_min`
    #[serde(rename = "_min")]
    pub min: BTreeMap<F, ScalarValue>,
    /// `_max`
    #[serde(rename = "_max")]
    pub max: BTreeMap<F, ScalarValue>,
}

impl<F: Ord> Default for AggregateResult<F> {
    fn default() -> Self {
        Self {
            count_all: None,
            count: BTreeMap::new(),
            avg: BTreeMap::new(),
            sum: BTreeMap::new(),
            min: BTreeMap::new(),
            max: BTreeMap::new(),
        }
    }
}

impl<F: Ord> AggregateResult<F> {
    fn record(&mut self, target: AggregateTarget<F>, value: ScalarValue) {
        match target {
            AggregateTarget::Field(_) => {}
            AggregateTarget::CountAll => self.count_all = Some(value.as_int().unwrap_or(0)),
            AggregateTarget::Count(field) => {
                self.count.insert(field, value.as_int().unwrap_or(0));
            }
            AggregateTarget::Avg(field) => {
                self.avg.insert(field, value);
            }
            AggregateTarget::Sum(field) => {
                self.sum.insert(field, value);
            }
            AggregateTarget::Min(field) => {
                self.min.insert(field, value);
            }
            AggregateTarget::Max(field) => {
                self.max.insert(field, value);
            }
        }
    }
}

/// Something an aggregate-aware filter or ordering can look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateTarget<F> {
    /// A grouping field.
    Field(F),
    /// Number of rows in the group.
    CountAll,
    /// Non-null values of the field.
    Count(F),
    /// Average of the field.
    Avg(F),
    /// Sum of the field.
    Sum(F),
    /// Smallest value of the field.
    Min(F),
    /// Largest value of the field.
    Max(F),
}

impl<F: ScalarField> AggregateTarget<F> {
    fn validate(self, by: &[F]) -> PgResult<()> {
        match self {
            AggregateTarget::Field(field) if !by.contains(&field) => {
                Err(PgError::validation(format!(
                    "field `{}` must appear in `by` to be used here",
                    field.name()
                )))
            }
            AggregateTarget::Avg(field) | AggregateTarget::Sum(field) => ensure_numeric(field),
            AggregateTarget::Min(field) | AggregateTarget::Max(field) => {
                ensure_comparable(field)
            }
            _ => Ok(()),
        }
    }

    /// Name used in validation messages, e.g. `_avg.year`.
    fn label(self) -> String {
        match self {
            AggregateTarget::Field(field) => field.name().to_owned(),
            AggregateTarget::CountAll => "_count._all".to_owned(),
            AggregateTarget::Count(field) => format!("_count.{}", field.name()),
            AggregateTarget::Avg(field) => format!("_avg.{}", field.name()),
            AggregateTarget::Sum(field) => format!("_sum.{}", field.name()),
            AggregateTarget::Min(field) => format!("_min.{}", field.name()),
            AggregateTarget::Max(field) => format!("_max.{}", field.name()),
        }
    }

    /// Kind of the value the target evaluates to.
    ///
    /// Sums of integer columns are `bigint`, averages are `numeric`.
    fn output(self) -> PgResult<Output> {
        match self {
            AggregateTarget::CountAll | AggregateTarget::Count(_) | AggregateTarget::Sum(_) => {
                Ok(Output::Int)
            }
            AggregateTarget::Avg(_) => Ok(Output::Decimal),
            AggregateTarget::Field(field)
            | AggregateTarget::Min(field)
            | AggregateTarget::Max(field) => Output::of(field.kind()).ok_or_else(|| {
                PgError::validation(format!("list field `{}` has no scalar value", field.name()))
            }),
        }
    }

    fn term(self, column: &impl Fn(F) -> Fragment) -> PgResult<Term> {
        let output = self.output()?;
        let (function, field) = match self {
            AggregateTarget::CountAll => return Ok(Term::count_all()),
            AggregateTarget::Field(field) => (Function::Column, field),
            AggregateTarget::Count(field) => (Function::Count, field),
            AggregateTarget::Avg(field) => (Function::Avg, field),
            AggregateTarget::Sum(field) => (Function::Sum, field),
            // PostgreSQL has no MIN/MAX over booleans.
            AggregateTarget::Min(field) if field.kind() == FieldKind::Bool => {
                (Function::Every, field)
            }
            AggregateTarget::Max(field) if field.kind() == FieldKind::Bool => {
                (Function::Any, field)
            }
            AggregateTarget::Min(field) => (Function::Min, field),
            AggregateTarget::Max(field) => (Function::Max, field),
        };
        Ok(Term::new(function, column(field), output))
    }

    /// `target` satisfies `filter`.
    ///
    /// `NULL` only satisfies `equals: null`; every other comparison with a
    /// `NULL` target is not true, as in SQL.
    fn condition(
        self,
        filter: &ScalarFilter<ScalarValue>,
        column: &impl Fn(F) -> Fragment,
    ) -> PgResult<Condition> {
        let output = self.output()?;
        let operand = |value: &ScalarValue| {
            if !output.accepts(value) {
                return Err(PgError::validation(format!(
                    "cannot compare `{}` with a {} value",
                    self.label(),
                    value.type_name()
                )));
            }
            Operand::bind(value)
        };
        let compare = |op: Comparison, value: &ScalarValue| -> PgResult<Condition> {
            Ok(Condition::Compare(self.term(column)?, op, operand(value)?))
        };
        let within = |values: &[ScalarValue], negated: bool| -> PgResult<Condition> {
            let operands = values.iter().map(&operand).collect::<PgResult<_>>()?;
            Ok(Condition::In(self.term(column)?, operands, negated))
        };

        match filter {
            ScalarFilter::Equals(ScalarValue::Null) => Ok(Condition::IsNull(self.term(column)?)),
            ScalarFilter::Equals(value) => compare(Comparison::Eq, value),
            ScalarFilter::In(values) => within(values, false),
            ScalarFilter::NotIn(values) => within(values, true),
            ScalarFilter::Lt(value) => compare(Comparison::Lt, value),
            ScalarFilter::Lte(value) => compare(Comparison::Lte, value),
            ScalarFilter::Gt(value) => compare(Comparison::Gt, value),
            ScalarFilter::Gte(value) => compare(Comparison::Gte, value),
            ScalarFilter::Not(inner) => Ok(Condition::Not(Box::new(self.condition(inner, column)?))),
        }
    }
}

/// Aggregate-aware condition on a group (`having`).
#[derive(Debug, Clone, PartialEq)]
pub enum Having<F> {
    /// All conditions hold.
    And(Vec<Having<F>>),
    /// At least one condition holds.
    Or(Vec<Having<F>>),
    /// The condition does not hold.
    Not(Box<Having<F>>),
    /// The target satisfies the filter.
    Condition(AggregateTarget<F>, ScalarFilter<ScalarValue>),
}

impl<F: ScalarField> Having<F> {
    /// `target` satisfies `filter`.
    pub fn condition(target: AggregateTarget<F>, filter: ScalarFilter<ScalarValue>) -> Self {
        Self::Condition(target, filter)
    }

    fn validate(&self, by: &[F]) -> PgResult<()> {
        match self {
            Having::And(items) | Having::Or(items) => {
                items.iter().try_for_each(|item| item.validate(by))
            }
            Having::Not(inner) => inner.validate(by),
            Having::Condition(target, _) => target.validate(by),
        }
    }

    fn compile(&self, column: &impl Fn(F) -> Fragment) -> PgResult<Condition> {
        Ok(match self {
            Having::And(items) => Condition::All(
                items
                    .iter()
                    .map(|item| item.compile(column))
                    .collect::<PgResult<_>>()?,
            ),
            Having::Or(items) => Condition::Any(
                items
                    .iter()
                    .map(|item| item.compile(column))
                    .collect::<PgResult<_>>()?,
            ),
            Having::Not(inner) => Condition::Not(Box::new(inner.compile(column)?)),
            Having::Condition(target, filter) => target.condition(filter, column)?,
        })
    }
}

/// Ordering key of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOrder<F> {
    /// Value to sort on.
    pub target: AggregateTarget<F>,
    /// Direction.
    pub order: SortOrder,
}

impl<F> GroupOrder<F> {
    /// Ascending on `target`.
    pub fn asc(target: AggregateTarget<F>) -> Self {
        Self {
            target,
            order: SortOrder::Asc,
        }
    }

    /// Descending on `target`.
    pub fn desc(target: AggregateTarget<F>) -> Self {
        Self {
            target,
            order: SortOrder::Desc,
        }
    }
}

/// Grouping, filtering and windowing of groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping<F> {
    /// Fields whose values form the group key.
    pub by: Vec<F>,
    /// Condition on groups.
    pub having: Option<Having<F>>,
    /// Group ordering.
    pub order_by: Vec<GroupOrder<F>>,
    /// Groups to skip.
    pub skip: Option<i64>,
    /// Maximum groups to return.
    pub take: Option<i64>,
    /// Aggregates computed per group.
    pub select: AggregateSelection<F>,
}

impl<F: ScalarField> Grouping<F> {
    /// Groups by `by`.
    pub fn new(by: impl IntoIterator<Item = F>) -> Self {
        Self {
            by: by.into_iter().collect(),
            having: None,
            order_by: Vec::new(),
            skip: None,
            take: None,
            select: AggregateSelection::default(),
        }
    }

    /// Rejects groupings that cannot be evaluated.
    pub fn validate(&self) -> PgResult<()> {
        if self.by.is_empty() {
            return Err(PgError::validation("group_by needs at least one field"));
        }
        if let Some(field) = self.by.iter().find(|field| field.kind() == FieldKind::TextList) {
            return Err(PgError::validation(format!(
                "cannot group by list field `{}`",
                field.name()
            )));
        }
        if (self.skip.is_some() || self.take.is_some()) && self.order_by.is_empty() {
            return Err(PgError::validation(
                "skip and take on group_by require order_by",
            ));
        }
        if self.skip.is_some_and(|skip| skip < 0) || self.take.is_some_and(|take| take < 0) {
            return Err(PgError::validation(
                "skip and take on group_by must not be negative",
            ));
        }
        if let Some(having) = &self.having {
            having.validate(&self.by)?;
        }
        for order in &self.order_by {
            order.target.validate(&self.by)?;
        }
        self.select.validate()
    }

    /// Groups the rows of `table` matching `filter`.
    ///
    /// Groups and their ordering follow the database, collation included.
    pub(crate) fn statement(
        &self,
        table: &'static str,
        filter: Fragment,
        column: impl Fn(F) -> Fragment,
    ) -> PgResult<AggregateStatement> {
        let select = self
            .by
            .iter()
            .map(|field| AggregateTarget::Field(*field))
            .chain(self.select.targets())
            .map(|target| target.term(&column))
            .collect::<PgResult<_>>()?;
        let having = self
            .having
            .as_ref()
            .map(|having| having.compile(&column))
            .transpose()?;
        let order_by = self
            .order_by
            .iter()
            .map(|order| Ok((order.target.term(&column)?, order.order)))
            .collect::<PgResult<_>>()?;

        Ok(AggregateStatement::new(table, filter, select)
            .group_by(self.by.iter().map(|field| column(*field)).collect())
            .having(having)
            .order_by(order_by)
            .window(self.skip, self.take))
    }

    /// Reads the rows of [`statement`](Self::statement).
    pub(crate) fn decode(&self, rows: Vec<Vec<Option<String>>>) -> PgResult<Vec<GroupByRow<F>>> {
        rows.into_iter()
            .map(|mut row| {
                if row.len() < self.by.len() {
                    return Err(PgError::Unexpected("group row is missing its key".into()));
                }
                let aggregates = row.split_off(self.by.len());
                let values = self
                    .by
                    .iter()
                    .zip(row)
                    .map(|(field, text)| {
                        let value = AggregateTarget::Field(*field).output()?.decode(text)?;
                        Ok((*field, value))
                    })
                    .collect::<PgResult<_>>()?;

                Ok(GroupByRow {
                    values,
                    aggregates: self.select.read(aggregates)?,
                })
            })
            .collect()
    }
}

/// One group of a `group_by` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupByRow<F: Ord> {
    /// Values of the grouping fields.
    #[serde(flatten)]
    pub values: BTreeMap<F, ScalarValue>,
    /// Aggregates of the group.
    #[serde(flatten)]
    pub aggregates: AggregateResult<F>,
}

impl<F: Ord> GroupByRow<F> {
    /// Value of a grouping field.
    pub fn get(&self, field: F) -> Option<&ScalarValue> {
        self.values.get(&field)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fmt;

    use bigdecimal::BigDecimal;
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;
    use crate::model::Vehicle;
    use crate::query::{Entity, VehicleField, VehicleWhere};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
    pub(crate) enum JobField {
        Stage,
        Minutes,
        Tags,
    }

    impl fmt::Display for JobField {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    impl ScalarField for JobField {
        const ALL: &'static [Self] = &[JobField::Stage, JobField::Minutes, JobField::Tags];

        fn name(self) -> &'static str {
            match self {
                JobField::Stage => "stage",
                JobField::Minutes => "minutes",
                JobField::Tags => "tags",
            }
        }

        fn kind(self) -> FieldKind {
            match self {
                JobField::Stage => FieldKind::Text,
                JobField::Minutes => FieldKind::Int,
                JobField::Tags => FieldKind::TextList,
            }
        }

        fn is_nullable(self) -> bool {
            self == JobField::Minutes
        }
    }

    pub(crate) struct Job(pub &'static str, pub Option<i32>);

    pub(crate) fn job_value(job: &Job, field: JobField) -> ScalarValue {
        match field {
            JobField::Stage => job.0.into(),
            JobField::Minutes => job.1.into(),
            JobField::Tags => ScalarValue::TextList(Vec::new()),
        }
    }

    fn row(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|value| value.map(str::to_owned)).collect()
    }

    fn everything() -> Fragment {
        Vehicle::predicate(&VehicleWhere::default())
    }

    fn render(statement: &AggregateStatement) -> String {
        debug_query::<Pg, _>(statement).to_string()
    }

    #[test]
    fn decodes_selection_in_render_order() {
        let select = AggregateSelection::new()
            .count_all()
            .count(JobField::Minutes)
            .avg(JobField::Minutes)
            .sum(JobField::Minutes)
            .min(JobField::Minutes)
            .max(JobField::Stage);
        let values = row(&[
            Some("5"),
            Some("3"),
            Some("30.0000000000000000"),
            Some("90"),
            Some("10"),
            Some("wash"),
        ]);
        let result = select.decode(vec![values]).unwrap();

        assert_eq!(result.count_all, Some(5));
        assert_eq!(result.count[&JobField::Minutes], 3);
        assert_eq!(
            result.avg[&JobField::Minutes],
            ScalarValue::Decimal(BigDecimal::from(30))
        );
        assert_eq!(result.sum[&JobField::Minutes], ScalarValue::Int(90));
        assert_eq!(result.min[&JobField::Minutes], ScalarValue::Int(10));
        assert_eq!(result.max[&JobField::Stage], ScalarValue::from("wash"));
    }

    #[test]
    fn empty_input_yields_null_aggregates() {
        let select = AggregateSelection::new()
            .count_all()
            .avg(JobField::Minutes)
            .sum(JobField::Minutes);
        let result = select.decode(vec![row(&[Some("0"), None, None])]).unwrap();

        assert_eq!(result.count_all, Some(0));
        assert_eq!(result.avg[&JobField::Minutes], ScalarValue::Null);
        assert_eq!(result.sum[&JobField::Minutes], ScalarValue::Null);
    }

    #[test]
    fn short_rows_are_rejected() {
        let select = AggregateSelection::new().count_all().sum(JobField::Minutes);
        assert!(select.decode(vec![row(&[Some("1")])]).is_err());
        assert!(select.decode(Vec::new()).is_err());
    }

    #[test]
    fn averaging_text_is_rejected() {
        let select = AggregateSelection::new().avg(JobField::Stage);
        assert!(select.validate().is_err());

        let select = AggregateSelection::new().max(JobField::Tags);
        assert!(select.validate().is_err());
    }

    #[test]
    fn selection_is_computed_in_sql() {
        let select = AggregateSelection::new()
            .count_all()
            .avg(VehicleField::Year)
            .sum(VehicleField::Year)
            .min(VehicleField::IsActive)
            .max(VehicleField::EntryTime);
        let statement = select
            .statement(Vehicle::TABLE, everything(), Vehicle::column)
            .unwrap();
        let sql = render(&statement);

        assert!(sql.contains("CAST(COUNT(*) AS text)"), "{sql}");
        assert!(sql.contains("CAST(AVG(\"vehicles\".\"year\") AS text)"), "{sql}");
        assert!(sql.contains("CAST(SUM(\"vehicles\".\"year\") AS text)"), "{sql}");
        assert!(sql.contains("CAST(BOOL_AND(\"vehicles\".\"is_active\") AS text)"), "{sql}");
        assert!(sql.contains("to_char((MAX(\"vehicles\".\"entry_time\"))"), "{sql}");
        assert!(sql.contains("FROM \"vehicles\" WHERE TRUE"), "{sql}");
    }

    #[test]
    fn group_by_renders_having_order_and_window() {
        let mut grouping = Grouping::new([VehicleField::Brand]);
        grouping.select = AggregateSelection::new().count_all().sum(VehicleField::Year);
        grouping.having = Some(Having::condition(
            AggregateTarget::CountAll,
            ScalarFilter::Gte(ScalarValue::Int(2)),
        ));
        grouping.order_by = vec![GroupOrder::desc(AggregateTarget::Sum(VehicleField::Year))];
        grouping.take = Some(2);
        grouping.validate().unwrap();

        let statement = grouping
            .statement(Vehicle::TABLE, everything(), Vehicle::column)
            .unwrap();
        let sql = render(&statement);

        assert!(
            sql.starts_with("SELECT ARRAY[CAST(\"vehicles\".\"brand\" AS text), CAST(COUNT(*) AS text)"),
            "{sql}"
        );
        assert!(sql.contains("GROUP BY \"vehicles\".\"brand\""), "{sql}");
        assert!(sql.contains("HAVING COUNT(*) >= $1"), "{sql}");
        assert!(
            sql.contains("ORDER BY SUM(\"vehicles\".\"year\") DESC LIMIT $2"),
            "{sql}"
        );
    }

    #[test]
    fn text_groups_keep_database_order() {
        let mut grouping = Grouping::new([VehicleField::Brand]);
        grouping.order_by = vec![GroupOrder::asc(AggregateTarget::Field(VehicleField::Brand))];
        let statement = grouping
            .statement(Vehicle::TABLE, everything(), Vehicle::column)
            .unwrap();
        let sql = render(&statement);
        assert!(sql.contains("ORDER BY \"vehicles\".\"brand\" ASC"), "{sql}");

        // A collation-aware database sorts `audi` before `BMW`; byte order would not.
        let rows = grouping
            .decode(vec![row(&[Some("audi")]), row(&[Some("BMW")])])
            .unwrap();
        assert_eq!(rows[0].get(VehicleField::Brand), Some(&ScalarValue::from("audi")));
        assert_eq!(rows[1].get(VehicleField::Brand), Some(&ScalarValue::from("BMW")));
    }

    #[test]
    fn having_null_and_negation() {
        let mut grouping = Grouping::new([VehicleField::Brand]);
        grouping.having = Some(Having::Or(vec![
            Having::condition(
                AggregateTarget::Min(VehicleField::Year),
                ScalarFilter::Equals(ScalarValue::Null),
            ),
            Having::condition(
                AggregateTarget::Avg(VehicleField::Year),
                ScalarFilter::Gt(ScalarValue::Int(2010)).not(),
            ),
        ]));
        let statement = grouping
            .statement(Vehicle::TABLE, everything(), Vehicle::column)
            .unwrap();
        let sql = render(&statement);
        assert!(
            sql.contains(
                "HAVING (MIN(\"vehicles\".\"year\") IS NULL) OR \
                 (NOT (AVG(\"vehicles\".\"year\") > $1))"
            ),
            "{sql}"
        );
    }

    #[test]
    fn having_operand_must_match_the_target() {
        let mut grouping = Grouping::new([VehicleField::Brand]);
        grouping.having = Some(Having::condition(
            AggregateTarget::Avg(VehicleField::Year),
            ScalarFilter::Gt(ScalarValue::from("old")),
        ));
        assert!(
            grouping
                .statement(Vehicle::TABLE, everything(), Vehicle::column)
                .is_err()
        );
    }

    #[test]
    fn decodes_group_keys_and_aggregates() {
        let mut grouping = Grouping::new([JobField::Stage]);
        grouping.select = AggregateSelection::new().count_all().max(JobField::Minutes);
        let rows = grouping
            .decode(vec![
                row(&[Some("paint"), Some("2"), Some("50")]),
                row(&[None, Some("1"), None]),
            ])
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(JobField::Stage), Some(&ScalarValue::from("paint")));
        assert_eq!(rows[0].aggregates.count_all, Some(2));
        assert_eq!(rows[0].aggregates.max[&JobField::Minutes], ScalarValue::Int(50));
        assert_eq!(rows[1].get(JobField::Stage), Some(&ScalarValue::Null));
        assert_eq!(rows[1].aggregates.max[&JobField::Minutes], ScalarValue::Null);
    }

    #[test]
    fn window_requires_order() {
        let mut grouping = Grouping::new([JobField::Stage]);
        grouping.take = Some(1);
        assert!(grouping.validate().is_err());

        grouping.order_by = vec![GroupOrder::asc(AggregateTarget::Field(JobField::Stage))];
        assert!(grouping.validate().is_ok());
    }

    #[test]
    fn having_on_ungrouped_field_is_rejected() {
        let mut grouping = Grouping::new([JobField::Stage]);
        grouping.having = Some(Having::condition(
            AggregateTarget::Field(JobField::Minutes),
            ScalarFilter::Gt(ScalarValue::Int(0)),
        ));
        assert!(grouping.validate().is_err());
    }

    #[test]
    fn grouping_by_list_is_rejected() {
        assert!(Grouping::new([JobField::Tags]).validate().is_err());
    }
}
