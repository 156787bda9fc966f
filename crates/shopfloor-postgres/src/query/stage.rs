//! Stage filters, delegate hooks and repository.

use std::future::Future;

use diesel::dsl::min;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, index_by_id, where_input};
use super::organization::{self, OrganizationWhere};
use super::predicate::{
    BoxedPredicate, and_all, field_columns, negate, nullable_column, or_any, scalar_column,
    text_column, to_many, to_one,
};
use super::task::{self, TaskWhere};
use super::vehicle::{self, VehicleWhere};
use crate::model::{NewStage, Organization, Stage, Task, UpdateStage, Vehicle};
use crate::schema::{organizations, stages, tasks, vehicles};
use crate::types::{
    BoolFilter, CmpOp, CompareFilter, DateTimeFilter, FieldKind, IntFilter, ListRelationFilter,
    NullableFilter, RelationFilter, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY};

/// Scalar fields of [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageField {
    Id,
    Name,
    Icon,
    ColorHsl,
    Category,
    Sequence,
    IsActive,
    IsRequired,
    OrganizationId,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for StageField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Name,
        Self::Icon,
        Self::ColorHsl,
        Self::Category,
        Self::Sequence,
        Self::IsActive,
        Self::IsRequired,
        Self::OrganizationId,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Sequence => FieldKind::Int,
            Self::IsActive | Self::IsRequired => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(self, Self::Icon | Self::ColorHsl | Self::Category)
    }
}

/// Filter tree over stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum StageWhere {
    And(Vec<StageWhere>),
    Or(Vec<StageWhere>),
    Not(Box<StageWhere>),
    Id(StringFilter),
    Name(StringFilter),
    Icon(NullableFilter<StringFilter>),
    ColorHsl(NullableFilter<StringFilter>),
    Category(NullableFilter<StringFilter>),
    Sequence(IntFilter),
    IsActive(BoolFilter),
    IsRequired(BoolFilter),
    OrganizationId(StringFilter),
    CreatedAt(DateTimeFilter),
    UpdatedAt(DateTimeFilter),
    Organization(RelationFilter<OrganizationWhere>),
    Tasks(ListRelationFilter<TaskWhere>),
    /// Vehicles currently occupying the stage.
    VehiclesInStage(ListRelationFilter<VehicleWhere>),
}

where_input!(StageWhere);

/// Unique selectors of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum StageWhereUnique {
    Id(String),
    OrganizationIdSequence {
        organization_id: String,
        sequence: i32,
    },
}

impl From<StageWhereUnique> for StageWhere {
    fn from(unique: StageWhereUnique) -> Self {
        match unique {
            StageWhereUnique::Id(id) => StageWhere::Id(StringFilter::equals(id)),
            StageWhereUnique::OrganizationIdSequence {
                organization_id,
                sequence,
            } => StageWhere::And(vec![
                StageWhere::OrganizationId(StringFilter::equals(organization_id)),
                StageWhere::Sequence(IntFilter::Equals(sequence)),
            ]),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageInclude {
    pub organization: bool,
    pub tasks: bool,
    pub vehicles_in_stage: bool,
}

/// A stage with its included relations.
#[derive(Debug, Clone, PartialEq)]
pub struct StageWithRelations {
    pub stage: Stage,
    pub organization: Option<Organization>,
    pub tasks: Option<Vec<Task>>,
    pub vehicles_in_stage: Option<Vec<Vehicle>>,
}

text_column!(id_filter, stages, stages::id);
text_column!(name_filter, stages, stages::name);
text_column!(icon_value, stages, stages::icon.assume_not_null());
nullable_column!(icon_filter, stages, stages::icon, StringFilter, icon_value);
text_column!(color_hsl_value, stages, stages::color_hsl.assume_not_null());
nullable_column!(color_hsl_filter, stages, stages::color_hsl, StringFilter, color_hsl_value);
text_column!(category_value, stages, stages::category.assume_not_null());
nullable_column!(category_filter, stages, stages::category, StringFilter, category_value);
scalar_column!(sequence_filter, stages, stages::sequence, i32, std::convert::identity);
scalar_column!(is_active_filter, stages, stages::is_active, bool, std::convert::identity);
scalar_column!(is_required_filter, stages, stages::is_required, bool, std::convert::identity);
text_column!(organization_id_filter, stages, stages::organization_id);
scalar_column!(created_at_filter, stages, stages::created_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(updated_at_filter, stages, stages::updated_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles a stage filter into a predicate on `stages`.
pub(crate) fn compile(filter: &StageWhere) -> BoxedPredicate<stages::table> {
    match filter {
        StageWhere::And(items) => and_all(items.iter().map(compile)),
        StageWhere::Or(items) => or_any(items.iter().map(compile)),
        StageWhere::Not(inner) => negate(compile(inner)),
        StageWhere::Id(f) => id_filter(f),
        StageWhere::Name(f) => name_filter(f),
        StageWhere::Icon(f) => icon_filter(f),
        StageWhere::ColorHsl(f) => color_hsl_filter(f),
        StageWhere::Category(f) => category_filter(f),
        StageWhere::Sequence(f) => sequence_filter(f),
        StageWhere::IsActive(f) => is_active_filter(f),
        StageWhere::IsRequired(f) => is_required_filter(f),
        StageWhere::OrganizationId(f) => organization_id_filter(f),
        StageWhere::CreatedAt(f) => created_at_filter(f),
        StageWhere::UpdatedAt(f) => updated_at_filter(f),
        StageWhere::Organization(f) => to_one!(
            required f,
            stages::organization_id,
            organizations,
            organization::compile
        ),
        StageWhere::Tasks(f) => to_many!(f, stages::id, tasks, tasks::stage_id, task::compile),
        StageWhere::VehiclesInStage(f) => to_many!(
            f,
            stages::id,
            vehicles,
            vehicles::current_stage_id,
            vehicle::compile
        ),
    }
}

field_columns!(stages, StageField {
    Id => id,
    Name => name,
    Icon => icon,
    ColorHsl => color_hsl,
    Category => category,
    Sequence => sequence,
    IsActive => is_active,
    IsRequired => is_required,
    OrganizationId => organization_id,
    CreatedAt => created_at,
    UpdatedAt => updated_at,
});

impl Entity for Stage {
    type Create = NewStage;
    type Field = StageField;
    type Include = StageInclude;
    type Unique = StageWhereUnique;
    type Update = UpdateStage;
    type Where = StageWhere;
    type WithRelations = StageWithRelations;

    const ID: StageField = StageField::Id;
    const MODEL: &'static str = "Stage";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: StageField) -> ScalarValue {
        match field {
            StageField::Id => self.id.clone().into(),
            StageField::Name => self.name.clone().into(),
            StageField::Icon => self.icon.clone().into(),
            StageField::ColorHsl => self.color_hsl.clone().into(),
            StageField::Category => self.category.clone().into(),
            StageField::Sequence => self.sequence.into(),
            StageField::IsActive => self.is_active.into(),
            StageField::IsRequired => self.is_required.into(),
            StageField::OrganizationId => self.organization_id.clone().into(),
            StageField::CreatedAt => self.created_at.into(),
            StageField::UpdatedAt => self.updated_at.into(),
        }
    }

    fn field_where(field: StageField, op: CmpOp, value: ScalarValue) -> PgResult<StageWhere> {
        use StageWhere as W;

        Ok(match field {
            StageField::Id => W::Id(CompareFilter::compare(op, value)?),
            StageField::Name => W::Name(CompareFilter::compare(op, value)?),
            StageField::Icon => W::Icon(CompareFilter::compare(op, value)?),
            StageField::ColorHsl => W::ColorHsl(CompareFilter::compare(op, value)?),
            StageField::Category => W::Category(CompareFilter::compare(op, value)?),
            StageField::Sequence => W::Sequence(CompareFilter::compare(op, value)?),
            StageField::IsActive => W::IsActive(CompareFilter::compare(op, value)?),
            StageField::IsRequired => W::IsRequired(CompareFilter::compare(op, value)?),
            StageField::OrganizationId => W::OrganizationId(CompareFilter::compare(op, value)?),
            StageField::CreatedAt => W::CreatedAt(CompareFilter::compare(op, value)?),
            StageField::UpdatedAt => W::UpdatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: StageWhereUnique) -> StageWhere {
        unique.into()
    }

    entity_queries!(stages, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<Stage>,
        include: StageInclude,
    ) -> PgResult<Vec<StageWithRelations>> {
        let organizations = if include.organization && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|s| s.organization_id.clone()));
            Some(index_by_id::<Organization>(conn, OrganizationWhere::Id(ids)).await?)
        } else {
            None
        };

        let mut tasks = if include.tasks && !rows.is_empty() {
            let children: Vec<Task> = Task::belonging_to(&rows)
                .select(Task::as_select())
                .order((tasks::vehicle_id.asc(), tasks::sequence.asc()))
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        let mut vehicles = if include.vehicles_in_stage && !rows.is_empty() {
            let children: Vec<Vehicle> = Vehicle::belonging_to(&rows)
                .select(Vehicle::as_select())
                .order(vehicles::entry_time.asc())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|stage| StageWithRelations {
                organization: organizations
                    .as_ref()
                    .and_then(|index| index.get(&stage.organization_id).cloned()),
                tasks: tasks.as_mut().and_then(Iterator::next),
                vehicles_in_stage: vehicles.as_mut().and_then(Iterator::next),
                stage,
            })
            .collect())
    }
}

/// Repository for stage operations the application runs directly.
pub trait StageRepository {
    /// Lists an organization's stages in floor order.
    fn list_organization_stages(
        &mut self,
        organization_id: &str,
    ) -> impl Future<Output = PgResult<Vec<Stage>>> + Send;

    /// Finds the first active stage after `sequence`.
    fn find_next_stage(
        &mut self,
        organization_id: &str,
        sequence: i32,
    ) -> impl Future<Output = PgResult<Option<Stage>>> + Send;

    /// Swaps the floor positions of two stages of the same organization.
    fn swap_stage_sequences(
        &mut self,
        first_id: &str,
        second_id: &str,
    ) -> impl Future<Output = PgResult<(Stage, Stage)>> + Send;
}

impl StageRepository for PgConnection {
    async fn list_organization_stages(&mut self, organization_id: &str) -> PgResult<Vec<Stage>> {
        stages::table
            .filter(stages::organization_id.eq(organization_id))
            .select(Stage::as_select())
            .order(stages::sequence.asc())
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn find_next_stage(
        &mut self,
        organization_id: &str,
        sequence: i32,
    ) -> PgResult<Option<Stage>> {
        stages::table
            .filter(stages::organization_id.eq(organization_id))
            .filter(stages::sequence.gt(sequence))
            .filter(stages::is_active.eq(true))
            .select(Stage::as_select())
            .order(stages::sequence.asc())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn swap_stage_sequences(
        &mut self,
        first_id: &str,
        second_id: &str,
    ) -> PgResult<(Stage, Stage)> {
        if first_id == second_id {
            return Err(PgError::validation("cannot swap a stage with itself"));
        }

        let ids = vec![first_id.to_owned(), second_id.to_owned()];

        let swapped = self
            .transaction(|conn| {
                async move {
                    let locked: Vec<Stage> = stages::table
                        .filter(stages::id.eq_any(&ids))
                        .select(Stage::as_select())
                        .for_update()
                        .load(conn)
                        .await?;

                    let first = locked.iter().find(|s| s.id == ids[0]);
                    let second = locked.iter().find(|s| s.id == ids[1]);
                    let (Some(first), Some(second)) = (first, second) else {
                        return Err(PgError::not_found(Stage::MODEL, "swap_stage_sequences"));
                    };
                    if first.organization_id != second.organization_id {
                        return Err(PgError::validation(
                            "stages belong to different organizations",
                        ));
                    }

                    // `(organization_id, sequence)` is checked per statement, so the
                    // first stage is parked below every used position.
                    let lowest: Option<i32> = stages::table
                        .filter(stages::organization_id.eq(&first.organization_id))
                        .select(min(stages::sequence))
                        .first(conn)
                        .await?;
                    let parked = parked_sequence(lowest)?;

                    let (first_seq, second_seq) = (first.sequence, second.sequence);
                    let (first_id, second_id) = (first.id.clone(), second.id.clone());

                    diesel::update(stages::table.filter(stages::id.eq(&first_id)))
                        .set(stages::sequence.eq(parked))
                        .execute(conn)
                        .await?;
                    let second: Stage =
                        diesel::update(stages::table.filter(stages::id.eq(&second_id)))
                            .set(stages::sequence.eq(first_seq))
                            .returning(Stage::as_returning())
                            .get_result(conn)
                            .await?;
                    let first: Stage =
                        diesel::update(stages::table.filter(stages::id.eq(&first_id)))
                            .set(stages::sequence.eq(second_seq))
                            .returning(Stage::as_returning())
                            .get_result(conn)
                            .await?;

                    Ok::<_, PgError>((first, second))
                }
                .scope_boxed()
            })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            first = %swapped.0.id,
            second = %swapped.1.id,
            "Stage sequences swapped"
        );

        Ok(swapped)
    }
}

/// Free position below `lowest`, the smallest sequence in use.
fn parked_sequence(lowest: Option<i32>) -> PgResult<i32> {
    lowest
        .unwrap_or(0)
        .checked_sub(1)
        .ok_or_else(|| PgError::Unexpected("no free stage sequence".into()))
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;

    fn sql(filter: &StageWhere) -> String {
        let query = stages::table.filter(compile(filter)).select(stages::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn compound_unique_matches_organization_and_sequence() {
        let filter = StageWhere::from(StageWhereUnique::OrganizationIdSequence {
            organization_id: "org".into(),
            sequence: 3,
        });
        let sql = sql(&filter);
        assert!(sql.contains("\"stages\".\"organization_id\" = $1"), "{sql}");
        assert!(sql.contains("\"stages\".\"sequence\" = $2"), "{sql}");
    }

    #[test]
    fn vehicles_in_stage_use_current_stage_key() {
        let filter = StageWhere::VehiclesInStage(ListRelationFilter::some(VehicleWhere::IsActive(
            BoolFilter::Equals(true),
        )));
        let sql = sql(&filter);
        assert!(
            sql.contains("\"stages\".\"id\" IN (SELECT \"vehicles\".\"current_stage_id\""),
            "{sql}"
        );
        assert!(sql.contains("\"vehicles\".\"current_stage_id\" IS NOT NULL"), "{sql}");
    }

    #[test]
    fn swap_parks_below_the_lowest_sequence() {
        assert_eq!(parked_sequence(Some(1)).unwrap(), 0);
        assert_eq!(parked_sequence(Some(-4)).unwrap(), -5);
        assert_eq!(parked_sequence(None).unwrap(), -1);
        assert!(parked_sequence(Some(i32::MIN)).is_err());
    }

    #[test]
    fn sequence_key_is_checked_per_statement() {
        let up = include_str!("../../migrations/2025-01-10-000002_workshop/up.sql");
        assert!(up.contains("stages_organization_id_sequence_key UNIQUE"));
        assert!(!up.contains("DEFERRABLE"));
    }

    #[test]
    fn sequence_is_numeric_and_sortable() {
        assert!(StageField::Sequence.is_numeric());
        assert!(StageField::Sequence.is_comparable());
        assert!(StageField::Category.is_nullable());
    }
}
