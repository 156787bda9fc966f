//! Vehicle filters, delegate hooks and repository.

use std::future::Future;

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
use super::stage::{self, StageWhere};
use super::task::{self, TaskWhere};
use crate::model::{NewVehicle, Organization, Stage, Task, UpdateVehicle, Vehicle};
use crate::schema::{organizations, stages, tasks, vehicles};
use crate::types::{
    BoolFilter, CmpOp, CompareFilter, DateTimeFilter, FieldKind, IntFilter, ListRelationFilter,
    NullableFilter, OffsetPagination, RelationFilter, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY};

/// Scalar fields of [`Vehicle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VehicleField {
    Id,
    Vin,
    QrCodeToken,
    TrackingToken,
    Brand,
    Model,
    Year,
    RegistrationNumber,
    CustomerName,
    CustomerEmail,
    CustomerPhone,
    IsActive,
    Notes,
    EntryTime,
    EstimatedCompletion,
    OrganizationId,
    CurrentStageId,
}

impl ScalarField for VehicleField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Vin,
        Self::QrCodeToken,
        Self::TrackingToken,
        Self::Brand,
        Self::Model,
        Self::Year,
        Self::RegistrationNumber,
        Self::CustomerName,
        Self::CustomerEmail,
        Self::CustomerPhone,
        Self::IsActive,
        Self::Notes,
        Self::EntryTime,
        Self::EstimatedCompletion,
        Self::OrganizationId,
        Self::CurrentStageId,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Year => FieldKind::Int,
            Self::IsActive => FieldKind::Bool,
            Self::EntryTime | Self::EstimatedCompletion => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::Vin | Self::Year | Self::EstimatedCompletion | Self::CurrentStageId
        )
    }
}

/// Filter tree over vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum VehicleWhere {
    And(Vec<VehicleWhere>),
    Or(Vec<VehicleWhere>),
    Not(Box<VehicleWhere>),
    Id(StringFilter),
    Vin(NullableFilter<StringFilter>),
    QrCodeToken(StringFilter),
    TrackingToken(StringFilter),
    Brand(StringFilter),
    Model(StringFilter),
    Year(NullableFilter<IntFilter>),
    RegistrationNumber(StringFilter),
    CustomerName(StringFilter),
    CustomerEmail(StringFilter),
    CustomerPhone(StringFilter),
    IsActive(BoolFilter),
    Notes(StringFilter),
    EntryTime(DateTimeFilter),
    EstimatedCompletion(NullableFilter<DateTimeFilter>),
    OrganizationId(StringFilter),
    CurrentStageId(NullableFilter<StringFilter>),
    Organization(RelationFilter<OrganizationWhere>),
    /// Stage the vehicle currently occupies. `is_not` also matches vehicles
    /// outside any stage.
    CurrentStage(RelationFilter<StageWhere>),
    Tasks(ListRelationFilter<TaskWhere>),
}

where_input!(VehicleWhere);

/// Unique selectors of a vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum VehicleWhereUnique {
    Id(String),
    Vin(String),
    QrCodeToken(String),
    TrackingToken(String),
}

impl From<VehicleWhereUnique> for VehicleWhere {
    fn from(unique: VehicleWhereUnique) -> Self {
        match unique {
            VehicleWhereUnique::Id(id) => VehicleWhere::Id(StringFilter::equals(id)),
            VehicleWhereUnique::Vin(vin) => VehicleWhere::Vin(StringFilter::equals(vin).into()),
            VehicleWhereUnique::QrCodeToken(token) => {
                VehicleWhere::QrCodeToken(StringFilter::equals(token))
            }
            VehicleWhereUnique::TrackingToken(token) => {
                VehicleWhere::TrackingToken(StringFilter::equals(token))
            }
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleInclude {
    pub organization: bool,
    pub current_stage: bool,
    pub tasks: bool,
}

/// A vehicle with its included relations.
///
/// `current_stage` is `None` both when not requested and when the vehicle is
/// outside any stage.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleWithRelations {
    pub vehicle: Vehicle,
    pub organization: Option<Organization>,
    pub current_stage: Option<Stage>,
    pub tasks: Option<Vec<Task>>,
}

text_column!(id_filter, vehicles, vehicles::id);
text_column!(vin_value, vehicles, vehicles::vin.assume_not_null());
nullable_column!(vin_filter, vehicles, vehicles::vin, StringFilter, vin_value);
text_column!(qr_code_token_filter, vehicles, vehicles::qr_code_token);
text_column!(tracking_token_filter, vehicles, vehicles::tracking_token);
text_column!(brand_filter, vehicles, vehicles::brand);
text_column!(model_filter, vehicles, vehicles::model);
scalar_column!(year_value, vehicles, vehicles::year.assume_not_null(), i32, std::convert::identity);
nullable_column!(year_filter, vehicles, vehicles::year, IntFilter, year_value);
text_column!(registration_number_filter, vehicles, vehicles::registration_number);
text_column!(customer_name_filter, vehicles, vehicles::customer_name);
text_column!(customer_email_filter, vehicles, vehicles::customer_email);
text_column!(customer_phone_filter, vehicles, vehicles::customer_phone);
scalar_column!(is_active_filter, vehicles, vehicles::is_active, bool, std::convert::identity);
text_column!(notes_filter, vehicles, vehicles::notes);
scalar_column!(entry_time_filter, vehicles, vehicles::entry_time, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(
    estimated_completion_value,
    vehicles,
    vehicles::estimated_completion.assume_not_null(),
    Timestamp,
    jiff_diesel::Timestamp::from
);
nullable_column!(
    estimated_completion_filter,
    vehicles,
    vehicles::estimated_completion,
    DateTimeFilter,
    estimated_completion_value
);
text_column!(organization_id_filter, vehicles, vehicles::organization_id);
text_column!(current_stage_id_value, vehicles, vehicles::current_stage_id.assume_not_null());
nullable_column!(current_stage_id_filter, vehicles, vehicles::current_stage_id, StringFilter, current_stage_id_value);

/// Compiles a vehicle filter into a predicate on `vehicles`.
pub(crate) fn compile(filter: &VehicleWhere) -> BoxedPredicate<vehicles::table> {
    match filter {
        VehicleWhere::And(items) => and_all(items.iter().map(compile)),
        VehicleWhere::Or(items) => or_any(items.iter().map(compile)),
        VehicleWhere::Not(inner) => negate(compile(inner)),
        VehicleWhere::Id(f) => id_filter(f),
        VehicleWhere::Vin(f) => vin_filter(f),
        VehicleWhere::QrCodeToken(f) => qr_code_token_filter(f),
        VehicleWhere::TrackingToken(f) => tracking_token_filter(f),
        VehicleWhere::Brand(f) => brand_filter(f),
        VehicleWhere::Model(f) => model_filter(f),
        VehicleWhere::Year(f) => year_filter(f),
        VehicleWhere::RegistrationNumber(f) => registration_number_filter(f),
        VehicleWhere::CustomerName(f) => customer_name_filter(f),
        VehicleWhere::CustomerEmail(f) => customer_email_filter(f),
        VehicleWhere::CustomerPhone(f) => customer_phone_filter(f),
        VehicleWhere::IsActive(f) => is_active_filter(f),
        VehicleWhere::Notes(f) => notes_filter(f),
        VehicleWhere::EntryTime(f) => entry_time_filter(f),
        VehicleWhere::EstimatedCompletion(f) => estimated_completion_filter(f),
        VehicleWhere::OrganizationId(f) => organization_id_filter(f),
        VehicleWhere::CurrentStageId(f) => current_stage_id_filter(f),
        VehicleWhere::Organization(f) => to_one!(
            required f,
            vehicles::organization_id,
            organizations,
            organization::compile
        ),
        VehicleWhere::CurrentStage(f) => {
            to_one!(optional f, vehicles::current_stage_id, stages, stage::compile)
        }
        VehicleWhere::Tasks(f) => {
            to_many!(f, vehicles::id, tasks, tasks::vehicle_id, task::compile)
        }
    }
}

field_columns!(vehicles, VehicleField {
    Id => id,
    Vin => vin,
    QrCodeToken => qr_code_token,
    TrackingToken => tracking_token,
    Brand => brand,
    Model => model,
    Year => year,
    RegistrationNumber => registration_number,
    CustomerName => customer_name,
    CustomerEmail => customer_email,
    CustomerPhone => customer_phone,
    IsActive => is_active,
    Notes => notes,
    EntryTime => entry_time,
    EstimatedCompletion => estimated_completion,
    OrganizationId => organization_id,
    CurrentStageId => current_stage_id,
});

impl Entity for Vehicle {
    type Create = NewVehicle;
    type Field = VehicleField;
    type Include = VehicleInclude;
    type Unique = VehicleWhereUnique;
    type Update = UpdateVehicle;
    type Where = VehicleWhere;
    type WithRelations = VehicleWithRelations;

    const ID: VehicleField = VehicleField::Id;
    const MODEL: &'static str = "Vehicle";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: VehicleField) -> ScalarValue {
        use VehicleField as F;

        match field {
            F::Id => self.id.clone().into(),
            F::Vin => self.vin.clone().into(),
            F::QrCodeToken => self.qr_code_token.clone().into(),
            F::TrackingToken => self.tracking_token.clone().into(),
            F::Brand => self.brand.clone().into(),
            F::Model => self.model.clone().into(),
            F::Year => self.year.into(),
            F::RegistrationNumber => self.registration_number.clone().into(),
            F::CustomerName => self.customer_name.clone().into(),
            F::CustomerEmail => self.customer_email.clone().into(),
            F::CustomerPhone => self.customer_phone.clone().into(),
            F::IsActive => self.is_active.into(),
            F::Notes => self.notes.clone().into(),
            F::EntryTime => self.entry_time.into(),
            F::EstimatedCompletion => self.estimated_completion.into(),
            F::OrganizationId => self.organization_id.clone().into(),
            F::CurrentStageId => self.current_stage_id.clone().into(),
        }
    }

    fn field_where(field: VehicleField, op: CmpOp, value: ScalarValue) -> PgResult<VehicleWhere> {
        use VehicleField as F;
        use VehicleWhere as W;

        Ok(match field {
            F::Id => W::Id(CompareFilter::compare(op, value)?),
            F::Vin => W::Vin(CompareFilter::compare(op, value)?),
            F::QrCodeToken => W::QrCodeToken(CompareFilter::compare(op, value)?),
            F::TrackingToken => W::TrackingToken(CompareFilter::compare(op, value)?),
            F::Brand => W::Brand(CompareFilter::compare(op, value)?),
            F::Model => W::Model(CompareFilter::compare(op, value)?),
            F::Year => W::Year(CompareFilter::compare(op, value)?),
            F::RegistrationNumber => W::RegistrationNumber(CompareFilter::compare(op, value)?),
            F::CustomerName => W::CustomerName(CompareFilter::compare(op, value)?),
            F::CustomerEmail => W::CustomerEmail(CompareFilter::compare(op, value)?),
            F::CustomerPhone => W::CustomerPhone(CompareFilter::compare(op, value)?),
            F::IsActive => W::IsActive(CompareFilter::compare(op, value)?),
            F::Notes => W::Notes(CompareFilter::compare(op, value)?),
            F::EntryTime => W::EntryTime(CompareFilter::compare(op, value)?),
            F::EstimatedCompletion => W::EstimatedCompletion(CompareFilter::compare(op, value)?),
            F::OrganizationId => W::OrganizationId(CompareFilter::compare(op, value)?),
            F::CurrentStageId => W::CurrentStageId(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: VehicleWhereUnique) -> VehicleWhere {
        unique.into()
    }

    entity_queries!(vehicles, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<Vehicle>,
        include: VehicleInclude,
    ) -> PgResult<Vec<VehicleWithRelations>> {
        let organizations = if include.organization && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|v| v.organization_id.clone()));
            Some(index_by_id::<Organization>(conn, OrganizationWhere::Id(ids)).await?)
        } else {
            None
        };

        let stages = if include.current_stage && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().filter_map(|v| v.current_stage_id.clone()));
            Some(index_by_id::<Stage>(conn, StageWhere::Id(ids)).await?)
        } else {
            None
        };

        let mut tasks = if include.tasks && !rows.is_empty() {
            let children: Vec<Task> = Task::belonging_to(&rows)
                .select(Task::as_select())
                .order((tasks::stage_id.asc(), tasks::sequence.asc()))
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|vehicle| VehicleWithRelations {
                organization: organizations
                    .as_ref()
                    .and_then(|index| index.get(&vehicle.organization_id).cloned()),
                current_stage: stages.as_ref().and_then(|index| {
                    vehicle
                        .current_stage_id
                        .as_ref()
                        .and_then(|id| index.get(id).cloned())
                }),
                tasks: tasks.as_mut().and_then(Iterator::next),
                vehicle,
            })
            .collect())
    }
}

/// Repository for vehicle lookups the application runs directly.
pub trait VehicleRepository {
    /// Finds a vehicle by the token of its public tracking link.
    fn find_vehicle_by_tracking_token(
        &mut self,
        token: &str,
    ) -> impl Future<Output = PgResult<Option<Vehicle>>> + Send;

    /// Finds a vehicle by the token on its QR tag.
    fn find_vehicle_by_qr_code_token(
        &mut self,
        token: &str,
    ) -> impl Future<Output = PgResult<Option<Vehicle>>> + Send;

    /// Finds a vehicle by VIN, ignoring case.
    fn find_vehicle_by_vin(
        &mut self,
        vin: &str,
    ) -> impl Future<Output = PgResult<Option<Vehicle>>> + Send;

    /// Lists an organization's active vehicles, most recent arrivals first.
    fn list_active_vehicles(
        &mut self,
        organization_id: &str,
        pagination: OffsetPagination,
    ) -> impl Future<Output = PgResult<Vec<Vehicle>>> + Send;

    /// Lists the active vehicles occupying a stage, earliest arrivals first.
    fn list_stage_vehicles(
        &mut self,
        stage_id: &str,
    ) -> impl Future<Output = PgResult<Vec<Vehicle>>> + Send;

    /// Moves a vehicle into a stage of its organization, or out of every
    /// stage when `stage_id` is `None`.
    ///
    /// Fails with a validation error when the stage belongs to another
    /// organization or is inactive.
    fn move_vehicle_to_stage(
        &mut self,
        vehicle_id: &str,
        stage_id: Option<&str>,
    ) -> impl Future<Output = PgResult<Vehicle>> + Send;
}

impl VehicleRepository for PgConnection {
    async fn find_vehicle_by_tracking_token(&mut self, token: &str) -> PgResult<Option<Vehicle>> {
        vehicles::table
            .filter(vehicles::tracking_token.eq(token))
            .select(Vehicle::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_vehicle_by_qr_code_token(&mut self, token: &str) -> PgResult<Option<Vehicle>> {
        vehicles::table
            .filter(vehicles::qr_code_token.eq(token))
            .select(Vehicle::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_vehicle_by_vin(&mut self, vin: &str) -> PgResult<Option<Vehicle>> {
        use super::predicate::escape_like;

        vehicles::table
            .filter(vehicles::vin.ilike(escape_like(vin.trim())))
            .select(Vehicle::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn list_active_vehicles(
        &mut self,
        organization_id: &str,
        pagination: OffsetPagination,
    ) -> PgResult<Vec<Vehicle>> {
        vehicles::table
            .filter(vehicles::organization_id.eq(organization_id))
            .filter(vehicles::is_active.eq(true))
            .select(Vehicle::as_select())
            .order((vehicles::entry_time.desc(), vehicles::id.desc()))
            .limit(pagination.limit)
            .offset(pagination.offset)
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn list_stage_vehicles(&mut self, stage_id: &str) -> PgResult<Vec<Vehicle>> {
        vehicles::table
            .filter(vehicles::current_stage_id.eq(stage_id))
            .filter(vehicles::is_active.eq(true))
            .select(Vehicle::as_select())
            .order((vehicles::entry_time.asc(), vehicles::id.asc()))
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn move_vehicle_to_stage(
        &mut self,
        vehicle_id: &str,
        stage_id: Option<&str>,
    ) -> PgResult<Vehicle> {
        let vehicle_id = vehicle_id.to_owned();
        let stage_id = stage_id.map(str::to_owned);

        let vehicle = self
            .transaction(|conn| {
                async move {
                    let organization_id: String = vehicles::table
                        .filter(vehicles::id.eq(&vehicle_id))
                        .select(vehicles::organization_id)
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| PgError::not_found(Vehicle::MODEL, "move_vehicle_to_stage"))?;

                    if let Some(stage_id) = &stage_id {
                        let stage: Option<(String, bool)> = stages::table
                            .filter(stages::id.eq(stage_id))
                            .select((stages::organization_id, stages::is_active))
                            .first(conn)
                            .await
                            .optional()?;

                        match stage {
                            None => {
                                return Err(PgError::not_found(Stage::MODEL, "move_vehicle_to_stage"));
                            }
                            Some((owner, _)) if owner != organization_id => {
                                return Err(PgError::validation(
                                    "stage belongs to another organization",
                                ));
                            }
                            Some((_, false)) => {
                                return Err(PgError::validation("stage is inactive"));
                            }
                            Some(_) => {}
                        }
                    }

                    diesel::update(vehicles::table.filter(vehicles::id.eq(&vehicle_id)))
                        .set(vehicles::current_stage_id.eq(&stage_id))
                        .returning(Vehicle::as_returning())
                        .get_result(conn)
                        .await
                        .map_err(PgError::from)
                }
                .scope_boxed()
            })
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            vehicle_id = %vehicle.id,
            stage_id = ?vehicle.current_stage_id,
            "Vehicle moved"
        );

        Ok(vehicle)
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;

    fn sql(filter: &VehicleWhere) -> String {
        let query = vehicles::table.filter(compile(filter)).select(vehicles::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn optional_stage_is_not_matches_unstaged_vehicles() {
        let filter = VehicleWhere::CurrentStage(RelationFilter::is_not(StageWhere::Name(
            StringFilter::equals("Paint"),
        )));
        let sql = sql(&filter);
        assert!(sql.contains("(\"vehicles\".\"current_stage_id\" IS NULL) OR"), "{sql}");
        assert!(
            sql.contains("\"vehicles\".\"current_stage_id\" NOT IN (SELECT \"stages\".\"id\""),
            "{sql}"
        );
    }

    #[test]
    fn optional_stage_is_requires_a_stage() {
        let filter = VehicleWhere::CurrentStage(RelationFilter::is(StageWhere::IsActive(
            BoolFilter::Equals(true),
        )));
        let sql = sql(&filter);
        assert!(!sql.contains("IS NULL"), "{sql}");
        assert!(sql.contains("\"vehicles\".\"current_stage_id\" IN (SELECT"), "{sql}");
    }

    #[test]
    fn nullable_year_range() {
        let filter = VehicleWhere::Year(NullableFilter::Value(IntFilter::Gte(2015)));
        let sql = sql(&filter);
        assert!(sql.contains("\"vehicles\".\"year\" IS NOT NULL"), "{sql}");
        assert!(sql.contains("\"vehicles\".\"year\" >= $1"), "{sql}");
    }

    #[test]
    fn vin_unique_uses_nullable_value() {
        let filter = VehicleWhere::from(VehicleWhereUnique::Vin("WVW123".into()));
        assert_eq!(
            filter,
            VehicleWhere::Vin(NullableFilter::Value(StringFilter::equals("WVW123")))
        );
    }

    #[test]
    fn year_is_numeric() {
        assert!(VehicleField::Year.is_numeric());
        assert!(!VehicleField::Brand.is_numeric());
        assert_eq!(VehicleField::EstimatedCompletion.name(), "estimated_completion");
    }
}
