//! Organization filters, delegate hooks and repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, where_input};
use super::invite::{self, InviteWhere};
use super::membership::{self, MembershipWhere};
use super::predicate::{
    BoxedPredicate, and_all, boxed, field_columns, negate, nullable_column, or_any, scalar_column,
    text_column, to_many,
};
use super::stage::{self, StageWhere};
use super::vehicle::{self, VehicleWhere};
use crate::model::{
    Invite, Membership, NewOrganization, Organization, Stage, UpdateOrganization, Vehicle,
};
use crate::schema::{invites, memberships, organizations, stages, vehicles};
use crate::types::{
    BoolFilter, CmpOp, CompareFilter, Cursor, CursorPage, CursorPagination, DateTimeFilter,
    FieldKind, ListRelationFilter, NullableFilter, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult};

/// Scalar fields of [`Organization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrganizationField {
    Id,
    Name,
    /// Stored in the `type` column.
    #[serde(rename = "type")]
    #[strum(serialize = "type")]
    Kind,
    Description,
    IsVerified,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for OrganizationField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Name,
        Self::Kind,
        Self::Description,
        Self::IsVerified,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::Name | Self::Kind | Self::Description => FieldKind::Text,
            Self::IsVerified => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(self, Self::Description)
    }
}

/// Filter tree over organizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum OrganizationWhere {
    And(Vec<OrganizationWhere>),
    Or(Vec<OrganizationWhere>),
    Not(Box<OrganizationWhere>),
    Id(StringFilter),
    Name(StringFilter),
    #[serde(rename = "type")]
    Kind(StringFilter),
    Description(NullableFilter<StringFilter>),
    IsVerified(BoolFilter),
    CreatedAt(DateTimeFilter),
    UpdatedAt(DateTimeFilter),
    Memberships(ListRelationFilter<MembershipWhere>),
    Invites(ListRelationFilter<InviteWhere>),
    Stages(ListRelationFilter<StageWhere>),
    Vehicles(ListRelationFilter<VehicleWhere>),
}

where_input!(OrganizationWhere);

/// Unique selectors of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum OrganizationWhereUnique {
    Id(String),
}

impl From<OrganizationWhereUnique> for OrganizationWhere {
    fn from(unique: OrganizationWhereUnique) -> Self {
        match unique {
            OrganizationWhereUnique::Id(id) => OrganizationWhere::Id(StringFilter::equals(id)),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizationInclude {
    pub memberships: bool,
    pub invites: bool,
    pub stages: bool,
    pub vehicles: bool,
}

/// An organization with its included relations.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationWithRelations {
    pub organization: Organization,
    pub memberships: Option<Vec<Membership>>,
    pub invites: Option<Vec<Invite>>,
    pub stages: Option<Vec<Stage>>,
    pub vehicles: Option<Vec<Vehicle>>,
}

text_column!(id_filter, organizations, organizations::id);
text_column!(name_filter, organizations, organizations::name);
text_column!(kind_filter, organizations, organizations::kind);
text_column!(description_value, organizations, organizations::description.assume_not_null());
nullable_column!(description_filter, organizations, organizations::description, StringFilter, description_value);
scalar_column!(is_verified_filter, organizations, organizations::is_verified, bool, std::convert::identity);
scalar_column!(created_at_filter, organizations, organizations::created_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(updated_at_filter, organizations, organizations::updated_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles an organization filter into a predicate on `organizations`.
pub(crate) fn compile(filter: &OrganizationWhere) -> BoxedPredicate<organizations::table> {
    match filter {
        OrganizationWhere::And(items) => and_all(items.iter().map(compile)),
        OrganizationWhere::Or(items) => or_any(items.iter().map(compile)),
        OrganizationWhere::Not(inner) => negate(compile(inner)),
        OrganizationWhere::Id(f) => id_filter(f),
        OrganizationWhere::Name(f) => name_filter(f),
        OrganizationWhere::Kind(f) => kind_filter(f),
        OrganizationWhere::Description(f) => description_filter(f),
        OrganizationWhere::IsVerified(f) => is_verified_filter(f),
        OrganizationWhere::CreatedAt(f) => created_at_filter(f),
        OrganizationWhere::UpdatedAt(f) => updated_at_filter(f),
        OrganizationWhere::Memberships(f) => to_many!(
            f,
            organizations::id,
            memberships,
            memberships::organization_id,
            membership::compile
        ),
        OrganizationWhere::Invites(f) => to_many!(
            f,
            organizations::id,
            invites,
            invites::organization_id,
            invite::compile
        ),
        OrganizationWhere::Stages(f) => to_many!(
            f,
            organizations::id,
            stages,
            stages::organization_id,
            stage::compile
        ),
        OrganizationWhere::Vehicles(f) => to_many!(
            f,
            organizations::id,
            vehicles,
            vehicles::organization_id,
            vehicle::compile
        ),
    }
}

field_columns!(organizations, OrganizationField {
    Id => id,
    Name => name,
    Kind => kind,
    Description => description,
    IsVerified => is_verified,
    CreatedAt => created_at,
    UpdatedAt => updated_at,
});

impl Entity for Organization {
    type Create = NewOrganization;
    type Field = OrganizationField;
    type Include = OrganizationInclude;
    type Unique = OrganizationWhereUnique;
    type Update = UpdateOrganization;
    type Where = OrganizationWhere;
    type WithRelations = OrganizationWithRelations;

    const ID: OrganizationField = OrganizationField::Id;
    const MODEL: &'static str = "Organization";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: OrganizationField) -> ScalarValue {
        match field {
            OrganizationField::Id => self.id.clone().into(),
            OrganizationField::Name => self.name.clone().into(),
            OrganizationField::Kind => self.kind.clone().into(),
            OrganizationField::Description => self.description.clone().into(),
            OrganizationField::IsVerified => self.is_verified.into(),
            OrganizationField::CreatedAt => self.created_at.into(),
            OrganizationField::UpdatedAt => self.updated_at.into(),
        }
    }

    fn field_where(
        field: OrganizationField,
        op: CmpOp,
        value: ScalarValue,
    ) -> PgResult<OrganizationWhere> {
        use OrganizationWhere as W;

        Ok(match field {
            OrganizationField::Id => W::Id(CompareFilter::compare(op, value)?),
            OrganizationField::Name => W::Name(CompareFilter::compare(op, value)?),
            OrganizationField::Kind => W::Kind(CompareFilter::compare(op, value)?),
            OrganizationField::Description => W::Description(CompareFilter::compare(op, value)?),
            OrganizationField::IsVerified => W::IsVerified(CompareFilter::compare(op, value)?),
            OrganizationField::CreatedAt => W::CreatedAt(CompareFilter::compare(op, value)?),
            OrganizationField::UpdatedAt => W::UpdatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: OrganizationWhereUnique) -> OrganizationWhere {
        unique.into()
    }

    entity_queries!(organizations, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<Organization>,
        include: OrganizationInclude,
    ) -> PgResult<Vec<OrganizationWithRelations>> {
        let load = !rows.is_empty();

        let mut memberships = if include.memberships && load {
            let children: Vec<Membership> = Membership::belonging_to(&rows)
                .select(Membership::as_select())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        let mut invites = if include.invites && load {
            let children: Vec<Invite> = Invite::belonging_to(&rows)
                .select(Invite::as_select())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        let mut stages = if include.stages && load {
            let children: Vec<Stage> = Stage::belonging_to(&rows)
                .select(Stage::as_select())
                .order(stages::sequence.asc())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        let mut vehicles = if include.vehicles && load {
            let children: Vec<Vehicle> = Vehicle::belonging_to(&rows)
                .select(Vehicle::as_select())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|organization| OrganizationWithRelations {
                organization,
                memberships: memberships.as_mut().and_then(Iterator::next),
                invites: invites.as_mut().and_then(Iterator::next),
                stages: stages.as_mut().and_then(Iterator::next),
                vehicles: vehicles.as_mut().and_then(Iterator::next),
            })
            .collect())
    }
}

/// Repository for organization lookups the application runs directly.
pub trait OrganizationRepository {
    /// Finds an organization by id.
    fn find_organization_by_id(
        &mut self,
        organization_id: &str,
    ) -> impl Future<Output = PgResult<Option<Organization>>> + Send;

    /// Lists the organizations a user belongs to with the user's membership,
    /// ordered by organization name.
    fn list_user_organizations(
        &mut self,
        user_id: &str,
    ) -> impl Future<Output = PgResult<Vec<(Organization, Membership)>>> + Send;

    /// Lists organizations, newest first, with keyset pagination.
    fn cursor_list_organizations(
        &mut self,
        pagination: CursorPagination,
    ) -> impl Future<Output = PgResult<CursorPage<Organization>>> + Send;
}

impl OrganizationRepository for PgConnection {
    async fn find_organization_by_id(
        &mut self,
        organization_id: &str,
    ) -> PgResult<Option<Organization>> {
        use crate::schema::organizations::dsl::*;

        organizations
            .filter(id.eq(organization_id))
            .select(Organization::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn list_user_organizations(
        &mut self,
        user_id: &str,
    ) -> PgResult<Vec<(Organization, Membership)>> {
        organizations::table
            .inner_join(memberships::table)
            .filter(memberships::user_id.eq(user_id))
            .select((Organization::as_select(), Membership::as_select()))
            .order((organizations::name.asc(), organizations::id.asc()))
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn cursor_list_organizations(
        &mut self,
        pagination: CursorPagination,
    ) -> PgResult<CursorPage<Organization>> {
        use crate::schema::organizations::dsl;

        let total = if pagination.include_count {
            Some(
                organizations::table
                    .count()
                    .get_result::<i64>(self)
                    .await
                    .map_err(PgError::from)?,
            )
        } else {
            None
        };

        let mut query = organizations::table.into_boxed();
        if let Some(cursor) = &pagination.after {
            query = query.filter(before_cursor(cursor));
        }

        let items: Vec<Organization> = query
            .select(Organization::as_select())
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .limit(pagination.fetch_limit())
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(CursorPage::new(
            items,
            total,
            pagination.limit,
            |o: &Organization| (o.created_at.into(), o.id.clone()),
        ))
    }
}

/// Rows listed after `cursor` in `(created_at DESC, id DESC)` order.
fn before_cursor(cursor: &Cursor) -> BoxedPredicate<organizations::table> {
    use organizations::dsl;

    let created_at = || jiff_diesel::Timestamp::from(cursor.timestamp);
    boxed(
        dsl::created_at
            .lt(created_at())
            .or(dsl::created_at.eq(created_at()).and(dsl::id.lt(cursor.id.clone())))
            .nullable(),
    )
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;

    fn sql(filter: &OrganizationWhere) -> String {
        let query = organizations::table
            .filter(compile(filter))
            .select(organizations::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn kind_maps_to_type_column() {
        let sql = sql(&OrganizationWhere::Kind(StringFilter::equals("garage")));
        assert!(sql.contains("\"organizations\".\"type\" = $1"), "{sql}");
        assert_eq!(OrganizationField::Kind.name(), "type");
    }

    #[test]
    fn every_stage_relation_uses_distinct_from() {
        let filter = OrganizationWhere::Stages(ListRelationFilter::every(StageWhere::IsActive(
            BoolFilter::Equals(true),
        )));
        let sql = sql(&filter);
        assert!(sql.contains("\"organizations\".\"id\" NOT IN (SELECT \"stages\".\"organization_id\""), "{sql}");
        assert!(sql.contains("IS DISTINCT FROM"), "{sql}");
    }

    #[test]
    fn nested_relations_compile() {
        let filter = OrganizationWhere::Vehicles(ListRelationFilter::some(VehicleWhere::Tasks(
            ListRelationFilter::some(super::super::task::TaskWhere::IsCompleted(
                BoolFilter::Equals(false),
            )),
        )));
        let sql = sql(&filter);
        assert!(sql.contains("SELECT \"vehicles\".\"organization_id\""), "{sql}");
        assert!(sql.contains("SELECT \"tasks\".\"vehicle_id\""), "{sql}");
    }

    #[test]
    fn cursor_continues_below_the_last_row() {
        let cursor = Cursor::new(Timestamp::UNIX_EPOCH, "org_9");
        let query = organizations::table
            .filter(before_cursor(&cursor))
            .select(organizations::id);
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("\"organizations\".\"created_at\" < $1"), "{sql}");
        assert!(sql.contains("\"organizations\".\"id\" < $3"), "{sql}");
    }
}
