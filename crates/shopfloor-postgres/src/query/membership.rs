//! Membership filters, delegate hooks and repository.

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
    BoxedPredicate, and_all, field_columns, list_column, negate, nullable_column, or_any,
    order_column, scalar_column, text_column, to_many, to_one,
};
use super::task_progress::{self, TaskProgressWhere};
use super::user::{self, UserWhere};
use crate::model::{Membership, NewMembership, Organization, TaskProgress, UpdateMembership, User};
use crate::schema::{memberships, organizations, task_progress as task_progress_table, users};
use crate::types::{
    CmpOp, CompareFilter, DateTimeFilter, FieldKind, ListRelationFilter, MemberFilter, MemberSortBy,
    MemberSortField, NullableFilter, OffsetPagination, RelationFilter, ScalarField, ScalarValue,
    StringFilter, StringListFilter,
};
use crate::{PgConnection, PgError, PgResult};

/// Scalar fields of [`Membership`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MembershipField {
    Id,
    UserId,
    OrganizationId,
    AccessRole,
    BusinessRole,
    Status,
    AuthMethods,
    RfidTag,
    QrCode,
    UsbKeyId,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for MembershipField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::UserId,
        Self::OrganizationId,
        Self::AccessRole,
        Self::BusinessRole,
        Self::Status,
        Self::AuthMethods,
        Self::RfidTag,
        Self::QrCode,
        Self::UsbKeyId,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::AuthMethods => FieldKind::TextList,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::BusinessRole | Self::RfidTag | Self::QrCode | Self::UsbKeyId
        )
    }
}

/// Filter tree over memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum MembershipWhere {
    And(Vec<MembershipWhere>),
    Or(Vec<MembershipWhere>),
    Not(Box<MembershipWhere>),
    Id(StringFilter),
    UserId(StringFilter),
    OrganizationId(StringFilter),
    AccessRole(StringFilter),
    BusinessRole(NullableFilter<StringFilter>),
    Status(StringFilter),
    AuthMethods(StringListFilter),
    RfidTag(NullableFilter<StringFilter>),
    QrCode(NullableFilter<StringFilter>),
    UsbKeyId(NullableFilter<StringFilter>),
    CreatedAt(DateTimeFilter),
    UpdatedAt(DateTimeFilter),
    User(RelationFilter<UserWhere>),
    Organization(RelationFilter<OrganizationWhere>),
    /// Progress records where this membership is the worker.
    TaskProgress(ListRelationFilter<TaskProgressWhere>),
}

where_input!(MembershipWhere);

/// Unique selectors of a membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum MembershipWhereUnique {
    Id(String),
    RfidTag(String),
    QrCode(String),
    UsbKeyId(String),
    UserIdOrganizationId {
        user_id: String,
        organization_id: String,
    },
}

impl From<MembershipWhereUnique> for MembershipWhere {
    fn from(unique: MembershipWhereUnique) -> Self {
        match unique {
            MembershipWhereUnique::Id(id) => MembershipWhere::Id(StringFilter::equals(id)),
            MembershipWhereUnique::RfidTag(tag) => {
                MembershipWhere::RfidTag(StringFilter::equals(tag).into())
            }
            MembershipWhereUnique::QrCode(code) => {
                MembershipWhere::QrCode(StringFilter::equals(code).into())
            }
            MembershipWhereUnique::UsbKeyId(key) => {
                MembershipWhere::UsbKeyId(StringFilter::equals(key).into())
            }
            MembershipWhereUnique::UserIdOrganizationId {
                user_id,
                organization_id,
            } => MembershipWhere::And(vec![
                MembershipWhere::UserId(StringFilter::equals(user_id)),
                MembershipWhere::OrganizationId(StringFilter::equals(organization_id)),
            ]),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipInclude {
    pub user: bool,
    pub organization: bool,
    pub task_progress: bool,
}

/// A membership with its included relations.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipWithRelations {
    pub membership: Membership,
    pub user: Option<User>,
    pub organization: Option<Organization>,
    pub task_progress: Option<Vec<TaskProgress>>,
}

text_column!(id_filter, memberships, memberships::id);
text_column!(user_id_filter, memberships, memberships::user_id);
text_column!(organization_id_filter, memberships, memberships::organization_id);
text_column!(access_role_filter, memberships, memberships::access_role);
text_column!(status_filter, memberships, memberships::status);
text_column!(business_role_value, memberships, memberships::business_role.assume_not_null());
text_column!(rfid_tag_value, memberships, memberships::rfid_tag.assume_not_null());
text_column!(qr_code_value, memberships, memberships::qr_code.assume_not_null());
text_column!(usb_key_id_value, memberships, memberships::usb_key_id.assume_not_null());
nullable_column!(business_role_filter, memberships, memberships::business_role, StringFilter, business_role_value);
nullable_column!(rfid_tag_filter, memberships, memberships::rfid_tag, StringFilter, rfid_tag_value);
nullable_column!(qr_code_filter, memberships, memberships::qr_code, StringFilter, qr_code_value);
nullable_column!(usb_key_id_filter, memberships, memberships::usb_key_id, StringFilter, usb_key_id_value);
list_column!(auth_methods_filter, memberships, memberships::auth_methods);
scalar_column!(created_at_filter, memberships, memberships::created_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(updated_at_filter, memberships, memberships::updated_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles a membership filter into a predicate on `memberships`.
pub(crate) fn compile(filter: &MembershipWhere) -> BoxedPredicate<memberships::table> {
    match filter {
        MembershipWhere::And(items) => and_all(items.iter().map(compile)),
        MembershipWhere::Or(items) => or_any(items.iter().map(compile)),
        MembershipWhere::Not(inner) => negate(compile(inner)),
        MembershipWhere::Id(f) => id_filter(f),
        MembershipWhere::UserId(f) => user_id_filter(f),
        MembershipWhere::OrganizationId(f) => organization_id_filter(f),
        MembershipWhere::AccessRole(f) => access_role_filter(f),
        MembershipWhere::BusinessRole(f) => business_role_filter(f),
        MembershipWhere::Status(f) => status_filter(f),
        MembershipWhere::AuthMethods(f) => auth_methods_filter(f),
        MembershipWhere::RfidTag(f) => rfid_tag_filter(f),
        MembershipWhere::QrCode(f) => qr_code_filter(f),
        MembershipWhere::UsbKeyId(f) => usb_key_id_filter(f),
        MembershipWhere::CreatedAt(f) => created_at_filter(f),
        MembershipWhere::UpdatedAt(f) => updated_at_filter(f),
        MembershipWhere::User(f) => {
            to_one!(required f, memberships::user_id, users, user::compile)
        }
        MembershipWhere::Organization(f) => to_one!(
            required f,
            memberships::organization_id,
            organizations,
            organization::compile
        ),
        MembershipWhere::TaskProgress(f) => to_many!(
            f,
            memberships::id,
            task_progress_table,
            task_progress_table::worker_membership_id,
            task_progress::compile
        ),
    }
}

field_columns!(memberships, MembershipField {
    Id => id,
    UserId => user_id,
    OrganizationId => organization_id,
    AccessRole => access_role,
    BusinessRole => business_role,
    Status => status,
    AuthMethods => auth_methods,
    RfidTag => rfid_tag,
    QrCode => qr_code,
    UsbKeyId => usb_key_id,
    CreatedAt => created_at,
    UpdatedAt => updated_at,
});

impl Entity for Membership {
    type Create = NewMembership;
    type Field = MembershipField;
    type Include = MembershipInclude;
    type Unique = MembershipWhereUnique;
    type Update = UpdateMembership;
    type Where = MembershipWhere;
    type WithRelations = MembershipWithRelations;

    const ID: MembershipField = MembershipField::Id;
    const MODEL: &'static str = "Membership";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: MembershipField) -> ScalarValue {
        match field {
            MembershipField::Id => self.id.clone().into(),
            MembershipField::UserId => self.user_id.clone().into(),
            MembershipField::OrganizationId => self.organization_id.clone().into(),
            MembershipField::AccessRole => self.access_role.clone().into(),
            MembershipField::BusinessRole => self.business_role.clone().into(),
            MembershipField::Status => self.status.clone().into(),
            MembershipField::AuthMethods => self.auth_methods.clone().into(),
            MembershipField::RfidTag => self.rfid_tag.clone().into(),
            MembershipField::QrCode => self.qr_code.clone().into(),
            MembershipField::UsbKeyId => self.usb_key_id.clone().into(),
            MembershipField::CreatedAt => self.created_at.into(),
            MembershipField::UpdatedAt => self.updated_at.into(),
        }
    }

    fn field_where(
        field: MembershipField,
        op: CmpOp,
        value: ScalarValue,
    ) -> PgResult<MembershipWhere> {
        use MembershipWhere as W;

        Ok(match field {
            MembershipField::Id => W::Id(CompareFilter::compare(op, value)?),
            MembershipField::UserId => W::UserId(CompareFilter::compare(op, value)?),
            MembershipField::OrganizationId => {
                W::OrganizationId(CompareFilter::compare(op, value)?)
            }
            MembershipField::AccessRole => W::AccessRole(CompareFilter::compare(op, value)?),
            MembershipField::BusinessRole => W::BusinessRole(CompareFilter::compare(op, value)?),
            MembershipField::Status => W::Status(CompareFilter::compare(op, value)?),
            MembershipField::AuthMethods => W::AuthMethods(CompareFilter::compare(op, value)?),
            MembershipField::RfidTag => W::RfidTag(CompareFilter::compare(op, value)?),
            MembershipField::QrCode => W::QrCode(CompareFilter::compare(op, value)?),
            MembershipField::UsbKeyId => W::UsbKeyId(CompareFilter::compare(op, value)?),
            MembershipField::CreatedAt => W::CreatedAt(CompareFilter::compare(op, value)?),
            MembershipField::UpdatedAt => W::UpdatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: MembershipWhereUnique) -> MembershipWhere {
        unique.into()
    }

    entity_queries!(memberships, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<Membership>,
        include: MembershipInclude,
    ) -> PgResult<Vec<MembershipWithRelations>> {
        let users = if include.user && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|m| m.user_id.clone()));
            Some(index_by_id::<User>(conn, UserWhere::Id(ids)).await?)
        } else {
            None
        };

        let organizations = if include.organization && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|m| m.organization_id.clone()));
            Some(index_by_id::<Organization>(conn, OrganizationWhere::Id(ids)).await?)
        } else {
            None
        };

        let mut progress = if include.task_progress && !rows.is_empty() {
            let children: Vec<TaskProgress> = TaskProgress::belonging_to(&rows)
                .select(TaskProgress::as_select())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|membership| MembershipWithRelations {
                user: users
                    .as_ref()
                    .and_then(|index| index.get(&membership.user_id).cloned()),
                organization: organizations
                    .as_ref()
                    .and_then(|index| index.get(&membership.organization_id).cloned()),
                task_progress: progress.as_mut().and_then(Iterator::next),
                membership,
            })
            .collect())
    }
}

/// Badge or key presented at a shop-floor terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum MemberCredential {
    RfidTag(String),
    QrCode(String),
    UsbKey(String),
}

impl MemberCredential {
    /// Sign-in method that must be enabled for the credential to be accepted.
    pub fn auth_method(&self) -> &'static str {
        match self {
            Self::RfidTag(_) => "rfid",
            Self::QrCode(_) => "qr",
            Self::UsbKey(_) => "usb",
        }
    }
}

/// Repository for membership lookups the application runs directly.
pub trait MembershipRepository {
    /// Finds the membership binding a user to an organization.
    fn find_membership(
        &mut self,
        user_id: &str,
        organization_id: &str,
    ) -> impl Future<Output = PgResult<Option<Membership>>> + Send;

    /// Finds the membership owning a credential.
    ///
    /// The matching sign-in method must be enabled on the membership.
    fn find_membership_by_credential(
        &mut self,
        credential: &MemberCredential,
    ) -> impl Future<Output = PgResult<Option<Membership>>> + Send;

    /// Lists an organization's members with filtering and sorting.
    fn list_organization_members(
        &mut self,
        organization_id: &str,
        pagination: OffsetPagination,
        sort_by: MemberSortBy,
        filter: MemberFilter,
    ) -> impl Future<Output = PgResult<Vec<Membership>>> + Send;

    /// Enables a sign-in method. Enabling it twice is a no-op.
    fn add_auth_method(
        &mut self,
        membership_id: &str,
        method: &str,
    ) -> impl Future<Output = PgResult<Membership>> + Send;

    /// Disables a sign-in method.
    fn remove_auth_method(
        &mut self,
        membership_id: &str,
        method: &str,
    ) -> impl Future<Output = PgResult<Membership>> + Send;
}

impl MembershipRepository for PgConnection {
    async fn find_membership(
        &mut self,
        member_id: &str,
        org_id: &str,
    ) -> PgResult<Option<Membership>> {
        use crate::schema::memberships::dsl::*;

        memberships
            .filter(user_id.eq(member_id))
            .filter(organization_id.eq(org_id))
            .select(Membership::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_membership_by_credential(
        &mut self,
        credential: &MemberCredential,
    ) -> PgResult<Option<Membership>> {
        use crate::schema::memberships::dsl::*;

        let query = memberships
            .filter(auth_methods.contains(vec![credential.auth_method().to_owned()]))
            .into_boxed();
        let query = match credential {
            MemberCredential::RfidTag(tag) => query.filter(rfid_tag.eq(tag)),
            MemberCredential::QrCode(code) => query.filter(qr_code.eq(code)),
            MemberCredential::UsbKey(key) => query.filter(usb_key_id.eq(key)),
        };

        query
            .select(Membership::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn list_organization_members(
        &mut self,
        org_id: &str,
        pagination: OffsetPagination,
        sort_by: MemberSortBy,
        filter: MemberFilter,
    ) -> PgResult<Vec<Membership>> {
        // Joined for sorting by the member's name.
        let mut query = memberships::table
            .inner_join(users::table)
            .filter(memberships::organization_id.eq(org_id))
            .into_boxed();

        if let Some(role) = filter.access_role {
            query = query.filter(memberships::access_role.eq(role));
        }
        if let Some(status) = filter.status {
            query = query.filter(memberships::status.eq(status));
        }
        if let Some(method) = filter.auth_method {
            query = query.filter(memberships::auth_methods.contains(vec![method]));
        }

        let query = match sort_by.field {
            MemberSortField::Name => order_column!(query, users::name, sort_by.order),
            MemberSortField::Role => order_column!(query, memberships::access_role, sort_by.order),
            MemberSortField::Date => order_column!(query, memberships::created_at, sort_by.order),
        };

        query
            .then_order_by(memberships::id.asc())
            .select(Membership::as_select())
            .limit(pagination.limit)
            .offset(pagination.offset)
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn add_auth_method(&mut self, membership_id: &str, method: &str) -> PgResult<Membership> {
        let method = method.to_owned();
        update_auth_methods(self, membership_id, move |methods| {
            if !methods.contains(&method) {
                methods.push(method);
            }
        })
        .await
    }

    async fn remove_auth_method(
        &mut self,
        membership_id: &str,
        method: &str,
    ) -> PgResult<Membership> {
        let method = method.to_owned();
        update_auth_methods(self, membership_id, move |methods| {
            methods.retain(|m| *m != method);
        })
        .await
    }
}

/// Rewrites the row's sign-in methods under a row lock.
async fn update_auth_methods<F>(
    conn: &mut PgConnection,
    membership_id: &str,
    edit: F,
) -> PgResult<Membership>
where
    F: FnOnce(&mut Vec<String>) + Send + 'static,
{
    let membership_id = membership_id.to_owned();

    conn.transaction(|conn| {
        async move {
            use crate::schema::memberships::dsl::*;

            let current: Option<Vec<String>> = memberships
                .filter(id.eq(&membership_id))
                .select(auth_methods)
                .for_update()
                .first(conn)
                .await
                .optional()?;
            let Some(mut methods) = current else {
                return Err(PgError::not_found(Membership::MODEL, "update_auth_methods"));
            };

            edit(&mut methods);

            diesel::update(memberships.filter(id.eq(&membership_id)))
                .set(auth_methods.eq(methods))
                .returning(Membership::as_returning())
                .get_result(conn)
                .await
                .map_err(PgError::from)
        }
        .scope_boxed()
    })
    .await
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;

    fn sql(filter: &MembershipWhere) -> String {
        let query = memberships::table
            .filter(compile(filter))
            .select(memberships::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn compound_unique_matches_both_keys() {
        let filter = MembershipWhere::from(MembershipWhereUnique::UserIdOrganizationId {
            user_id: "u1".into(),
            organization_id: "o1".into(),
        });
        let sql = sql(&filter);
        assert!(sql.contains("\"memberships\".\"user_id\" = $1"), "{sql}");
        assert!(sql.contains("\"memberships\".\"organization_id\" = $2"), "{sql}");
    }

    #[test]
    fn credential_unique_requires_non_null() {
        let sql = sql(&MembershipWhereUnique::RfidTag("04:A2".into()).into());
        assert!(sql.contains("\"memberships\".\"rfid_tag\" IS NOT NULL"), "{sql}");
    }

    #[test]
    fn user_relation_selects_user_ids() {
        let filter = MembershipWhere::User(RelationFilter::is(UserWhere::IsActive(
            crate::types::BoolFilter::Equals(true),
        )));
        let sql = sql(&filter);
        assert!(
            sql.contains("\"memberships\".\"user_id\" IN (SELECT \"users\".\"id\" FROM \"users\""),
            "{sql}"
        );
    }

    #[test]
    fn worker_progress_relation_skips_null_workers() {
        let filter = MembershipWhere::TaskProgress(ListRelationFilter::none(
            TaskProgressWhere::Status(StringFilter::equals("in_progress")),
        ));
        let sql = sql(&filter);
        assert!(sql.contains("\"memberships\".\"id\" NOT IN (SELECT"), "{sql}");
        assert!(
            sql.contains("\"task_progress\".\"worker_membership_id\" IS NOT NULL"),
            "{sql}"
        );
    }

    #[test]
    fn credentials_map_to_auth_methods() {
        assert_eq!(MemberCredential::RfidTag("x".into()).auth_method(), "rfid");
        assert_eq!(MemberCredential::QrCode("x".into()).auth_method(), "qr");
        assert_eq!(MemberCredential::UsbKey("x".into()).auth_method(), "usb");
    }

    #[test]
    fn auth_methods_field_is_a_list() {
        assert_eq!(MembershipField::AuthMethods.kind(), FieldKind::TextList);
        assert!(!MembershipField::AuthMethods.is_comparable());
        assert!(MembershipField::UsbKeyId.is_nullable());
    }
}
