//! Invite filters, delegate hooks and repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, index_by_id, where_input};
use super::organization::{self, OrganizationWhere};
use super::predicate::{
    BoxedPredicate, and_all, boxed, field_columns, negate, or_any, scalar_column, text_column,
    to_one,
};
use crate::model::{Invite, NewInvite, Organization, UpdateInvite};
use crate::schema::{invites, organizations};
use crate::types::{
    CmpOp, CompareFilter, Cursor, CursorPage, CursorPagination, DateTimeFilter, FieldKind,
    RelationFilter, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY};

/// Scalar fields of [`Invite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InviteField {
    Id,
    OrganizationId,
    Email,
    AccessRole,
    Token,
    ExpiresAt,
    CreatedAt,
}

impl ScalarField for InviteField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::OrganizationId,
        Self::Email,
        Self::AccessRole,
        Self::Token,
        Self::ExpiresAt,
        Self::CreatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::ExpiresAt | Self::CreatedAt => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn is_nullable(self) -> bool {
        false
    }
}

/// Filter tree over invites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum InviteWhere {
    And(Vec<InviteWhere>),
    Or(Vec<InviteWhere>),
    Not(Box<InviteWhere>),
    Id(StringFilter),
    OrganizationId(StringFilter),
    Email(StringFilter),
    AccessRole(StringFilter),
    Token(StringFilter),
    ExpiresAt(DateTimeFilter),
    CreatedAt(DateTimeFilter),
    Organization(RelationFilter<OrganizationWhere>),
}

where_input!(InviteWhere);

/// Unique selectors of an invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum InviteWhereUnique {
    Id(String),
    Token(String),
}

impl From<InviteWhereUnique> for InviteWhere {
    fn from(unique: InviteWhereUnique) -> Self {
        match unique {
            InviteWhereUnique::Id(id) => InviteWhere::Id(StringFilter::equals(id)),
            InviteWhereUnique::Token(token) => InviteWhere::Token(StringFilter::equals(token)),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InviteInclude {
    pub organization: bool,
}

/// An invite with its included relations.
#[derive(Debug, Clone, PartialEq)]
pub struct InviteWithRelations {
    pub invite: Invite,
    pub organization: Option<Organization>,
}

text_column!(id_filter, invites, invites::id);
text_column!(organization_id_filter, invites, invites::organization_id);
text_column!(email_filter, invites, invites::email);
text_column!(access_role_filter, invites, invites::access_role);
text_column!(token_filter, invites, invites::token);
scalar_column!(expires_at_filter, invites, invites::expires_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(created_at_filter, invites, invites::created_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles an invite filter into a predicate on `invites`.
pub(crate) fn compile(filter: &InviteWhere) -> BoxedPredicate<invites::table> {
    match filter {
        InviteWhere::And(items) => and_all(items.iter().map(compile)),
        InviteWhere::Or(items) => or_any(items.iter().map(compile)),
        InviteWhere::Not(inner) => negate(compile(inner)),
        InviteWhere::Id(f) => id_filter(f),
        InviteWhere::OrganizationId(f) => organization_id_filter(f),
        InviteWhere::Email(f) => email_filter(f),
        InviteWhere::AccessRole(f) => access_role_filter(f),
        InviteWhere::Token(f) => token_filter(f),
        InviteWhere::ExpiresAt(f) => expires_at_filter(f),
        InviteWhere::CreatedAt(f) => created_at_filter(f),
        InviteWhere::Organization(f) => to_one!(
            required f,
            invites::organization_id,
            organizations,
            organization::compile
        ),
    }
}

field_columns!(invites, InviteField {
    Id => id,
    OrganizationId => organization_id,
    Email => email,
    AccessRole => access_role,
    Token => token,
    ExpiresAt => expires_at,
    CreatedAt => created_at,
});

impl Entity for Invite {
    type Create = NewInvite;
    type Field = InviteField;
    type Include = InviteInclude;
    type Unique = InviteWhereUnique;
    type Update = UpdateInvite;
    type Where = InviteWhere;
    type WithRelations = InviteWithRelations;

    const ID: InviteField = InviteField::Id;
    const MODEL: &'static str = "Invite";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: InviteField) -> ScalarValue {
        match field {
            InviteField::Id => self.id.clone().into(),
            InviteField::OrganizationId => self.organization_id.clone().into(),
            InviteField::Email => self.email.clone().into(),
            InviteField::AccessRole => self.access_role.clone().into(),
            InviteField::Token => self.token.clone().into(),
            InviteField::ExpiresAt => self.expires_at.into(),
            InviteField::CreatedAt => self.created_at.into(),
        }
    }

    fn field_where(field: InviteField, op: CmpOp, value: ScalarValue) -> PgResult<InviteWhere> {
        Ok(match field {
            InviteField::Id => InviteWhere::Id(CompareFilter::compare(op, value)?),
            InviteField::OrganizationId => {
                InviteWhere::OrganizationId(CompareFilter::compare(op, value)?)
            }
            InviteField::Email => InviteWhere::Email(CompareFilter::compare(op, value)?),
            InviteField::AccessRole => InviteWhere::AccessRole(CompareFilter::compare(op, value)?),
            InviteField::Token => InviteWhere::Token(CompareFilter::compare(op, value)?),
            InviteField::ExpiresAt => InviteWhere::ExpiresAt(CompareFilter::compare(op, value)?),
            InviteField::CreatedAt => InviteWhere::CreatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: InviteWhereUnique) -> InviteWhere {
        unique.into()
    }

    entity_queries!(invites, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<Invite>,
        include: InviteInclude,
    ) -> PgResult<Vec<InviteWithRelations>> {
        let organizations = if include.organization && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|i| i.organization_id.clone()));
            Some(index_by_id::<Organization>(conn, OrganizationWhere::Id(ids)).await?)
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|invite| InviteWithRelations {
                organization: organizations
                    .as_ref()
                    .and_then(|index| index.get(&invite.organization_id).cloned()),
                invite,
            })
            .collect())
    }
}

/// Repository for invite operations the application runs directly.
pub trait InviteRepository {
    /// Creates an invite.
    fn create_invite(&mut self, invite: NewInvite) -> impl Future<Output = PgResult<Invite>> + Send;

    /// Finds an invite by its acceptance token, expired or not.
    fn find_invite_by_token(
        &mut self,
        token: &str,
    ) -> impl Future<Output = PgResult<Option<Invite>>> + Send;

    /// Lists an organization's unexpired invites, newest first.
    fn cursor_list_pending_invites(
        &mut self,
        organization_id: &str,
        pagination: CursorPagination,
    ) -> impl Future<Output = PgResult<CursorPage<Invite>>> + Send;

    /// Deletes every expired invite and returns how many were removed.
    fn delete_expired_invites(&mut self) -> impl Future<Output = PgResult<usize>> + Send;
}

impl InviteRepository for PgConnection {
    async fn create_invite(&mut self, invite: NewInvite) -> PgResult<Invite> {
        diesel::insert_into(invites::table)
            .values(&invite)
            .returning(Invite::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn find_invite_by_token(&mut self, invite_token: &str) -> PgResult<Option<Invite>> {
        use crate::schema::invites::dsl::*;

        invites
            .filter(token.eq(invite_token))
            .select(Invite::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn cursor_list_pending_invites(
        &mut self,
        org_id: &str,
        pagination: CursorPagination,
    ) -> PgResult<CursorPage<Invite>> {
        use crate::schema::invites::dsl;

        let now = jiff_diesel::Timestamp::from(Timestamp::now());

        let total = if pagination.include_count {
            Some(
                invites::table
                    .filter(dsl::organization_id.eq(org_id))
                    .filter(dsl::expires_at.gt(&now))
                    .count()
                    .get_result::<i64>(self)
                    .await
                    .map_err(PgError::from)?,
            )
        } else {
            None
        };

        let mut query = invites::table
            .filter(dsl::organization_id.eq(org_id))
            .filter(dsl::expires_at.gt(now))
            .into_boxed();
        if let Some(cursor) = &pagination.after {
            query = query.filter(before_cursor(cursor));
        }

        let items: Vec<Invite> = query
            .select(Invite::as_select())
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .limit(pagination.fetch_limit())
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(CursorPage::new(
            items,
            total,
            pagination.limit,
            |i: &Invite| (i.created_at.into(), i.id.clone()),
        ))
    }

    async fn delete_expired_invites(&mut self) -> PgResult<usize> {
        use crate::schema::invites::dsl::*;

        let now = jiff_diesel::Timestamp::from(Timestamp::now());
        let deleted = diesel::delete(invites.filter(expires_at.le(now)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = Invite::MODEL,
            deleted,
            "Expired invites deleted"
        );

        Ok(deleted)
    }
}

/// Rows listed after `cursor` in `(created_at DESC, id DESC)` order.
fn before_cursor(cursor: &Cursor) -> BoxedPredicate<invites::table> {
    use invites::dsl;

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

    fn sql(filter: &InviteWhere) -> String {
        let query = invites::table.filter(compile(filter)).select(invites::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn token_unique_compiles_to_equality() {
        let sql = sql(&InviteWhereUnique::Token("tok".into()).into());
        assert!(sql.contains("\"invites\".\"token\" = $1"), "{sql}");
    }

    #[test]
    fn organization_relation_is_not() {
        let filter = InviteWhere::Organization(RelationFilter::is_not(OrganizationWhere::Name(
            StringFilter::equals("Acme"),
        )));
        let sql = sql(&filter);
        assert!(
            sql.contains("\"invites\".\"organization_id\" NOT IN (SELECT \"organizations\".\"id\""),
            "{sql}"
        );
        assert!(!sql.contains("IS NULL"), "{sql}");
    }

    #[test]
    fn expiry_range_filter() {
        let cutoff = Timestamp::UNIX_EPOCH;
        let filter = InviteWhere::ExpiresAt(DateTimeFilter::Lte(cutoff));
        let sql = sql(&filter);
        assert!(sql.contains("\"invites\".\"expires_at\" <= $1"), "{sql}");
    }

    #[test]
    fn cursor_continues_below_the_last_row() {
        let cursor = Cursor::new(Timestamp::UNIX_EPOCH, "inv_9");
        let query = invites::table.filter(before_cursor(&cursor)).select(invites::id);
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("\"invites\".\"created_at\" < $1"), "{sql}");
        assert!(sql.contains("\"invites\".\"created_at\" = $2"), "{sql}");
        assert!(sql.contains("\"invites\".\"id\" < $3"), "{sql}");
    }
}
