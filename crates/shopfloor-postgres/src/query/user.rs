//! User filters, delegate hooks and repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, where_input};
use super::membership::{self, MembershipWhere};
use super::predicate::{
    BoxedPredicate, and_all, escape_like, field_columns, negate, nullable_column, or_any,
    scalar_column, text_column, to_many,
};
use crate::model::{Membership, NewUser, UpdateUser, User};
use crate::schema::{memberships, users};
use crate::types::{
    BoolFilter, CmpOp, CompareFilter, DateTimeFilter, FieldKind, ListRelationFilter, NullableFilter,
    OffsetPage, OffsetPagination, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult};

/// Scalar fields of [`User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserField {
    Id,
    Email,
    Name,
    Password,
    IsVerified,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for UserField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Email,
        Self::Name,
        Self::Password,
        Self::IsVerified,
        Self::IsActive,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Id | Self::Email | Self::Name | Self::Password => FieldKind::Text,
            Self::IsVerified | Self::IsActive => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(self, Self::Password)
    }
}

/// Filter tree over users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum UserWhere {
    And(Vec<UserWhere>),
    Or(Vec<UserWhere>),
    Not(Box<UserWhere>),
    Id(StringFilter),
    Email(StringFilter),
    Name(StringFilter),
    Password(NullableFilter<StringFilter>),
    IsVerified(BoolFilter),
    IsActive(BoolFilter),
    CreatedAt(DateTimeFilter),
    UpdatedAt(DateTimeFilter),
    /// Condition on the user's memberships.
    Memberships(ListRelationFilter<MembershipWhere>),
}

where_input!(UserWhere);

/// Unique selectors of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum UserWhereUnique {
    Id(String),
    Email(String),
}

impl From<UserWhereUnique> for UserWhere {
    fn from(unique: UserWhereUnique) -> Self {
        match unique {
            UserWhereUnique::Id(id) => UserWhere::Id(StringFilter::equals(id)),
            UserWhereUnique::Email(email) => UserWhere::Email(StringFilter::equals(email)),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserInclude {
    pub memberships: bool,
}

impl UserInclude {
    /// Loads the user's memberships.
    pub fn with_memberships(mut self) -> Self {
        self.memberships = true;
        self
    }
}

/// A user with its included relations. Relations not requested are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserWithRelations {
    pub user: User,
    pub memberships: Option<Vec<Membership>>,
}

text_column!(id_filter, users, users::id);
text_column!(email_filter, users, users::email);
text_column!(name_filter, users, users::name);
text_column!(password_value, users, users::password.assume_not_null());
nullable_column!(password_filter, users, users::password, StringFilter, password_value);
scalar_column!(is_verified_filter, users, users::is_verified, bool, std::convert::identity);
scalar_column!(is_active_filter, users, users::is_active, bool, std::convert::identity);
scalar_column!(created_at_filter, users, users::created_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(updated_at_filter, users, users::updated_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles a user filter into a predicate on `users`.
pub(crate) fn compile(filter: &UserWhere) -> BoxedPredicate<users::table> {
    match filter {
        UserWhere::And(items) => and_all(items.iter().map(compile)),
        UserWhere::Or(items) => or_any(items.iter().map(compile)),
        UserWhere::Not(inner) => negate(compile(inner)),
        UserWhere::Id(f) => id_filter(f),
        UserWhere::Email(f) => email_filter(f),
        UserWhere::Name(f) => name_filter(f),
        UserWhere::Password(f) => password_filter(f),
        UserWhere::IsVerified(f) => is_verified_filter(f),
        UserWhere::IsActive(f) => is_active_filter(f),
        UserWhere::CreatedAt(f) => created_at_filter(f),
        UserWhere::UpdatedAt(f) => updated_at_filter(f),
        UserWhere::Memberships(f) => to_many!(
            f,
            users::id,
            memberships,
            memberships::user_id,
            membership::compile
        ),
    }
}

field_columns!(users, UserField {
    Id => id,
    Email => email,
    Name => name,
    Password => password,
    IsVerified => is_verified,
    IsActive => is_active,
    CreatedAt => created_at,
    UpdatedAt => updated_at,
});

impl Entity for User {
    type Create = NewUser;
    type Field = UserField;
    type Include = UserInclude;
    type Unique = UserWhereUnique;
    type Update = UpdateUser;
    type Where = UserWhere;
    type WithRelations = UserWithRelations;

    const ID: UserField = UserField::Id;
    const MODEL: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: UserField) -> ScalarValue {
        match field {
            UserField::Id => self.id.clone().into(),
            UserField::Email => self.email.clone().into(),
            UserField::Name => self.name.clone().into(),
            UserField::Password => self.password.clone().into(),
            UserField::IsVerified => self.is_verified.into(),
            UserField::IsActive => self.is_active.into(),
            UserField::CreatedAt => self.created_at.into(),
            UserField::UpdatedAt => self.updated_at.into(),
        }
    }

    fn field_where(field: UserField, op: CmpOp, value: ScalarValue) -> PgResult<UserWhere> {
        Ok(match field {
            UserField::Id => UserWhere::Id(CompareFilter::compare(op, value)?),
            UserField::Email => UserWhere::Email(CompareFilter::compare(op, value)?),
            UserField::Name => UserWhere::Name(CompareFilter::compare(op, value)?),
            UserField::Password => UserWhere::Password(CompareFilter::compare(op, value)?),
            UserField::IsVerified => UserWhere::IsVerified(CompareFilter::compare(op, value)?),
            UserField::IsActive => UserWhere::IsActive(CompareFilter::compare(op, value)?),
            UserField::CreatedAt => UserWhere::CreatedAt(CompareFilter::compare(op, value)?),
            UserField::UpdatedAt => UserWhere::UpdatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: UserWhereUnique) -> UserWhere {
        unique.into()
    }

    entity_queries!(users, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<User>,
        include: UserInclude,
    ) -> PgResult<Vec<UserWithRelations>> {
        let mut memberships = if include.memberships && !rows.is_empty() {
            let children: Vec<Membership> = Membership::belonging_to(&rows)
                .select(Membership::as_select())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|user| UserWithRelations {
                memberships: memberships.as_mut().and_then(Iterator::next),
                user,
            })
            .collect())
    }
}

/// Repository for user lookups the application runs directly.
pub trait UserRepository {
    /// Finds a user by id.
    fn find_user_by_id(
        &mut self,
        user_id: &str,
    ) -> impl Future<Output = PgResult<Option<User>>> + Send;

    /// Finds a user by email, ignoring case and surrounding whitespace.
    fn find_user_by_email(
        &mut self,
        email: &str,
    ) -> impl Future<Output = PgResult<Option<User>>> + Send;

    /// Lists users, newest first.
    fn offset_list_users(
        &mut self,
        pagination: OffsetPagination,
    ) -> impl Future<Output = PgResult<OffsetPage<User>>> + Send;

    /// Marks the user's email as confirmed.
    fn mark_user_verified(
        &mut self,
        user_id: &str,
    ) -> impl Future<Output = PgResult<User>> + Send;

    /// Prevents the user from signing in.
    fn deactivate_user(&mut self, user_id: &str) -> impl Future<Output = PgResult<User>> + Send;
}

impl UserRepository for PgConnection {
    async fn find_user_by_id(&mut self, user_id: &str) -> PgResult<Option<User>> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(user_id))
            .select(User::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn find_user_by_email(&mut self, address: &str) -> PgResult<Option<User>> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.ilike(escape_like(address.trim())))
            .select(User::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn offset_list_users(
        &mut self,
        pagination: OffsetPagination,
    ) -> PgResult<OffsetPage<User>> {
        use crate::schema::users::dsl::*;

        let total = if pagination.include_count {
            Some(
                users
                    .count()
                    .get_result::<i64>(self)
                    .await
                    .map_err(PgError::from)?,
            )
        } else {
            None
        };

        let items = users
            .select(User::as_select())
            .order((created_at.desc(), id.desc()))
            .limit(pagination.limit)
            .offset(pagination.offset)
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(OffsetPage::new(items, total))
    }

    async fn mark_user_verified(&mut self, user_id: &str) -> PgResult<User> {
        let changes = UpdateUser {
            is_verified: Some(true),
            ..Default::default()
        };

        <User as Entity>::update(self, UserWhere::Id(StringFilter::equals(user_id)), changes)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PgError::not_found(User::MODEL, "mark_user_verified"))
    }

    async fn deactivate_user(&mut self, user_id: &str) -> PgResult<User> {
        use crate::schema::users::dsl::*;

        diesel::update(users.filter(id.eq(user_id)))
            .set(is_active.eq(false))
            .returning(User::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;
    use crate::query::WhereInput;
    use crate::types::SortBy;

    fn sql(filter: &UserWhere) -> String {
        let query = users::table.filter(compile(filter)).select(users::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn unique_email_compiles_to_equality() {
        let filter = UserWhere::from(UserWhereUnique::Email("ana@example.com".into()));
        let sql = sql(&filter);
        assert!(sql.contains("\"users\".\"email\" = $1"), "{sql}");
    }

    #[test]
    fn membership_relation_compiles_to_subselect() {
        let filter = UserWhere::and(vec![
            UserWhere::IsActive(BoolFilter::Equals(true)),
            UserWhere::Memberships(ListRelationFilter::some(MembershipWhere::AccessRole(
                StringFilter::equals("owner"),
            ))),
        ]);
        let sql = sql(&filter);
        assert!(sql.contains("\"users\".\"is_active\" = $1"), "{sql}");
        assert!(
            sql.contains("\"users\".\"id\" IN (SELECT \"memberships\".\"user_id\" FROM \"memberships\""),
            "{sql}"
        );
    }

    #[test]
    fn field_where_maps_null_to_is_null() {
        let filter = User::field_where(UserField::Password, CmpOp::Eq, ScalarValue::Null).unwrap();
        assert_eq!(filter, UserWhere::Password(NullableFilter::IsNull));
        assert!(User::field_where(UserField::Email, CmpOp::Eq, ScalarValue::Int(1)).is_err());
    }

    #[test]
    fn ordering_appends_sort_keys() {
        let query: users::BoxedQuery<'static, Pg> = users::table.into_boxed();
        let query = order(query, SortBy::desc(UserField::CreatedAt));
        let query = order(query, SortBy::asc(UserField::Id));
        let sql = debug_query::<Pg, _>(&query.select(users::id)).to_string();
        assert!(
            sql.contains("ORDER BY \"users\".\"created_at\" DESC, \"users\".\"id\" ASC"),
            "{sql}"
        );
    }

    #[test]
    fn field_names_are_snake_case() {
        assert_eq!(UserField::IsVerified.name(), "is_verified");
        assert_eq!(UserField::CreatedAt.to_string(), "created_at");
        assert!(UserField::Password.is_nullable());
        assert_eq!(UserField::ALL.len(), 8);
    }
}
