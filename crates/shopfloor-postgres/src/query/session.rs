//! Session filters, delegate hooks and repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::{SignedDuration, Timestamp};
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, where_input};
use super::predicate::{
    BoxedPredicate, and_all, field_columns, negate, or_any, scalar_column, text_column,
};
use crate::model::{NewSession, Session, UpdateSession};
use crate::schema::sessions;
use crate::types::constants::session::DEFAULT_TTL_HOURS;
use crate::types::{
    CmpOp, CompareFilter, DateTimeFilter, FieldKind, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY};

/// Scalar fields of [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionField {
    Id,
    Sid,
    Data,
    ExpiresAt,
    CreatedAt,
}

impl ScalarField for SessionField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Sid,
        Self::Data,
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

/// Filter tree over sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum SessionWhere {
    And(Vec<SessionWhere>),
    Or(Vec<SessionWhere>),
    Not(Box<SessionWhere>),
    Id(StringFilter),
    Sid(StringFilter),
    Data(StringFilter),
    ExpiresAt(DateTimeFilter),
    CreatedAt(DateTimeFilter),
}

where_input!(SessionWhere);

/// Unique selectors of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum SessionWhereUnique {
    Id(String),
    Sid(String),
}

impl From<SessionWhereUnique> for SessionWhere {
    fn from(unique: SessionWhereUnique) -> Self {
        match unique {
            SessionWhereUnique::Id(id) => SessionWhere::Id(StringFilter::equals(id)),
            SessionWhereUnique::Sid(sid) => SessionWhere::Sid(StringFilter::equals(sid)),
        }
    }
}

/// Sessions have no relations; the include set is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionInclude;

/// A session returned by `*_with` reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWithRelations {
    pub session: Session,
}

text_column!(id_filter, sessions, sessions::id);
text_column!(sid_filter, sessions, sessions::sid);
text_column!(data_filter, sessions, sessions::data);
scalar_column!(expires_at_filter, sessions, sessions::expires_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(created_at_filter, sessions, sessions::created_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles a session filter into a predicate on `sessions`.
pub(crate) fn compile(filter: &SessionWhere) -> BoxedPredicate<sessions::table> {
    match filter {
        SessionWhere::And(items) => and_all(items.iter().map(compile)),
        SessionWhere::Or(items) => or_any(items.iter().map(compile)),
        SessionWhere::Not(inner) => negate(compile(inner)),
        SessionWhere::Id(f) => id_filter(f),
        SessionWhere::Sid(f) => sid_filter(f),
        SessionWhere::Data(f) => data_filter(f),
        SessionWhere::ExpiresAt(f) => expires_at_filter(f),
        SessionWhere::CreatedAt(f) => created_at_filter(f),
    }
}

field_columns!(sessions, SessionField {
    Id => id,
    Sid => sid,
    Data => data,
    ExpiresAt => expires_at,
    CreatedAt => created_at,
});

impl Entity for Session {
    type Create = NewSession;
    type Field = SessionField;
    type Include = SessionInclude;
    type Unique = SessionWhereUnique;
    type Update = UpdateSession;
    type Where = SessionWhere;
    type WithRelations = SessionWithRelations;

    const ID: SessionField = SessionField::Id;
    const MODEL: &'static str = "Session";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: SessionField) -> ScalarValue {
        match field {
            SessionField::Id => self.id.clone().into(),
            SessionField::Sid => self.sid.clone().into(),
            SessionField::Data => self.data.clone().into(),
            SessionField::ExpiresAt => self.expires_at.into(),
            SessionField::CreatedAt => self.created_at.into(),
        }
    }

    fn field_where(field: SessionField, op: CmpOp, value: ScalarValue) -> PgResult<SessionWhere> {
        Ok(match field {
            SessionField::Id => SessionWhere::Id(CompareFilter::compare(op, value)?),
            SessionField::Sid => SessionWhere::Sid(CompareFilter::compare(op, value)?),
            SessionField::Data => SessionWhere::Data(CompareFilter::compare(op, value)?),
            SessionField::ExpiresAt => SessionWhere::ExpiresAt(CompareFilter::compare(op, value)?),
            SessionField::CreatedAt => SessionWhere::CreatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: SessionWhereUnique) -> SessionWhere {
        unique.into()
    }

    entity_queries!(sessions, compile, order, column);

    async fn include(
        _conn: &mut PgConnection,
        rows: Vec<Session>,
        _include: SessionInclude,
    ) -> PgResult<Vec<SessionWithRelations>> {
        Ok(rows
            .into_iter()
            .map(|session| SessionWithRelations { session })
            .collect())
    }
}

fn next_expiry() -> jiff_diesel::Timestamp {
    (Timestamp::now() + SignedDuration::from_hours(DEFAULT_TTL_HOURS)).into()
}

/// Repository for session store operations.
pub trait SessionRepository {
    /// Finds a session by sid unless it has expired.
    fn find_live_session(
        &mut self,
        sid: &str,
    ) -> impl Future<Output = PgResult<Option<Session>>> + Send;

    /// Pushes the expiry of a live session one lifetime ahead.
    fn touch_session(&mut self, sid: &str) -> impl Future<Output = PgResult<Session>> + Send;

    /// Stores a session payload, creating the session when the sid is unknown.
    ///
    /// The expiry is renewed either way.
    fn replace_session_data(
        &mut self,
        sid: &str,
        data: String,
    ) -> impl Future<Output = PgResult<Session>> + Send;

    /// Deletes a session, returning whether it existed.
    fn delete_session_by_sid(&mut self, sid: &str) -> impl Future<Output = PgResult<bool>> + Send;

    /// Deletes every expired session.
    fn delete_expired_sessions(&mut self) -> impl Future<Output = PgResult<usize>> + Send;
}

impl SessionRepository for PgConnection {
    async fn find_live_session(&mut self, sid: &str) -> PgResult<Option<Session>> {
        let now = jiff_diesel::Timestamp::from(Timestamp::now());

        sessions::table
            .filter(sessions::sid.eq(sid))
            .filter(sessions::expires_at.gt(now))
            .select(Session::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn touch_session(&mut self, sid: &str) -> PgResult<Session> {
        let now = jiff_diesel::Timestamp::from(Timestamp::now());

        diesel::update(
            sessions::table
                .filter(sessions::sid.eq(sid))
                .filter(sessions::expires_at.gt(now)),
        )
        .set(sessions::expires_at.eq(next_expiry()))
        .returning(Session::as_returning())
        .get_result(self)
        .await
        .optional()
        .map_err(PgError::from)?
        .ok_or_else(|| PgError::not_found(Session::MODEL, "touch_session"))
    }

    async fn replace_session_data(&mut self, sid: &str, data: String) -> PgResult<Session> {
        let new_session = NewSession::new(sid, data.clone());
        let changes = UpdateSession {
            data: Some(data),
            expires_at: Some(next_expiry()),
        };

        diesel::insert_into(sessions::table)
            .values(&new_session)
            .on_conflict(sessions::sid)
            .do_update()
            .set(&changes)
            .returning(Session::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn delete_session_by_sid(&mut self, sid: &str) -> PgResult<bool> {
        let deleted = diesel::delete(sessions::table.filter(sessions::sid.eq(sid)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        Ok(deleted > 0)
    }

    async fn delete_expired_sessions(&mut self) -> PgResult<usize> {
        let now = jiff_diesel::Timestamp::from(Timestamp::now());
        let deleted = diesel::delete(sessions::table.filter(sessions::expires_at.le(now)))
            .execute(self)
            .await
            .map_err(PgError::from)?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            model = Session::MODEL,
            deleted,
            "Expired sessions deleted"
        );

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;

    #[test]
    fn sid_selector_compiles_to_equality() {
        let filter = SessionWhere::from(SessionWhereUnique::Sid("abc".into()));
        let query = sessions::table.filter(compile(&filter)).select(sessions::id);
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("\"sessions\".\"sid\" = $1"), "{sql}");
    }

    #[test]
    fn expiry_renewal_is_one_lifetime_ahead() {
        let before = Timestamp::now();
        let expiry = Timestamp::from(next_expiry());
        let ahead = expiry.duration_since(before);
        assert!(ahead >= SignedDuration::from_hours(DEFAULT_TTL_HOURS));
        assert!(ahead < SignedDuration::from_hours(DEFAULT_TTL_HOURS + 1));
    }

    #[test]
    fn data_is_not_nullable() {
        assert!(
            Session::field_where(SessionField::Data, CmpOp::Eq, ScalarValue::Null).is_err()
        );
        assert_eq!(SessionField::ALL.len(), 5);
    }
}
