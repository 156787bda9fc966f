//! Session model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff::SignedDuration;
use jiff_diesel::Timestamp;

use super::{generate_id, impl_changeset};
use crate::schema::sessions;
use crate::types::constants::session::DEFAULT_TTL_HOURS;
use crate::types::{HasCreatedAt, HasExpiresAt};

/// Server-side web session.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Session {
    /// Unique session row identifier.
    pub id: String,
    /// Session id presented by the client.
    pub sid: String,
    /// Opaque serialized session payload.
    pub data: String,
    /// When the session stops being valid.
    pub expires_at: Timestamp,
    /// Timestamp when the session was created.
    pub created_at: Timestamp,
}

/// Data for creating a new session.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewSession {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Session id.
    pub sid: String,
    /// Payload.
    pub data: String,
    /// Expiry.
    pub expires_at: Timestamp,
}

/// Data for updating a session.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateSession {
    /// Payload.
    pub data: Option<String>,
    /// Expiry.
    pub expires_at: Option<Timestamp>,
}

impl_changeset!(UpdateSession { data, expires_at });

impl NewSession {
    /// Creates a session with a generated id and the default lifetime.
    pub fn new(sid: impl Into<String>, data: impl Into<String>) -> Self {
        let expires_at =
            jiff::Timestamp::now() + SignedDuration::from_hours(DEFAULT_TTL_HOURS);

        Self {
            id: Some(generate_id()),
            sid: sid.into(),
            data: data.into(),
            expires_at: expires_at.into(),
        }
    }
}

impl HasCreatedAt for Session {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasExpiresAt for Session {
    fn expires_at(&self) -> jiff::Timestamp {
        self.expires_at.into()
    }
}
