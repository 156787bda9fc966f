//! Invite model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff::SignedDuration;
use jiff_diesel::Timestamp;

use super::{Organization, generate_id, impl_changeset};
use crate::schema::invites;
use crate::types::constants::invite::DEFAULT_EXPIRY_DAYS;
use crate::types::{HasCreatedAt, HasExpiresAt};

/// Pending invitation to join an organization.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = invites)]
#[diesel(belongs_to(Organization))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Invite {
    /// Unique invite identifier.
    pub id: String,
    /// Organization the invitee joins.
    pub organization_id: String,
    /// Invitee email.
    pub email: String,
    /// Access role granted on acceptance.
    pub access_role: String,
    /// Secret acceptance token.
    pub token: String,
    /// When the invite stops being valid.
    pub expires_at: Timestamp,
    /// Timestamp when the invite was created.
    pub created_at: Timestamp,
}

/// Data for creating a new invite.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = invites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewInvite {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Organization.
    pub organization_id: String,
    /// Invitee email.
    pub email: String,
    /// Access role.
    pub access_role: String,
    /// Token.
    pub token: String,
    /// Expiry.
    pub expires_at: Option<Timestamp>,
}

/// Data for updating an invite.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = invites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateInvite {
    /// Access role.
    pub access_role: Option<String>,
    /// Expiry.
    pub expires_at: Option<Timestamp>,
}

impl_changeset!(UpdateInvite {
    access_role,
    expires_at
});

impl NewInvite {
    /// Creates an invite with a generated id, valid for the default period.
    pub fn new(
        organization_id: impl Into<String>,
        email: impl Into<String>,
        access_role: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let expires_at =
            jiff::Timestamp::now() + SignedDuration::from_hours(DEFAULT_EXPIRY_DAYS * 24);

        Self {
            id: Some(generate_id()),
            organization_id: organization_id.into(),
            email: email.into(),
            access_role: access_role.into(),
            token: token.into(),
            expires_at: Some(expires_at.into()),
        }
    }

    /// Overrides the expiry.
    pub fn expires_at(mut self, expires_at: jiff::Timestamp) -> Self {
        self.expires_at = Some(expires_at.into());
        self
    }
}

impl Invite {
    /// Returns whether the invite can still be accepted.
    pub fn is_pending(&self) -> bool {
        !self.is_expired()
    }

    /// Returns the token shortened for logs.
    pub fn token_short(&self) -> &str {
        self.token.get(..8).unwrap_or(&self.token)
    }
}

impl HasCreatedAt for Invite {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasExpiresAt for Invite {
    fn expires_at(&self) -> jiff::Timestamp {
        self.expires_at.into()
    }
}
