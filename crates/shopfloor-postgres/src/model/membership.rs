//! Membership model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{Organization, User, generate_id, impl_changeset};
use crate::schema::memberships;
use crate::types::{HasCreatedAt, HasUpdatedAt};

/// Binds a user to an organization with a role and sign-in credentials.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = memberships)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Organization))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Membership {
    /// Unique membership identifier.
    pub id: String,
    /// Member account.
    pub user_id: String,
    /// Organization joined.
    pub organization_id: String,
    /// Access role within the organization.
    pub access_role: String,
    /// Job title on the shop floor.
    pub business_role: Option<String>,
    /// Membership status.
    pub status: String,
    /// Enabled sign-in methods (`rfid`, `qr`, `usb`, ...).
    pub auth_methods: Vec<String>,
    /// RFID badge identifier.
    pub rfid_tag: Option<String>,
    /// QR badge payload.
    pub qr_code: Option<String>,
    /// USB security key identifier.
    pub usb_key_id: Option<String>,
    /// Timestamp when the membership was created.
    pub created_at: Timestamp,
    /// Timestamp when the membership was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new membership.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = memberships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewMembership {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// User.
    pub user_id: String,
    /// Organization.
    pub organization_id: String,
    /// Access role.
    pub access_role: String,
    /// Business role.
    pub business_role: Option<String>,
    /// Status.
    pub status: String,
    /// Sign-in methods.
    pub auth_methods: Option<Vec<String>>,
    /// RFID tag.
    pub rfid_tag: Option<String>,
    /// QR code.
    pub qr_code: Option<String>,
    /// USB key.
    pub usb_key_id: Option<String>,
}

/// Data for updating a membership.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = memberships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateMembership {
    /// Access role.
    pub access_role: Option<String>,
    /// Business role.
    pub business_role: Option<Option<String>>,
    /// Status.
    pub status: Option<String>,
    /// Sign-in methods.
    pub auth_methods: Option<Vec<String>>,
    /// RFID tag.
    pub rfid_tag: Option<Option<String>>,
    /// QR code.
    pub qr_code: Option<Option<String>>,
    /// USB key.
    pub usb_key_id: Option<Option<String>>,
}

impl_changeset!(UpdateMembership {
    access_role,
    business_role,
    status,
    auth_methods,
    rfid_tag,
    qr_code,
    usb_key_id,
});

impl NewMembership {
    /// Creates a membership with a generated id.
    pub fn new(
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        access_role: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(generate_id()),
            user_id: user_id.into(),
            organization_id: organization_id.into(),
            access_role: access_role.into(),
            status: status.into(),
            ..Default::default()
        }
    }
}

impl Membership {
    /// Returns whether the given sign-in method is enabled.
    pub fn has_auth_method(&self, method: &str) -> bool {
        self.auth_methods.iter().any(|m| m == method)
    }

    /// Returns whether any badge or key credential is assigned.
    pub fn has_credential(&self) -> bool {
        self.rfid_tag.is_some() || self.qr_code.is_some() || self.usb_key_id.is_some()
    }
}

impl HasCreatedAt for Membership {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasUpdatedAt for Membership {
    fn updated_at(&self) -> jiff::Timestamp {
        self.updated_at.into()
    }
}
