//! Organization model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{generate_id, impl_changeset};
use crate::schema::organizations;
use crate::types::{HasCreatedAt, HasUpdatedAt};

/// Workshop operator owning stages, vehicles and members.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = organizations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Organization {
    /// Unique organization identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Organization type, stored in the `type` column.
    pub kind: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether the organization was verified.
    pub is_verified: bool,
    /// Timestamp when the organization was created.
    pub created_at: Timestamp,
    /// Timestamp when the organization was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new organization.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = organizations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewOrganization {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Name.
    pub name: String,
    /// Type.
    pub kind: String,
    /// Description.
    pub description: Option<String>,
    /// Verified flag.
    pub is_verified: Option<bool>,
}

/// Data for updating an organization.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = organizations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateOrganization {
    /// Name.
    pub name: Option<String>,
    /// Type.
    pub kind: Option<String>,
    /// Description.
    pub description: Option<Option<String>>,
    /// Verified flag.
    pub is_verified: Option<bool>,
}

impl_changeset!(UpdateOrganization {
    name,
    kind,
    description,
    is_verified,
});

impl NewOrganization {
    /// Creates an organization with a generated id.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: Some(generate_id()),
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Organization {
    /// Returns the description, or an empty string.
    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }
}

impl HasCreatedAt for Organization {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasUpdatedAt for Organization {
    fn updated_at(&self) -> jiff::Timestamp {
        self.updated_at.into()
    }
}
