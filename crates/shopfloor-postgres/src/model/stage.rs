//! Stage model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{Organization, generate_id, impl_changeset};
use crate::schema::stages;
use crate::types::{HasCreatedAt, HasUpdatedAt};

/// Ordered station of an organization's workshop floor.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = stages)]
#[diesel(belongs_to(Organization))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Stage {
    /// Unique stage identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Icon name.
    pub icon: Option<String>,
    /// Display color as an HSL triple.
    pub color_hsl: Option<String>,
    /// Grouping category.
    pub category: Option<String>,
    /// Position within the organization, unique per organization.
    pub sequence: i32,
    /// Whether vehicles may enter the stage.
    pub is_active: bool,
    /// Whether vehicles may not skip the stage.
    pub is_required: bool,
    /// Owning organization.
    pub organization_id: String,
    /// Timestamp when the stage was created.
    pub created_at: Timestamp,
    /// Timestamp when the stage was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new stage.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = stages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewStage {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Name.
    pub name: String,
    /// Icon.
    pub icon: Option<String>,
    /// Color.
    pub color_hsl: Option<String>,
    /// Category.
    pub category: Option<String>,
    /// Sequence.
    pub sequence: i32,
    /// Active flag.
    pub is_active: Option<bool>,
    /// Required flag.
    pub is_required: Option<bool>,
    /// Organization.
    pub organization_id: String,
}

/// Data for updating a stage.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = stages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateStage {
    /// Name.
    pub name: Option<String>,
    /// Icon.
    pub icon: Option<Option<String>>,
    /// Color.
    pub color_hsl: Option<Option<String>>,
    /// Category.
    pub category: Option<Option<String>>,
    /// Sequence.
    pub sequence: Option<i32>,
    /// Active flag.
    pub is_active: Option<bool>,
    /// Required flag.
    pub is_required: Option<bool>,
}

impl_changeset!(UpdateStage {
    name,
    icon,
    color_hsl,
    category,
    sequence,
    is_active,
    is_required,
});

impl NewStage {
    /// Creates a stage with a generated id.
    pub fn new(organization_id: impl Into<String>, name: impl Into<String>, sequence: i32) -> Self {
        Self {
            id: Some(generate_id()),
            name: name.into(),
            sequence,
            organization_id: organization_id.into(),
            ..Default::default()
        }
    }
}

impl Stage {
    /// Returns whether vehicles may skip the stage.
    pub fn is_optional(&self) -> bool {
        !self.is_required
    }
}

impl HasCreatedAt for Stage {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasUpdatedAt for Stage {
    fn updated_at(&self) -> jiff::Timestamp {
        self.updated_at.into()
    }
}
