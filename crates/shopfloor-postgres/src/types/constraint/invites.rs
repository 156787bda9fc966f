//! Invites table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `invites` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum InviteConstraints {
    // Uniqueness constraints
    #[strum(serialize = "invites_pkey")]
    PrimaryKey,
    #[strum(serialize = "invites_token_key")]
    TokenUnique,

    // Validation constraints
    #[strum(serialize = "invites_expires_after_created")]
    ExpiresAfterCreated,

    // Foreign key constraints
    #[strum(serialize = "invites_organization_id_fkey")]
    OrganizationReference,
}

impl InviteConstraints {
    /// Creates a new [`InviteConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            InviteConstraints::PrimaryKey
            | InviteConstraints::TokenUnique => ConstraintCategory::Uniqueness,

            InviteConstraints::ExpiresAfterCreated => ConstraintCategory::Validation,

            InviteConstraints::OrganizationReference => ConstraintCategory::Relation,
        }
    }
}

impl From<InviteConstraints> for String {
    #[inline]
    fn from(val: InviteConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for InviteConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
