//! Users table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `users` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum UserConstraints {
    // Uniqueness constraints
    #[strum(serialize = "users_pkey")]
    PrimaryKey,
    #[strum(serialize = "users_email_key")]
    EmailUnique,

    // Validation constraints
    #[strum(serialize = "users_email_not_empty")]
    EmailNotEmpty,
}

impl UserConstraints {
    /// Creates a new [`UserConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            UserConstraints::PrimaryKey
            | UserConstraints::EmailUnique => ConstraintCategory::Uniqueness,

            UserConstraints::EmailNotEmpty => ConstraintCategory::Validation,
        }
    }
}

impl From<UserConstraints> for String {
    #[inline]
    fn from(val: UserConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for UserConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
