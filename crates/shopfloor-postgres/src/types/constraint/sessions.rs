//! Sessions table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `sessions` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum SessionConstraints {
    // Uniqueness constraints
    #[strum(serialize = "sessions_pkey")]
    PrimaryKey,
    #[strum(serialize = "sessions_sid_key")]
    SidUnique,
}

impl SessionConstraints {
    /// Creates a new [`SessionConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        ConstraintCategory::Uniqueness
    }
}

impl From<SessionConstraints> for String {
    #[inline]
    fn from(val: SessionConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for SessionConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
