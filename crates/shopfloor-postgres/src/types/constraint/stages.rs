//! Stages table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `stages` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum StageConstraints {
    // Uniqueness constraints
    #[strum(serialize = "stages_pkey")]
    PrimaryKey,
    #[strum(serialize = "stages_organization_id_sequence_key")]
    SequenceUnique,

    // Foreign key constraints
    #[strum(serialize = "stages_organization_id_fkey")]
    OrganizationReference,
}

impl StageConstraints {
    /// Creates a new [`StageConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            StageConstraints::PrimaryKey
            | StageConstraints::SequenceUnique => ConstraintCategory::Uniqueness,

            StageConstraints::OrganizationReference => ConstraintCategory::Relation,
        }
    }
}

impl From<StageConstraints> for String {
    #[inline]
    fn from(val: StageConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for StageConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
