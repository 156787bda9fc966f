//! Tasks table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `tasks` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum TaskConstraints {
    // Uniqueness constraints
    #[strum(serialize = "tasks_pkey")]
    PrimaryKey,
    #[strum(serialize = "tasks_vehicle_id_stage_id_sequence_key")]
    SequenceUnique,

    // Validation constraints
    #[strum(serialize = "tasks_estimated_duration_positive")]
    EstimatedDurationPositive,

    // Foreign key constraints
    #[strum(serialize = "tasks_vehicle_id_fkey")]
    VehicleReference,
    #[strum(serialize = "tasks_stage_id_fkey")]
    StageReference,
}

impl TaskConstraints {
    /// Creates a new [`TaskConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            TaskConstraints::PrimaryKey
            | TaskConstraints::SequenceUnique => ConstraintCategory::Uniqueness,

            TaskConstraints::EstimatedDurationPositive => ConstraintCategory::Validation,

            TaskConstraints::VehicleReference
            | TaskConstraints::StageReference => ConstraintCategory::Relation,
        }
    }
}

impl From<TaskConstraints> for String {
    #[inline]
    fn from(val: TaskConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for TaskConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
