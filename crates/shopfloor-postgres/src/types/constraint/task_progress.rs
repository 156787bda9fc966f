//! Task progress table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `task_progress` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum TaskProgressConstraints {
    // Uniqueness constraints
    #[strum(serialize = "task_progress_pkey")]
    PrimaryKey,

    // Validation constraints
    #[strum(serialize = "task_progress_completed_after_started")]
    CompletedAfterStarted,

    // Foreign key constraints
    #[strum(serialize = "task_progress_task_id_fkey")]
    TaskReference,
    #[strum(serialize = "task_progress_worker_membership_id_fkey")]
    WorkerReference,
}

impl TaskProgressConstraints {
    /// Creates a new [`TaskProgressConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            TaskProgressConstraints::PrimaryKey => ConstraintCategory::Uniqueness,

            TaskProgressConstraints::CompletedAfterStarted => ConstraintCategory::Validation,

            TaskProgressConstraints::TaskReference
            | TaskProgressConstraints::WorkerReference => ConstraintCategory::Relation,
        }
    }
}

impl From<TaskProgressConstraints> for String {
    #[inline]
    fn from(val: TaskProgressConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for TaskProgressConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
