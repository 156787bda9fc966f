//! Task model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{Stage, Vehicle, generate_id, impl_changeset};
use crate::schema::tasks;
use crate::types::{HasCreatedAt, HasUpdatedAt};

/// Unit of work performed on a vehicle within a stage.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Vehicle))]
#[diesel(belongs_to(Stage))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Title.
    pub title: String,
    /// Position within the vehicle's stage, unique per `(vehicle, stage)`.
    pub sequence: i32,
    /// Details.
    pub description: Option<String>,
    /// Estimate in minutes.
    pub estimated_duration: Option<i32>,
    /// Priority label.
    pub priority: Option<String>,
    /// Whether the task is done.
    pub is_completed: bool,
    /// Vehicle worked on.
    pub vehicle_id: String,
    /// Stage the task belongs to.
    pub stage_id: String,
    /// Timestamp when the task was created.
    pub created_at: Timestamp,
    /// Timestamp when the task was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new task.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTask {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Title.
    pub title: String,
    /// Sequence.
    pub sequence: i32,
    /// Description.
    pub description: Option<String>,
    /// Estimate in minutes.
    pub estimated_duration: Option<i32>,
    /// Priority.
    pub priority: Option<String>,
    /// Completed flag.
    pub is_completed: Option<bool>,
    /// Vehicle.
    pub vehicle_id: String,
    /// Stage.
    pub stage_id: String,
}

/// Data for updating a task.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateTask {
    /// Title.
    pub title: Option<String>,
    /// Sequence.
    pub sequence: Option<i32>,
    /// Description.
    pub description: Option<Option<String>>,
    /// Estimate in minutes.
    pub estimated_duration: Option<Option<i32>>,
    /// Priority.
    pub priority: Option<Option<String>>,
    /// Completed flag.
    pub is_completed: Option<bool>,
    /// Stage.
    pub stage_id: Option<String>,
}

impl_changeset!(UpdateTask {
    title,
    sequence,
    description,
    estimated_duration,
    priority,
    is_completed,
    stage_id,
});

impl NewTask {
    /// Creates a task with a generated id.
    pub fn new(
        vehicle_id: impl Into<String>,
        stage_id: impl Into<String>,
        title: impl Into<String>,
        sequence: i32,
    ) -> Self {
        Self {
            id: Some(generate_id()),
            title: title.into(),
            sequence,
            vehicle_id: vehicle_id.into(),
            stage_id: stage_id.into(),
            ..Default::default()
        }
    }
}

impl Task {
    /// Returns the estimate as a duration.
    pub fn estimate(&self) -> Option<jiff::SignedDuration> {
        self.estimated_duration
            .map(|minutes| jiff::SignedDuration::from_mins(i64::from(minutes)))
    }
}

impl HasCreatedAt for Task {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasUpdatedAt for Task {
    fn updated_at(&self) -> jiff::Timestamp {
        self.updated_at.into()
    }
}
