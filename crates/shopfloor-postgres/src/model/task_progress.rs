//! Task progress model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{Membership, Task, generate_id, impl_changeset};
use crate::schema::task_progress;
use crate::types::{HasCreatedAt, HasUpdatedAt};

/// Record of work performed on a task, optionally by a worker.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = task_progress)]
#[diesel(belongs_to(Task))]
#[diesel(belongs_to(Membership, foreign_key = worker_membership_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskProgress {
    /// Unique progress identifier.
    pub id: String,
    /// Progress status.
    pub status: String,
    /// Worker notes.
    pub notes: Option<String>,
    /// When work started.
    pub started_at: Option<Timestamp>,
    /// When work finished.
    pub completed_at: Option<Timestamp>,
    /// Task worked on.
    pub task_id: String,
    /// Membership of the worker.
    pub worker_membership_id: Option<String>,
    /// Timestamp when the record was created.
    pub created_at: Timestamp,
    /// Timestamp when the record was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new progress record.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = task_progress)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTaskProgress {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Status.
    pub status: String,
    /// Notes.
    pub notes: Option<String>,
    /// Start time.
    pub started_at: Option<Timestamp>,
    /// Completion time.
    pub completed_at: Option<Timestamp>,
    /// Task.
    pub task_id: String,
    /// Worker.
    pub worker_membership_id: Option<String>,
}

/// Data for updating a progress record.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = task_progress)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateTaskProgress {
    /// Status.
    pub status: Option<String>,
    /// Notes.
    pub notes: Option<Option<String>>,
    /// Start time.
    pub started_at: Option<Option<Timestamp>>,
    /// Completion time.
    pub completed_at: Option<Option<Timestamp>>,
    /// Worker.
    pub worker_membership_id: Option<Option<String>>,
}

impl_changeset!(UpdateTaskProgress {
    status,
    notes,
    started_at,
    completed_at,
    worker_membership_id,
});

impl NewTaskProgress {
    /// Creates a progress record with a generated id.
    pub fn new(task_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: Some(generate_id()),
            status: status.into(),
            task_id: task_id.into(),
            ..Default::default()
        }
    }

    /// Attributes the work to a worker.
    pub fn with_worker(mut self, membership_id: impl Into<String>) -> Self {
        self.worker_membership_id = Some(membership_id.into());
        self
    }
}

impl TaskProgress {
    /// Returns whether work started and has not finished.
    pub fn is_in_progress(&self) -> bool {
        self.started_at.is_some() && self.completed_at.is_none()
    }

    /// Returns whether work finished.
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns the time spent, once both endpoints are known.
    pub fn duration(&self) -> Option<jiff::SignedDuration> {
        let started = jiff::Timestamp::from(self.started_at?);
        let completed = jiff::Timestamp::from(self.completed_at?);
        Some(completed.duration_since(started))
    }
}

impl HasCreatedAt for TaskProgress {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasUpdatedAt for TaskProgress {
    fn updated_at(&self) -> jiff::Timestamp {
        self.updated_at.into()
    }
}
