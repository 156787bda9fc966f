//! Task progress filters, delegate hooks and repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, index_by_id, where_input};
use super::membership::{self, MembershipWhere};
use super::predicate::{
    BoxedPredicate, and_all, field_columns, negate, nullable_column, or_any, scalar_column,
    text_column, to_one,
};
use super::task::{self, TaskWhere};
use crate::model::{Membership, NewTaskProgress, Task, TaskProgress, UpdateTaskProgress};
use crate::schema::{memberships, task_progress, tasks};
use crate::types::constants::task_progress::{STATUS_COMPLETED, STATUS_IN_PROGRESS};
use crate::types::{
    CmpOp, CompareFilter, DateTimeFilter, FieldKind, NullableFilter, RelationFilter, ScalarField,
    ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY};

/// Scalar fields of [`TaskProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskProgressField {
    Id,
    Status,
    Notes,
    StartedAt,
    CompletedAt,
    TaskId,
    WorkerMembershipId,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for TaskProgressField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Status,
        Self::Notes,
        Self::StartedAt,
        Self::CompletedAt,
        Self::TaskId,
        Self::WorkerMembershipId,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::StartedAt | Self::CompletedAt | Self::CreatedAt | Self::UpdatedAt => {
                FieldKind::Timestamp
            }
            _ => FieldKind::Text,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::Notes | Self::StartedAt | Self::CompletedAt | Self::WorkerMembershipId
        )
    }
}

/// Filter tree over progress records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskProgressWhere {
    And(Vec<TaskProgressWhere>),
    Or(Vec<TaskProgressWhere>),
    Not(Box<TaskProgressWhere>),
    Id(StringFilter),
    Status(StringFilter),
    Notes(NullableFilter<StringFilter>),
    StartedAt(NullableFilter<DateTimeFilter>),
    CompletedAt(NullableFilter<DateTimeFilter>),
    TaskId(StringFilter),
    WorkerMembershipId(NullableFilter<StringFilter>),
    CreatedAt(DateTimeFilter),
    UpdatedAt(DateTimeFilter),
    Task(RelationFilter<TaskWhere>),
    /// Membership of the worker who did the work.
    Worker(RelationFilter<MembershipWhere>),
}

where_input!(TaskProgressWhere);

/// Unique selectors of a progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskProgressWhereUnique {
    Id(String),
}

impl From<TaskProgressWhereUnique> for TaskProgressWhere {
    fn from(unique: TaskProgressWhereUnique) -> Self {
        match unique {
            TaskProgressWhereUnique::Id(id) => TaskProgressWhere::Id(StringFilter::equals(id)),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskProgressInclude {
    pub task: bool,
    pub worker: bool,
}

/// A progress record with its included relations.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgressWithRelations {
    pub progress: TaskProgress,
    pub task: Option<Task>,
    /// `None` both when not requested and when no worker is attributed.
    pub worker: Option<Membership>,
}

text_column!(id_filter, task_progress, task_progress::id);
text_column!(status_filter, task_progress, task_progress::status);
text_column!(notes_value, task_progress, task_progress::notes.assume_not_null());
nullable_column!(notes_filter, task_progress, task_progress::notes, StringFilter, notes_value);
scalar_column!(
    started_at_value,
    task_progress,
    task_progress::started_at.assume_not_null(),
    Timestamp,
    jiff_diesel::Timestamp::from
);
nullable_column!(
    started_at_filter,
    task_progress,
    task_progress::started_at,
    DateTimeFilter,
    started_at_value
);
scalar_column!(
    completed_at_value,
    task_progress,
    task_progress::completed_at.assume_not_null(),
    Timestamp,
    jiff_diesel::Timestamp::from
);
nullable_column!(
    completed_at_filter,
    task_progress,
    task_progress::completed_at,
    DateTimeFilter,
    completed_at_value
);
text_column!(task_id_filter, task_progress, task_progress::task_id);
text_column!(
    worker_membership_id_value,
    task_progress,
    task_progress::worker_membership_id.assume_not_null()
);
nullable_column!(
    worker_membership_id_filter,
    task_progress,
    task_progress::worker_membership_id,
    StringFilter,
    worker_membership_id_value
);
scalar_column!(created_at_filter, task_progress, task_progress::created_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(updated_at_filter, task_progress, task_progress::updated_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles a progress filter into a predicate on `task_progress`.
pub(crate) fn compile(filter: &TaskProgressWhere) -> BoxedPredicate<task_progress::table> {
    use TaskProgressWhere as W;

    match filter {
        W::And(items) => and_all(items.iter().map(compile)),
        W::Or(items) => or_any(items.iter().map(compile)),
        W::Not(inner) => negate(compile(inner)),
        W::Id(f) => id_filter(f),
        W::Status(f) => status_filter(f),
        W::Notes(f) => notes_filter(f),
        W::StartedAt(f) => started_at_filter(f),
        W::CompletedAt(f) => completed_at_filter(f),
        W::TaskId(f) => task_id_filter(f),
        W::WorkerMembershipId(f) => worker_membership_id_filter(f),
        W::CreatedAt(f) => created_at_filter(f),
        W::UpdatedAt(f) => updated_at_filter(f),
        W::Task(f) => to_one!(required f, task_progress::task_id, tasks, task::compile),
        W::Worker(f) => to_one!(
            optional f,
            task_progress::worker_membership_id,
            memberships,
            membership::compile
        ),
    }
}

field_columns!(task_progress, TaskProgressField {
    Id => id,
    Status => status,
    Notes => notes,
    StartedAt => started_at,
    CompletedAt => completed_at,
    TaskId => task_id,
    WorkerMembershipId => worker_membership_id,
    CreatedAt => created_at,
    UpdatedAt => updated_at,
});

impl Entity for TaskProgress {
    type Create = NewTaskProgress;
    type Field = TaskProgressField;
    type Include = TaskProgressInclude;
    type Unique = TaskProgressWhereUnique;
    type Update = UpdateTaskProgress;
    type Where = TaskProgressWhere;
    type WithRelations = TaskProgressWithRelations;

    const ID: TaskProgressField = TaskProgressField::Id;
    const MODEL: &'static str = "TaskProgress";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: TaskProgressField) -> ScalarValue {
        use TaskProgressField as F;

        match field {
            F::Id => self.id.clone().into(),
            F::Status => self.status.clone().into(),
            F::Notes => self.notes.clone().into(),
            F::StartedAt => self.started_at.into(),
            F::CompletedAt => self.completed_at.into(),
            F::TaskId => self.task_id.clone().into(),
            F::WorkerMembershipId => self.worker_membership_id.clone().into(),
            F::CreatedAt => self.created_at.into(),
            F::UpdatedAt => self.updated_at.into(),
        }
    }

    fn field_where(
        field: TaskProgressField,
        op: CmpOp,
        value: ScalarValue,
    ) -> PgResult<TaskProgressWhere> {
        use TaskProgressField as F;
        use TaskProgressWhere as W;

        Ok(match field {
            F::Id => W::Id(CompareFilter::compare(op, value)?),
            F::Status => W::Status(CompareFilter::compare(op, value)?),
            F::Notes => W::Notes(CompareFilter::compare(op, value)?),
            F::StartedAt => W::StartedAt(CompareFilter::compare(op, value)?),
            F::CompletedAt => W::CompletedAt(CompareFilter::compare(op, value)?),
            F::TaskId => W::TaskId(CompareFilter::compare(op, value)?),
            F::WorkerMembershipId => W::WorkerMembershipId(CompareFilter::compare(op, value)?),
            F::CreatedAt => W::CreatedAt(CompareFilter::compare(op, value)?),
            F::UpdatedAt => W::UpdatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: TaskProgressWhereUnique) -> TaskProgressWhere {
        unique.into()
    }

    entity_queries!(task_progress, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<TaskProgress>,
        include: TaskProgressInclude,
    ) -> PgResult<Vec<TaskProgressWithRelations>> {
        let tasks = if include.task && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|p| p.task_id.clone()));
            Some(index_by_id::<Task>(conn, TaskWhere::Id(ids)).await?)
        } else {
            None
        };

        let workers = if include.worker && !rows.is_empty() {
            let ids =
                StringFilter::any_of(rows.iter().filter_map(|p| p.worker_membership_id.clone()));
            Some(index_by_id::<Membership>(conn, MembershipWhere::Id(ids)).await?)
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|progress| TaskProgressWithRelations {
                task: tasks
                    .as_ref()
                    .and_then(|index| index.get(&progress.task_id).cloned()),
                worker: workers.as_ref().and_then(|index| {
                    progress
                        .worker_membership_id
                        .as_ref()
                        .and_then(|id| index.get(id).cloned())
                }),
                progress,
            })
            .collect())
    }
}

/// Repository for progress operations the application runs directly.
pub trait TaskProgressRepository {
    /// Records that work on a task started now.
    fn start_task_progress(
        &mut self,
        task_id: &str,
        worker_membership_id: Option<&str>,
    ) -> impl Future<Output = PgResult<TaskProgress>> + Send;

    /// Finishes open work, optionally replacing its notes.
    ///
    /// Returns [`PgError::NotFound`] when no unfinished record has the id.
    fn complete_task_progress(
        &mut self,
        progress_id: &str,
        notes: Option<String>,
    ) -> impl Future<Output = PgResult<TaskProgress>> + Send;

    /// Lists the progress history of a task, oldest first.
    fn list_task_progress(
        &mut self,
        task_id: &str,
    ) -> impl Future<Output = PgResult<Vec<TaskProgress>>> + Send;

    /// Lists unfinished work attributed to a worker.
    fn list_worker_active_progress(
        &mut self,
        worker_membership_id: &str,
    ) -> impl Future<Output = PgResult<Vec<TaskProgress>>> + Send;
}

impl TaskProgressRepository for PgConnection {
    async fn start_task_progress(
        &mut self,
        task_id: &str,
        worker_membership_id: Option<&str>,
    ) -> PgResult<TaskProgress> {
        let mut new_progress = NewTaskProgress::new(task_id, STATUS_IN_PROGRESS);
        new_progress.started_at = Some(Timestamp::now().into());
        if let Some(worker) = worker_membership_id {
            new_progress = new_progress.with_worker(worker);
        }

        let progress = diesel::insert_into(task_progress::table)
            .values(&new_progress)
            .returning(TaskProgress::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            progress_id = %progress.id,
            task_id = %progress.task_id,
            "Task progress started"
        );

        Ok(progress)
    }

    async fn complete_task_progress(
        &mut self,
        progress_id: &str,
        notes: Option<String>,
    ) -> PgResult<TaskProgress> {
        let changes = UpdateTaskProgress {
            status: Some(STATUS_COMPLETED.to_owned()),
            notes: notes.map(Some),
            completed_at: Some(Some(Timestamp::now().into())),
            ..Default::default()
        };

        diesel::update(
            task_progress::table
                .filter(task_progress::id.eq(progress_id))
                .filter(task_progress::completed_at.is_null()),
        )
        .set(&changes)
        .returning(TaskProgress::as_returning())
        .get_result(self)
        .await
        .optional()
        .map_err(PgError::from)?
        .ok_or_else(|| PgError::not_found(TaskProgress::MODEL, "complete_task_progress"))
    }

    async fn list_task_progress(&mut self, task_id: &str) -> PgResult<Vec<TaskProgress>> {
        task_progress::table
            .filter(task_progress::task_id.eq(task_id))
            .select(TaskProgress::as_select())
            .order((task_progress::created_at.asc(), task_progress::id.asc()))
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn list_worker_active_progress(
        &mut self,
        worker_membership_id: &str,
    ) -> PgResult<Vec<TaskProgress>> {
        task_progress::table
            .filter(task_progress::worker_membership_id.eq(worker_membership_id))
            .filter(task_progress::completed_at.is_null())
            .select(TaskProgress::as_select())
            .order(task_progress::started_at.asc())
            .load(self)
            .await
            .map_err(PgError::from)
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;
    use crate::types::ListRelationFilter;

    fn sql(filter: &TaskProgressWhere) -> String {
        let query = task_progress::table
            .filter(compile(filter))
            .select(task_progress::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn worker_is_not_keeps_unattributed_rows() {
        let filter = TaskProgressWhere::Worker(RelationFilter::is_not(MembershipWhere::Id(
            StringFilter::equals("m1"),
        )));
        let sql = sql(&filter);
        assert!(
            sql.contains("(\"task_progress\".\"worker_membership_id\" IS NULL) OR"),
            "{sql}"
        );
        assert!(sql.contains("NOT IN (SELECT \"memberships\".\"id\""), "{sql}");
    }

    #[test]
    fn open_work_filter() {
        let filter = TaskProgressWhere::And(vec![
            TaskProgressWhere::CompletedAt(NullableFilter::IsNull),
            TaskProgressWhere::StartedAt(NullableFilter::IsNotNull),
        ]);
        let sql = sql(&filter);
        assert!(sql.contains("\"task_progress\".\"completed_at\" IS NULL"), "{sql}");
        assert!(sql.contains("\"task_progress\".\"started_at\" IS NOT NULL"), "{sql}");
    }

    #[test]
    fn nested_task_relation() {
        let filter = TaskProgressWhere::Task(RelationFilter::is(TaskWhere::Progress(
            ListRelationFilter::none(TaskProgressWhere::Status(StringFilter::equals(
                STATUS_COMPLETED,
            ))),
        )));
        let sql = sql(&filter);
        assert!(
            sql.contains("\"task_progress\".\"task_id\" IN (SELECT \"tasks\".\"id\""),
            "{sql}"
        );
    }

    #[test]
    fn timestamps_are_comparable() {
        assert_eq!(TaskProgressField::StartedAt.kind(), FieldKind::Timestamp);
        assert!(TaskProgressField::StartedAt.is_nullable());
        assert!(!TaskProgressField::Status.is_nullable());
        assert!(
            TaskProgress::field_where(TaskProgressField::CompletedAt, CmpOp::Eq, ScalarValue::Null)
                .is_ok()
        );
    }
}
