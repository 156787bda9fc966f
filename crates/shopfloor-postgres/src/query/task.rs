//! Task filters, delegate hooks and repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use jiff::Timestamp;
#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use super::entity::{Entity, entity_queries, index_by_id, where_input};
use super::predicate::{
    BoxedPredicate, and_all, field_columns, negate, nullable_column, or_any, scalar_column,
    text_column, to_many, to_one,
};
use super::stage::{self, StageWhere};
use super::task_progress::{self, TaskProgressWhere};
use super::vehicle::{self, VehicleWhere};
use crate::model::{NewTask, Stage, Task, TaskProgress, UpdateTask, Vehicle};
use crate::schema::{stages, task_progress as task_progress_table, tasks, vehicles};
use crate::types::{
    BoolFilter, CmpOp, CompareFilter, DateTimeFilter, FieldKind, IntFilter, ListRelationFilter,
    NullableFilter, RelationFilter, ScalarField, ScalarValue, StringFilter,
};
use crate::{PgConnection, PgError, PgResult};

/// Scalar fields of [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize, Display, IntoStaticStr)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskField {
    Id,
    Title,
    Sequence,
    Description,
    EstimatedDuration,
    Priority,
    IsCompleted,
    VehicleId,
    StageId,
    CreatedAt,
    UpdatedAt,
}

impl ScalarField for TaskField {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Title,
        Self::Sequence,
        Self::Description,
        Self::EstimatedDuration,
        Self::Priority,
        Self::IsCompleted,
        Self::VehicleId,
        Self::StageId,
        Self::CreatedAt,
        Self::UpdatedAt,
    ];

    fn name(self) -> &'static str {
        self.into()
    }

    fn kind(self) -> FieldKind {
        match self {
            Self::Sequence | Self::EstimatedDuration => FieldKind::Int,
            Self::IsCompleted => FieldKind::Bool,
            Self::CreatedAt | Self::UpdatedAt => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    fn is_nullable(self) -> bool {
        matches!(
            self,
            Self::Description | Self::EstimatedDuration | Self::Priority
        )
    }
}

/// Filter tree over tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskWhere {
    And(Vec<TaskWhere>),
    Or(Vec<TaskWhere>),
    Not(Box<TaskWhere>),
    Id(StringFilter),
    Title(StringFilter),
    Sequence(IntFilter),
    Description(NullableFilter<StringFilter>),
    EstimatedDuration(NullableFilter<IntFilter>),
    Priority(NullableFilter<StringFilter>),
    IsCompleted(BoolFilter),
    VehicleId(StringFilter),
    StageId(StringFilter),
    CreatedAt(DateTimeFilter),
    UpdatedAt(DateTimeFilter),
    Vehicle(RelationFilter<VehicleWhere>),
    Stage(RelationFilter<StageWhere>),
    Progress(ListRelationFilter<TaskProgressWhere>),
}

where_input!(TaskWhere);

/// Unique selectors of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskWhereUnique {
    Id(String),
    VehicleIdStageIdSequence {
        vehicle_id: String,
        stage_id: String,
        sequence: i32,
    },
}

impl From<TaskWhereUnique> for TaskWhere {
    fn from(unique: TaskWhereUnique) -> Self {
        match unique {
            TaskWhereUnique::Id(id) => TaskWhere::Id(StringFilter::equals(id)),
            TaskWhereUnique::VehicleIdStageIdSequence {
                vehicle_id,
                stage_id,
                sequence,
            } => TaskWhere::And(vec![
                TaskWhere::VehicleId(StringFilter::equals(vehicle_id)),
                TaskWhere::StageId(StringFilter::equals(stage_id)),
                TaskWhere::Sequence(IntFilter::Equals(sequence)),
            ]),
        }
    }
}

/// Relations loaded by `*_with` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskInclude {
    pub vehicle: bool,
    pub stage: bool,
    pub progress: bool,
}

/// A task with its included relations.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskWithRelations {
    pub task: Task,
    pub vehicle: Option<Vehicle>,
    pub stage: Option<Stage>,
    pub progress: Option<Vec<TaskProgress>>,
}

text_column!(id_filter, tasks, tasks::id);
text_column!(title_filter, tasks, tasks::title);
scalar_column!(sequence_filter, tasks, tasks::sequence, i32, std::convert::identity);
text_column!(description_value, tasks, tasks::description.assume_not_null());
nullable_column!(description_filter, tasks, tasks::description, StringFilter, description_value);
scalar_column!(
    estimated_duration_value,
    tasks,
    tasks::estimated_duration.assume_not_null(),
    i32,
    std::convert::identity
);
nullable_column!(
    estimated_duration_filter,
    tasks,
    tasks::estimated_duration,
    IntFilter,
    estimated_duration_value
);
text_column!(priority_value, tasks, tasks::priority.assume_not_null());
nullable_column!(priority_filter, tasks, tasks::priority, StringFilter, priority_value);
scalar_column!(is_completed_filter, tasks, tasks::is_completed, bool, std::convert::identity);
text_column!(vehicle_id_filter, tasks, tasks::vehicle_id);
text_column!(stage_id_filter, tasks, tasks::stage_id);
scalar_column!(created_at_filter, tasks, tasks::created_at, Timestamp, jiff_diesel::Timestamp::from);
scalar_column!(updated_at_filter, tasks, tasks::updated_at, Timestamp, jiff_diesel::Timestamp::from);

/// Compiles a task filter into a predicate on `tasks`.
pub(crate) fn compile(filter: &TaskWhere) -> BoxedPredicate<tasks::table> {
    match filter {
        TaskWhere::And(items) => and_all(items.iter().map(compile)),
        TaskWhere::Or(items) => or_any(items.iter().map(compile)),
        TaskWhere::Not(inner) => negate(compile(inner)),
        TaskWhere::Id(f) => id_filter(f),
        TaskWhere::Title(f) => title_filter(f),
        TaskWhere::Sequence(f) => sequence_filter(f),
        TaskWhere::Description(f) => description_filter(f),
        TaskWhere::EstimatedDuration(f) => estimated_duration_filter(f),
        TaskWhere::Priority(f) => priority_filter(f),
        TaskWhere::IsCompleted(f) => is_completed_filter(f),
        TaskWhere::VehicleId(f) => vehicle_id_filter(f),
        TaskWhere::StageId(f) => stage_id_filter(f),
        TaskWhere::CreatedAt(f) => created_at_filter(f),
        TaskWhere::UpdatedAt(f) => updated_at_filter(f),
        TaskWhere::Vehicle(f) => {
            to_one!(required f, tasks::vehicle_id, vehicles, vehicle::compile)
        }
        TaskWhere::Stage(f) => to_one!(required f, tasks::stage_id, stages, stage::compile),
        TaskWhere::Progress(f) => to_many!(
            f,
            tasks::id,
            task_progress_table,
            task_progress_table::task_id,
            task_progress::compile
        ),
    }
}

field_columns!(tasks, TaskField {
    Id => id,
    Title => title,
    Sequence => sequence,
    Description => description,
    EstimatedDuration => estimated_duration,
    Priority => priority,
    IsCompleted => is_completed,
    VehicleId => vehicle_id,
    StageId => stage_id,
    CreatedAt => created_at,
    UpdatedAt => updated_at,
});

impl Entity for Task {
    type Create = NewTask;
    type Field = TaskField;
    type Include = TaskInclude;
    type Unique = TaskWhereUnique;
    type Update = UpdateTask;
    type Where = TaskWhere;
    type WithRelations = TaskWithRelations;

    const ID: TaskField = TaskField::Id;
    const MODEL: &'static str = "Task";

    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self, field: TaskField) -> ScalarValue {
        match field {
            TaskField::Id => self.id.clone().into(),
            TaskField::Title => self.title.clone().into(),
            TaskField::Sequence => self.sequence.into(),
            TaskField::Description => self.description.clone().into(),
            TaskField::EstimatedDuration => self.estimated_duration.into(),
            TaskField::Priority => self.priority.clone().into(),
            TaskField::IsCompleted => self.is_completed.into(),
            TaskField::VehicleId => self.vehicle_id.clone().into(),
            TaskField::StageId => self.stage_id.clone().into(),
            TaskField::CreatedAt => self.created_at.into(),
            TaskField::UpdatedAt => self.updated_at.into(),
        }
    }

    fn field_where(field: TaskField, op: CmpOp, value: ScalarValue) -> PgResult<TaskWhere> {
        use TaskWhere as W;

        Ok(match field {
            TaskField::Id => W::Id(CompareFilter::compare(op, value)?),
            TaskField::Title => W::Title(CompareFilter::compare(op, value)?),
            TaskField::Sequence => W::Sequence(CompareFilter::compare(op, value)?),
            TaskField::Description => W::Description(CompareFilter::compare(op, value)?),
            TaskField::EstimatedDuration => {
                W::EstimatedDuration(CompareFilter::compare(op, value)?)
            }
            TaskField::Priority => W::Priority(CompareFilter::compare(op, value)?),
            TaskField::IsCompleted => W::IsCompleted(CompareFilter::compare(op, value)?),
            TaskField::VehicleId => W::VehicleId(CompareFilter::compare(op, value)?),
            TaskField::StageId => W::StageId(CompareFilter::compare(op, value)?),
            TaskField::CreatedAt => W::CreatedAt(CompareFilter::compare(op, value)?),
            TaskField::UpdatedAt => W::UpdatedAt(CompareFilter::compare(op, value)?),
        })
    }

    fn unique_where(unique: TaskWhereUnique) -> TaskWhere {
        unique.into()
    }

    entity_queries!(tasks, compile, order, column);

    async fn include(
        conn: &mut PgConnection,
        rows: Vec<Task>,
        include: TaskInclude,
    ) -> PgResult<Vec<TaskWithRelations>> {
        let vehicles = if include.vehicle && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|t| t.vehicle_id.clone()));
            Some(index_by_id::<Vehicle>(conn, VehicleWhere::Id(ids)).await?)
        } else {
            None
        };

        let stages = if include.stage && !rows.is_empty() {
            let ids = StringFilter::any_of(rows.iter().map(|t| t.stage_id.clone()));
            Some(index_by_id::<Stage>(conn, StageWhere::Id(ids)).await?)
        } else {
            None
        };

        let mut progress = if include.progress && !rows.is_empty() {
            let children: Vec<TaskProgress> = TaskProgress::belonging_to(&rows)
                .select(TaskProgress::as_select())
                .order(task_progress_table::created_at.asc())
                .load(conn)
                .await
                .map_err(PgError::from)?;
            Some(children.grouped_by(&rows).into_iter())
        } else {
            None
        };

        Ok(rows
            .into_iter()
            .map(|task| TaskWithRelations {
                vehicle: vehicles
                    .as_ref()
                    .and_then(|index| index.get(&task.vehicle_id).cloned()),
                stage: stages
                    .as_ref()
                    .and_then(|index| index.get(&task.stage_id).cloned()),
                progress: progress.as_mut().and_then(Iterator::next),
                task,
            })
            .collect())
    }
}

/// Repository for task operations the application runs directly.
pub trait TaskRepository {
    /// Lists a vehicle's tasks within one stage in work order.
    fn list_stage_tasks(
        &mut self,
        vehicle_id: &str,
        stage_id: &str,
    ) -> impl Future<Output = PgResult<Vec<Task>>> + Send;

    /// Marks a task as done.
    fn complete_task(&mut self, task_id: &str) -> impl Future<Output = PgResult<Task>> + Send;

    /// Counts the vehicle's unfinished tasks across all stages.
    fn count_open_tasks(
        &mut self,
        vehicle_id: &str,
    ) -> impl Future<Output = PgResult<i64>> + Send;
}

impl TaskRepository for PgConnection {
    async fn list_stage_tasks(&mut self, vehicle_id: &str, stage_id: &str) -> PgResult<Vec<Task>> {
        tasks::table
            .filter(tasks::vehicle_id.eq(vehicle_id))
            .filter(tasks::stage_id.eq(stage_id))
            .select(Task::as_select())
            .order(tasks::sequence.asc())
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn complete_task(&mut self, task_id: &str) -> PgResult<Task> {
        diesel::update(tasks::table.filter(tasks::id.eq(task_id)))
            .set(tasks::is_completed.eq(true))
            .returning(Task::as_returning())
            .get_result(self)
            .await
            .optional()
            .map_err(PgError::from)?
            .ok_or_else(|| PgError::not_found(Task::MODEL, "complete_task"))
    }

    async fn count_open_tasks(&mut self, vehicle_id: &str) -> PgResult<i64> {
        tasks::table
            .filter(tasks::vehicle_id.eq(vehicle_id))
            .filter(tasks::is_completed.eq(false))
            .count()
            .get_result(self)
            .await
            .map_err(PgError::from)
    }
}

#[cfg(test)]
mod tests {
    use diesel::debug_query;
    use diesel::pg::Pg;

    use super::*;

    fn sql(filter: &TaskWhere) -> String {
        let query = tasks::table.filter(compile(filter)).select(tasks::id);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn compound_unique_matches_three_keys() {
        let filter = TaskWhere::from(TaskWhereUnique::VehicleIdStageIdSequence {
            vehicle_id: "v".into(),
            stage_id: "s".into(),
            sequence: 1,
        });
        let sql = sql(&filter);
        assert!(sql.contains("\"tasks\".\"vehicle_id\" = $1"), "{sql}");
        assert!(sql.contains("\"tasks\".\"stage_id\" = $2"), "{sql}");
        assert!(sql.contains("\"tasks\".\"sequence\" = $3"), "{sql}");
    }

    #[test]
    fn or_of_nullable_estimates() {
        let filter = TaskWhere::Or(vec![
            TaskWhere::EstimatedDuration(NullableFilter::IsNull),
            TaskWhere::EstimatedDuration(NullableFilter::Value(IntFilter::Lt(30))),
        ]);
        let sql = sql(&filter);
        assert!(sql.contains("(\"tasks\".\"estimated_duration\" IS NULL) OR"), "{sql}");
        assert!(sql.contains("\"tasks\".\"estimated_duration\" < $1"), "{sql}");
    }

    #[test]
    fn stage_relation_subselect() {
        let filter = TaskWhere::Stage(RelationFilter::is(StageWhere::IsRequired(
            BoolFilter::Equals(true),
        )));
        let sql = sql(&filter);
        assert!(sql.contains("\"tasks\".\"stage_id\" IN (SELECT \"stages\".\"id\""), "{sql}");
    }

    #[test]
    fn field_where_rejects_wrong_types() {
        assert!(Task::field_where(TaskField::Sequence, CmpOp::Gt, ScalarValue::Int(2)).is_ok());
        assert!(Task::field_where(TaskField::Sequence, CmpOp::Gt, "2".into()).is_err());
        let filter =
            Task::field_where(TaskField::EstimatedDuration, CmpOp::Ne, ScalarValue::Null).unwrap();
        assert_eq!(filter, TaskWhere::EstimatedDuration(NullableFilter::IsNotNull));
    }
}
