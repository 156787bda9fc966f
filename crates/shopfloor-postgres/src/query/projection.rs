//! Field projections.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{ScalarField, ScalarValue};

/// Selected scalar fields of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Projection<F: Ord>(BTreeMap<F, ScalarValue>);

impl<F: ScalarField> Projection<F> {
    /// Reads `fields` from `row`. No fields selects every field.
    pub fn of<R>(row: &R, fields: &[F], value: impl Fn(&R, F) -> ScalarValue) -> Self {
        let fields = if fields.is_empty() { F::ALL } else { fields };
        Self(fields.iter().map(|field| (*field, value(row, *field))).collect())
    }

    /// Value of a projected field.
    pub fn get(&self, field: F) -> Option<&ScalarValue> {
        self.0.get(&field)
    }

    /// Number of projected fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no field was projected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the projection.
    pub fn into_inner(self) -> BTreeMap<F, ScalarValue> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::aggregate::tests::{Job, JobField, job_value};

    #[test]
    fn projection_selects_requested_fields() {
        let job = Job("paint", None);
        let projection = Projection::of(&job, &[JobField::Minutes], job_value);
        assert_eq!(projection.len(), 1);
        assert_eq!(projection.get(JobField::Minutes), Some(&ScalarValue::Null));
        assert!(projection.get(JobField::Stage).is_none());

        let projection = Projection::of(&job, &[], job_value);
        assert_eq!(projection.len(), JobField::ALL.len());
    }
}
