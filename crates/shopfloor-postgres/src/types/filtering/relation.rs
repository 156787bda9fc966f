//! Conditions across a relation.

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition on a to-many relation, evaluated against the related rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ListRelationFilter<W> {
    /// At least one related row matches.
    Some(Box<W>),
    /// Every related row matches. Holds when there are no related rows.
    Every(Box<W>),
    /// No related row matches.
    None(Box<W>),
}

impl<W> ListRelationFilter<W> {
    /// At least one related row matches `filter`.
    pub fn some(filter: W) -> Self {
        Self::Some(Box::new(filter))
    }

    /// Every related row matches `filter`.
    pub fn every(filter: W) -> Self {
        Self::Every(Box::new(filter))
    }

    /// No related row matches `filter`.
    pub fn none(filter: W) -> Self {
        Self::None(Box::new(filter))
    }
}

/// Condition on a to-one relation.
///
/// For an optional relation, `IsNot` also holds when the relation is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum RelationFilter<W> {
    /// The related row exists and matches.
    Is(Box<W>),
    /// The related row does not match.
    IsNot(Box<W>),
}

impl<W> RelationFilter<W> {
    /// The related row matches `filter`.
    pub fn is(filter: W) -> Self {
        Self::Is(Box::new(filter))
    }

    /// The related row does not match `filter`.
    pub fn is_not(filter: W) -> Self {
        Self::IsNot(Box::new(filter))
    }
}
