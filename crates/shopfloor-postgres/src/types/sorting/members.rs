//! Sorting options for organization member queries.

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::SortBy;

/// Fields available for sorting organization members.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum MemberSortField {
    /// Sort by the member's display name.
    Name,
    /// Sort by access role.
    Role,
    /// Sort by join date.
    #[default]
    Date,
}

/// Sorting specification for organization members.
pub type MemberSortBy = SortBy<MemberSortField>;
