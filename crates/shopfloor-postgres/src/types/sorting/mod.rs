//! Sorting options for database queries.
//!
//! [`SortBy`] is used both by the generic delegate (with a model's field
//! enum) and by the bespoke listings (with a narrow sort-field enum).

mod members;

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use members::{MemberSortBy, MemberSortField};

/// Sort order direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending order. Nulls sort last.
    #[default]
    Asc,
    /// Descending order. Nulls sort first.
    Desc,
}

impl SortOrder {
    /// Returns the opposite direction.
    #[inline]
    pub fn reverse(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// Sort specification with field and order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct SortBy<F> {
    /// The field to sort by.
    pub field: F,
    /// The sort order direction.
    #[serde(default)]
    pub order: SortOrder,
}

impl<F: Default> Default for SortBy<F> {
    fn default() -> Self {
        Self {
            field: F::default(),
            order: SortOrder::default(),
        }
    }
}

impl<F> SortBy<F> {
    /// Creates a new sort specification.
    #[inline]
    pub fn new(field: F, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Ascending on `field`.
    #[inline]
    pub fn asc(field: F) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    /// Descending on `field`.
    #[inline]
    pub fn desc(field: F) -> Self {
        Self::new(field, SortOrder::Desc)
    }

    /// Returns whether the sort order is ascending.
    #[inline]
    pub fn is_asc(&self) -> bool {
        matches!(self.order, SortOrder::Asc)
    }

    /// Returns the same field in the opposite direction.
    #[inline]
    pub fn reversed(self) -> Self {
        Self::new(self.field, self.order.reverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_flips_direction() {
        let sort = SortBy::asc("sequence").reversed();
        assert_eq!(sort.order, SortOrder::Desc);
        assert!(!sort.is_asc());
    }
}
