//! Offset pagination for listings that need random page access.

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::constants::database::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Offset pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct OffsetPagination {
    /// Maximum number of records to return.
    pub limit: i64,
    /// Number of records to skip.
    pub offset: i64,
    /// Whether to run the extra `COUNT(*)` query.
    #[serde(default)]
    pub include_count: bool,
}

impl OffsetPagination {
    /// Creates pagination from a limit and an offset.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            offset: offset.max(0),
            include_count: false,
        }
    }

    /// Creates pagination from a 1-based page number.
    pub fn from_page(page: i64, page_size: i64) -> Self {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        Self::new(page_size, (page.max(1) - 1) * page_size)
    }

    /// Enables the total count.
    pub fn with_count(mut self) -> Self {
        self.include_count = true;
        self
    }

    /// Current 1-based page number.
    pub fn page_number(&self) -> i64 {
        self.offset / self.limit + 1
    }
}

impl Default for OffsetPagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, 0)
    }
}

/// One page of an offset-paginated listing.
#[derive(Debug, Clone)]
pub struct OffsetPage<T> {
    /// Rows of this page.
    pub items: Vec<T>,
    /// Total number of matching rows, when requested.
    pub total: Option<i64>,
}

impl<T> OffsetPage<T> {
    /// Creates a new page.
    pub fn new(items: Vec<T>, total: Option<i64>) -> Self {
        Self { items, total }
    }

    /// Maps the rows to a different type.
    pub fn map<U, F>(self, f: F) -> OffsetPage<U>
    where
        F: FnMut(T) -> U,
    {
        OffsetPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }

    /// Whether rows remain after this page. Unknown without a total.
    pub fn has_more(&self, pagination: &OffsetPagination) -> Option<bool> {
        self.total
            .map(|total| pagination.offset + (self.items.len() as i64) < total)
    }

    /// Number of pages. Unknown without a total.
    pub fn total_pages(&self, pagination: &OffsetPagination) -> Option<i64> {
        self.total
            .map(|total| (total + pagination.limit - 1) / pagination.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_limit_and_offset() {
        let pagination = OffsetPagination::new(0, -5);
        assert_eq!(pagination.limit, 1);
        assert_eq!(pagination.offset, 0);
        assert_eq!(OffsetPagination::new(5000, 0).limit, MAX_PAGE_SIZE);
        assert_eq!(OffsetPagination::default().limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn pages_map_to_offsets() {
        let pagination = OffsetPagination::from_page(3, 10);
        assert_eq!(pagination.offset, 20);
        assert_eq!(pagination.page_number(), 3);
        assert_eq!(OffsetPagination::from_page(0, 10).offset, 0);
    }

    #[test]
    fn totals_drive_has_more() {
        let pagination = OffsetPagination::new(10, 0);
        let page = OffsetPage::new((0..10).collect::<Vec<_>>(), Some(25));
        assert_eq!(page.has_more(&pagination), Some(true));
        assert_eq!(page.total_pages(&pagination), Some(3));

        let page = OffsetPage::new(vec![1], None);
        assert_eq!(page.has_more(&pagination), None);
    }
}
