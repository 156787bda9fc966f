//! Argument bundles of the delegate reads.

use super::aggregate::{AggregateSelection, GroupOrder, Grouping, Having};
use super::entity::Entity;
use crate::types::SortBy;

/// Arguments of `find_many`, `find_first` and `count`.
#[derive(Debug, Clone)]
pub struct FindManyArgs<M: Entity> {
    /// Row filter; matches everything by default.
    pub filter: M::Where,
    /// Sort keys. The primary key is appended as the final tiebreaker.
    pub order_by: Vec<SortBy<M::Field>>,
    /// Row the page starts at, inclusive.
    pub cursor: Option<M::Unique>,
    /// Rows to skip after the cursor.
    pub skip: Option<i64>,
    /// Page size. Negative values page backwards from the cursor or end.
    pub take: Option<i64>,
    /// Fields whose value combination must be unique in the result.
    pub distinct: Vec<M::Field>,
}

impl<M: Entity> Default for FindManyArgs<M> {
    fn default() -> Self {
        Self {
            filter: M::Where::default(),
            order_by: Vec::new(),
            cursor: None,
            skip: None,
            take: None,
            distinct: Vec::new(),
        }
    }
}

impl<M: Entity> FindManyArgs<M> {
    /// Matches every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches rows satisfying `filter`.
    pub fn filter(mut self, filter: M::Where) -> Self {
        self.filter = filter;
        self
    }

    /// Appends a sort key.
    pub fn order_by(mut self, sort: SortBy<M::Field>) -> Self {
        self.order_by.push(sort);
        self
    }

    /// Starts the page at the row identified by `cursor`.
    pub fn cursor(mut self, cursor: M::Unique) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Skips `skip` rows.
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Returns at most `|take|` rows.
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    /// Deduplicates on `fields`.
    pub fn distinct(mut self, fields: impl IntoIterator<Item = M::Field>) -> Self {
        self.distinct.extend(fields);
        self
    }
}

/// Arguments of `aggregate`.
#[derive(Debug, Clone)]
pub struct AggregateArgs<M: Entity> {
    /// Rows to aggregate over.
    pub window: FindManyArgs<M>,
    /// Aggregates to compute.
    pub select: AggregateSelection<M::Field>,
}

impl<M: Entity> AggregateArgs<M> {
    /// Aggregates over every row.
    pub fn new(select: AggregateSelection<M::Field>) -> Self {
        Self {
            window: FindManyArgs::default(),
            select,
        }
    }

    /// Aggregates over the rows `find_many(window)` would return.
    pub fn window(mut self, window: FindManyArgs<M>) -> Self {
        self.window = window;
        self
    }
}

/// Arguments of `group_by`.
#[derive(Debug, Clone)]
pub struct GroupByArgs<M: Entity> {
    /// Row filter applied before grouping.
    pub filter: M::Where,
    /// Grouping, `having`, ordering and window of groups.
    pub grouping: Grouping<M::Field>,
}

impl<M: Entity> GroupByArgs<M> {
    /// Groups every row by `by`.
    pub fn new(by: impl IntoIterator<Item = M::Field>) -> Self {
        Self {
            filter: M::Where::default(),
            grouping: Grouping::new(by),
        }
    }

    /// Groups only rows satisfying `filter`.
    pub fn filter(mut self, filter: M::Where) -> Self {
        self.filter = filter;
        self
    }

    /// Keeps groups satisfying `having`.
    pub fn having(mut self, having: Having<M::Field>) -> Self {
        self.grouping.having = Some(having);
        self
    }

    /// Appends a group ordering.
    pub fn order_by(mut self, order: GroupOrder<M::Field>) -> Self {
        self.grouping.order_by.push(order);
        self
    }

    /// Skips `skip` groups.
    pub fn skip(mut self, skip: i64) -> Self {
        self.grouping.skip = Some(skip);
        self
    }

    /// Returns at most `take` groups.
    pub fn take(mut self, take: i64) -> Self {
        self.grouping.take = Some(take);
        self
    }

    /// Aggregates computed per group.
    pub fn select(mut self, select: AggregateSelection<M::Field>) -> Self {
        self.grouping.select = select;
        self
    }
}
