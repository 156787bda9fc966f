//! Pagination types for the bespoke listings.

mod cursor;
mod offset;

pub use cursor::{Cursor, CursorPage, CursorPagination};
pub use offset::{OffsetPage, OffsetPagination};
