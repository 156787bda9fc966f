//! Filtering options for database queries.
//!
//! Field and relation filters are the building blocks of every model's
//! `Where` tree; [`MemberFilter`] is the flat filter of the member listing.

mod field;
mod members;
mod relation;

pub use field::{
    BoolFilter, CompareFilter, DateTimeFilter, IntFilter, NullableFilter, QueryMode,
    ScalarFilter, StringFilter, StringListFilter,
};
pub use members::MemberFilter;
pub use relation::{ListRelationFilter, RelationFilter};
