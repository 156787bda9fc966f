//! Constraints, filters, pagination, sorting and other shared types.

pub mod constants;
mod constraint;
mod filtering;
mod pagination;
mod sorting;
mod utilities;
mod value;

pub use constraint::{
    ConstraintCategory, ConstraintViolation, InviteConstraints, MembershipConstraints,
    OrganizationConstraints, SessionConstraints, StageConstraints, TaskConstraints,
    TaskProgressConstraints, UserConstraints, VehicleConstraints,
};
pub use filtering::{
    BoolFilter, CompareFilter, DateTimeFilter, IntFilter, ListRelationFilter, MemberFilter,
    NullableFilter, QueryMode, RelationFilter, ScalarFilter, StringFilter, StringListFilter,
};
pub use pagination::{Cursor, CursorPage, CursorPagination, OffsetPage, OffsetPagination};
pub use sorting::{MemberSortBy, MemberSortField, SortBy, SortOrder};
pub use utilities::{
    HasCreatedAt, HasExpiresAt, HasUpdatedAt, RECENTLY_CREATED, RECENTLY_UPDATED, is_within,
};
pub use value::{CmpOp, FieldKind, ScalarField, ScalarValue};
