//! Helpers shared across the models.

mod time_helpers;

pub use time_helpers::{
    HasCreatedAt, HasExpiresAt, HasUpdatedAt, RECENTLY_CREATED, RECENTLY_UPDATED, is_within,
};
