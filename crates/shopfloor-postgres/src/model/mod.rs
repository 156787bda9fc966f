//! Database models for all entities in the system.
//!
//! Each entity has a read struct, an insert struct (`NewX`) and a change set
//! (`UpdateX`). Insert structs created through `NewX::new` carry a
//! client-generated UUIDv7 id; `NewX::default()` leaves the id to the
//! database default.

mod invite;
mod membership;
mod organization;
mod session;
mod stage;
mod task;
mod task_progress;
mod user;
mod vehicle;

use uuid::Uuid;

// Identity models
pub use invite::{Invite, NewInvite, UpdateInvite};
pub use membership::{Membership, NewMembership, UpdateMembership};
pub use organization::{NewOrganization, Organization, UpdateOrganization};
pub use session::{NewSession, Session, UpdateSession};
pub use user::{NewUser, UpdateUser, User};
// Workshop models
pub use stage::{NewStage, Stage, UpdateStage};
pub use task::{NewTask, Task, UpdateTask};
pub use task_progress::{NewTaskProgress, TaskProgress, UpdateTaskProgress};
pub use vehicle::{NewVehicle, UpdateVehicle, Vehicle};

/// Returns a fresh, time-ordered primary key.
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Implemented by every change set.
pub trait Changeset {
    /// Returns whether the change set would not modify any column.
    fn is_empty(&self) -> bool;
}

/// Implements [`Changeset`] by checking that every field is `None`.
macro_rules! impl_changeset {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::model::Changeset for $ty {
            fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())+
            }
        }
    };
}

pub(crate) use impl_changeset;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let first = generate_id();
        let second = generate_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 36);
    }
}
