//! Database constraint violations, one enum per table.
//!
//! [`ConstraintViolation`] unifies them so an error can be matched on the
//! exact constraint the database reported.

mod invites;
mod memberships;
mod organizations;
mod sessions;
mod stages;
mod task_progress;
mod tasks;
mod users;
mod vehicles;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::invites::InviteConstraints;
pub use self::memberships::MembershipConstraints;
pub use self::organizations::OrganizationConstraints;
pub use self::sessions::SessionConstraints;
pub use self::stages::StageConstraints;
pub use self::task_progress::TaskProgressConstraints;
pub use self::tasks::TaskConstraints;
pub use self::users::UserConstraints;
pub use self::vehicles::VehicleConstraints;

/// Any known constraint of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ConstraintViolation {
    // Identity
    User(UserConstraints),
    Organization(OrganizationConstraints),
    Membership(MembershipConstraints),
    Invite(InviteConstraints),
    Session(SessionConstraints),

    // Workshop
    Stage(StageConstraints),
    Vehicle(VehicleConstraints),
    Task(TaskConstraints),
    TaskProgress(TaskProgressConstraints),
}

/// Categories of database constraint violations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintCategory {
    /// Primary keys and unique keys.
    Uniqueness,
    /// Foreign keys.
    Relation,
    /// Check constraints.
    Validation,
}

impl ConstraintViolation {
    /// Parses a constraint name reported by the database.
    ///
    /// Returns `None` for names that do not belong to this schema.
    ///
    /// ```
    /// use shopfloor_postgres::types::{ConstraintViolation, UserConstraints};
    ///
    /// let violation = ConstraintViolation::new("users_email_key");
    /// assert_eq!(violation, Some(ConstraintViolation::User(UserConstraints::EmailUnique)));
    /// assert!(ConstraintViolation::new("unknown_constraint").is_none());
    /// ```
    pub fn new(constraint: &str) -> Option<Self> {
        let prefix = constraint.split('_').next()?;
        macro_rules! try_parse {
            ($($parser:expr => $variant:ident),+ $(,)?) => {
                None$(.or_else(|| $parser(constraint).map(Self::$variant)))+
            };
        }

        match prefix {
            "users" => try_parse!(UserConstraints::new => User),
            "organizations" => try_parse!(OrganizationConstraints::new => Organization),
            "memberships" => try_parse!(MembershipConstraints::new => Membership),
            "invites" => try_parse!(InviteConstraints::new => Invite),
            "sessions" => try_parse!(SessionConstraints::new => Session),
            "stages" => try_parse!(StageConstraints::new => Stage),
            "vehicles" => try_parse!(VehicleConstraints::new => Vehicle),
            "tasks" => try_parse!(TaskConstraints::new => Task),
            "task" => try_parse!(TaskProgressConstraints::new => TaskProgress),
            _ => None,
        }
    }

    /// Returns the table the constraint is declared on.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConstraintViolation::User(_) => "users",
            ConstraintViolation::Organization(_) => "organizations",
            ConstraintViolation::Membership(_) => "memberships",
            ConstraintViolation::Invite(_) => "invites",
            ConstraintViolation::Session(_) => "sessions",
            ConstraintViolation::Stage(_) => "stages",
            ConstraintViolation::Vehicle(_) => "vehicles",
            ConstraintViolation::Task(_) => "tasks",
            ConstraintViolation::TaskProgress(_) => "task_progress",
        }
    }

    /// Returns the category of this constraint violation.
    pub fn constraint_category(&self) -> ConstraintCategory {
        match self {
            ConstraintViolation::User(c) => c.categorize(),
            ConstraintViolation::Organization(c) => c.categorize(),
            ConstraintViolation::Membership(c) => c.categorize(),
            ConstraintViolation::Invite(c) => c.categorize(),
            ConstraintViolation::Session(c) => c.categorize(),
            ConstraintViolation::Stage(c) => c.categorize(),
            ConstraintViolation::Vehicle(c) => c.categorize(),
            ConstraintViolation::Task(c) => c.categorize(),
            ConstraintViolation::TaskProgress(c) => c.categorize(),
        }
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintViolation::User(c) => write!(f, "{c}"),
            ConstraintViolation::Organization(c) => write!(f, "{c}"),
            ConstraintViolation::Membership(c) => write!(f, "{c}"),
            ConstraintViolation::Invite(c) => write!(f, "{c}"),
            ConstraintViolation::Session(c) => write!(f, "{c}"),
            ConstraintViolation::Stage(c) => write!(f, "{c}"),
            ConstraintViolation::Vehicle(c) => write!(f, "{c}"),
            ConstraintViolation::Task(c) => write!(f, "{c}"),
            ConstraintViolation::TaskProgress(c) => write!(f, "{c}"),
        }
    }
}

impl From<ConstraintViolation> for String {
    #[inline]
    fn from(val: ConstraintViolation) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for ConstraintViolation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value).ok_or_else(|| format!("Unknown constraint: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_by_table_prefix() {
        assert_eq!(
            ConstraintViolation::new("memberships_rfid_tag_key"),
            Some(ConstraintViolation::Membership(
                MembershipConstraints::RfidTagUnique
            ))
        );
        assert_eq!(
            ConstraintViolation::new("tasks_vehicle_id_fkey"),
            Some(ConstraintViolation::Task(TaskConstraints::VehicleReference))
        );
        assert_eq!(
            ConstraintViolation::new("task_progress_completed_after_started"),
            Some(ConstraintViolation::TaskProgress(
                TaskProgressConstraints::CompletedAfterStarted
            ))
        );
        assert_eq!(ConstraintViolation::new("tasks_unknown_key"), None);
        assert_eq!(ConstraintViolation::new(""), None);
    }

    #[test]
    fn reports_table_and_category() {
        let violation = ConstraintViolation::Stage(StageConstraints::SequenceUnique);
        assert_eq!(violation.table_name(), "stages");
        assert_eq!(
            violation.constraint_category(),
            ConstraintCategory::Uniqueness
        );

        let violation = ConstraintViolation::Vehicle(VehicleConstraints::CurrentStageReference);
        assert_eq!(violation.constraint_category(), ConstraintCategory::Relation);

        let violation = ConstraintViolation::Invite(InviteConstraints::ExpiresAfterCreated);
        assert_eq!(
            violation.constraint_category(),
            ConstraintCategory::Validation
        );
    }

    #[test]
    fn serializes_as_constraint_name() {
        let violation = ConstraintViolation::User(UserConstraints::EmailUnique);
        assert_eq!(violation.to_string(), "users_email_key");

        let json = serde_json::to_string(&violation).unwrap();
        assert_eq!(json, "\"users_email_key\"");

        let parsed: ConstraintViolation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, violation);
    }
}
