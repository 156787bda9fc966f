//! Memberships table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `memberships` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum MembershipConstraints {
    // Uniqueness constraints
    #[strum(serialize = "memberships_pkey")]
    PrimaryKey,
    #[strum(serialize = "memberships_user_id_organization_id_key")]
    UserOrganizationUnique,
    #[strum(serialize = "memberships_rfid_tag_key")]
    RfidTagUnique,
    #[strum(serialize = "memberships_qr_code_key")]
    QrCodeUnique,
    #[strum(serialize = "memberships_usb_key_id_key")]
    UsbKeyIdUnique,

    // Foreign key constraints
    #[strum(serialize = "memberships_user_id_fkey")]
    UserReference,
    #[strum(serialize = "memberships_organization_id_fkey")]
    OrganizationReference,
}

impl MembershipConstraints {
    /// Creates a new [`MembershipConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            MembershipConstraints::PrimaryKey
            | MembershipConstraints::UserOrganizationUnique
            | MembershipConstraints::RfidTagUnique
            | MembershipConstraints::QrCodeUnique
            | MembershipConstraints::UsbKeyIdUnique => ConstraintCategory::Uniqueness,

            MembershipConstraints::UserReference
            | MembershipConstraints::OrganizationReference => ConstraintCategory::Relation,
        }
    }
}

impl From<MembershipConstraints> for String {
    #[inline]
    fn from(val: MembershipConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for MembershipConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
