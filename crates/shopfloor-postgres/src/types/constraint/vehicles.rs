//! Vehicles table constraint violations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::ConstraintCategory;

/// `vehicles` table constraint violations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[derive(Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(into = "String", try_from = "String")]
pub enum VehicleConstraints {
    // Uniqueness constraints
    #[strum(serialize = "vehicles_pkey")]
    PrimaryKey,
    #[strum(serialize = "vehicles_vin_key")]
    VinUnique,
    #[strum(serialize = "vehicles_qr_code_token_key")]
    QrCodeTokenUnique,
    #[strum(serialize = "vehicles_tracking_token_key")]
    TrackingTokenUnique,

    // Foreign key constraints
    #[strum(serialize = "vehicles_organization_id_fkey")]
    OrganizationReference,
    #[strum(serialize = "vehicles_current_stage_id_fkey")]
    CurrentStageReference,
}

impl VehicleConstraints {
    /// Creates a new [`VehicleConstraints`] from the constraint name.
    pub fn new(constraint: &str) -> Option<Self> {
        constraint.parse().ok()
    }

    /// Returns the category of this constraint violation.
    pub fn categorize(&self) -> ConstraintCategory {
        match self {
            VehicleConstraints::PrimaryKey
            | VehicleConstraints::VinUnique
            | VehicleConstraints::QrCodeTokenUnique
            | VehicleConstraints::TrackingTokenUnique => ConstraintCategory::Uniqueness,

            VehicleConstraints::OrganizationReference
            | VehicleConstraints::CurrentStageReference => ConstraintCategory::Relation,
        }
    }
}

impl From<VehicleConstraints> for String {
    #[inline]
    fn from(val: VehicleConstraints) -> Self {
        val.to_string()
    }
}

impl TryFrom<String> for VehicleConstraints {
    type Error = strum::ParseError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
