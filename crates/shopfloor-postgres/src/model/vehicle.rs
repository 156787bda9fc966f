//! Vehicle model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{Organization, Stage, generate_id, impl_changeset};
use crate::schema::vehicles;

/// Customer vehicle moving through the workshop.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = vehicles)]
#[diesel(belongs_to(Organization))]
#[diesel(belongs_to(Stage, foreign_key = current_stage_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Vehicle {
    /// Unique vehicle identifier.
    pub id: String,
    /// Vehicle identification number.
    pub vin: Option<String>,
    /// Token printed on the vehicle's QR tag.
    pub qr_code_token: String,
    /// Token of the customer's public tracking link.
    pub tracking_token: String,
    /// Manufacturer.
    pub brand: String,
    /// Model name.
    pub model: String,
    /// Model year.
    pub year: Option<i32>,
    /// License plate.
    pub registration_number: String,
    /// Customer name.
    pub customer_name: String,
    /// Customer email.
    pub customer_email: String,
    /// Customer phone.
    pub customer_phone: String,
    /// Whether the vehicle is still in the workshop.
    pub is_active: bool,
    /// Free-form notes.
    pub notes: String,
    /// When the vehicle arrived.
    pub entry_time: Timestamp,
    /// Promised completion time.
    pub estimated_completion: Option<Timestamp>,
    /// Owning organization.
    pub organization_id: String,
    /// Stage the vehicle currently occupies.
    pub current_stage_id: Option<String>,
}

/// Data for creating a new vehicle.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = vehicles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewVehicle {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// VIN.
    pub vin: Option<String>,
    /// QR token.
    pub qr_code_token: String,
    /// Tracking token.
    pub tracking_token: String,
    /// Brand.
    pub brand: String,
    /// Model.
    pub model: String,
    /// Year.
    pub year: Option<i32>,
    /// Registration number.
    pub registration_number: String,
    /// Customer name.
    pub customer_name: String,
    /// Customer email.
    pub customer_email: String,
    /// Customer phone.
    pub customer_phone: String,
    /// Active flag.
    pub is_active: Option<bool>,
    /// Notes.
    pub notes: Option<String>,
    /// Entry time.
    pub entry_time: Option<Timestamp>,
    /// Promised completion.
    pub estimated_completion: Option<Timestamp>,
    /// Organization.
    pub organization_id: String,
    /// Current stage.
    pub current_stage_id: Option<String>,
}

/// Data for updating a vehicle.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = vehicles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateVehicle {
    /// VIN.
    pub vin: Option<Option<String>>,
    /// Brand.
    pub brand: Option<String>,
    /// Model.
    pub model: Option<String>,
    /// Year.
    pub year: Option<Option<i32>>,
    /// Registration number.
    pub registration_number: Option<String>,
    /// Customer name.
    pub customer_name: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Customer phone.
    pub customer_phone: Option<String>,
    /// Active flag.
    pub is_active: Option<bool>,
    /// Notes.
    pub notes: Option<String>,
    /// Promised completion.
    pub estimated_completion: Option<Option<Timestamp>>,
    /// Current stage.
    pub current_stage_id: Option<Option<String>>,
}

impl_changeset!(UpdateVehicle {
    vin,
    brand,
    model,
    year,
    registration_number,
    customer_name,
    customer_email,
    customer_phone,
    is_active,
    notes,
    estimated_completion,
    current_stage_id,
});

impl NewVehicle {
    /// Creates a vehicle with a generated id.
    ///
    /// Customer details default to empty strings and can be filled in
    /// through the public fields.
    pub fn new(
        organization_id: impl Into<String>,
        qr_code_token: impl Into<String>,
        tracking_token: impl Into<String>,
        registration_number: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(generate_id()),
            organization_id: organization_id.into(),
            qr_code_token: qr_code_token.into(),
            tracking_token: tracking_token.into(),
            registration_number: registration_number.into(),
            ..Default::default()
        }
    }
}

impl Vehicle {
    /// Returns whether the promised completion time has passed while the
    /// vehicle is still in the workshop.
    pub fn is_overdue(&self) -> bool {
        self.is_active
            && self
                .estimated_completion
                .is_some_and(|eta| jiff::Timestamp::from(eta) < jiff::Timestamp::now())
    }

    /// Returns whether the vehicle has been assigned to a stage.
    pub fn is_staged(&self) -> bool {
        self.current_stage_id.is_some()
    }

    /// Returns how long the vehicle has been in the workshop.
    pub fn dwell_time(&self) -> jiff::SignedDuration {
        jiff::Timestamp::now().duration_since(self.entry_time.into())
    }
}
