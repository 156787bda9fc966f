//! User model for PostgreSQL database operations.

use diesel::prelude::*;
use jiff_diesel::Timestamp;

use super::{generate_id, impl_changeset};
use crate::schema::users;
use crate::types::{HasCreatedAt, HasUpdatedAt};

/// Account that can belong to several organizations.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    /// Unique user identifier.
    pub id: String,
    /// Login email, unique across users.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Password hash, absent for credential-only accounts.
    pub password: Option<String>,
    /// Whether the email address was confirmed.
    pub is_verified: bool,
    /// Whether the account may sign in.
    pub is_active: bool,
    /// Timestamp when the user was created.
    pub created_at: Timestamp,
    /// Timestamp when the user was last updated.
    pub updated_at: Timestamp,
}

/// Data for creating a new user.
#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUser {
    /// Id, generated by the database when absent.
    pub id: Option<String>,
    /// Email.
    pub email: String,
    /// Name.
    pub name: String,
    /// Password hash.
    pub password: Option<String>,
    /// Verified flag.
    pub is_verified: Option<bool>,
    /// Active flag.
    pub is_active: Option<bool>,
}

/// Data for updating a user.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateUser {
    /// Email.
    pub email: Option<String>,
    /// Name.
    pub name: Option<String>,
    /// Password hash.
    pub password: Option<Option<String>>,
    /// Verified flag.
    pub is_verified: Option<bool>,
    /// Active flag.
    pub is_active: Option<bool>,
}

impl_changeset!(UpdateUser {
    email,
    name,
    password,
    is_verified,
    is_active,
});

impl NewUser {
    /// Creates a user with a generated id.
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(generate_id()),
            email: email.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the password hash.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl User {
    /// Returns whether the user can sign in with a password.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Returns whether the user may use the application.
    pub fn can_sign_in(&self) -> bool {
        self.is_active && self.is_verified
    }

    /// Returns the domain part of the email address.
    pub fn email_domain(&self) -> Option<&str> {
        self.email.rsplit_once('@').map(|(_, domain)| domain)
    }
}

impl HasCreatedAt for User {
    fn created_at(&self) -> jiff::Timestamp {
        self.created_at.into()
    }
}

impl HasUpdatedAt for User {
    fn updated_at(&self) -> jiff::Timestamp {
        self.updated_at.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Changeset;

    #[test]
    fn new_user_carries_an_id() {
        let user = NewUser::new("ana@example.com", "Ana").with_password("hash");
        assert!(user.id.is_some());
        assert_eq!(user.password.as_deref(), Some("hash"));
        assert!(user.is_active.is_none());
    }

    #[test]
    fn empty_changeset() {
        assert!(UpdateUser::default().is_empty());

        let changes = UpdateUser {
            password: Some(None),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
