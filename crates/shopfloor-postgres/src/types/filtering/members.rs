//! Filtering options for organization member queries.

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Filter options for organization members.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct MemberFilter {
    /// Filter by access role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_role: Option<String>,
    /// Filter by membership status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Filter by an enabled authentication method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
}

impl MemberFilter {
    /// Creates a new empty filter.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by access role.
    #[inline]
    pub fn with_access_role(mut self, access_role: impl Into<String>) -> Self {
        self.access_role = Some(access_role.into());
        self
    }

    /// Filters by status.
    #[inline]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Filters by authentication method.
    #[inline]
    pub fn with_auth_method(mut self, auth_method: impl Into<String>) -> Self {
        self.auth_method = Some(auth_method.into());
        self
    }

    /// Returns whether any filter is active.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.access_role.is_none() && self.status.is_none() && self.auth_method.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_fields() {
        assert!(MemberFilter::new().is_empty());

        let filter = MemberFilter::new().with_access_role("admin").with_auth_method("rfid");
        assert!(!filter.is_empty());
        assert_eq!(filter.access_role.as_deref(), Some("admin"));
        assert_eq!(filter.auth_method.as_deref(), Some("rfid"));
        assert!(filter.status.is_none());
    }
}
