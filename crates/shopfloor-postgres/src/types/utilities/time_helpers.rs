//! Timestamp accessors shared by the models.

use jiff::{SignedDuration, Timestamp};

/// Window in which a row counts as recently created.
pub const RECENTLY_CREATED: SignedDuration = SignedDuration::from_hours(24);

/// Window in which a row counts as recently updated.
pub const RECENTLY_UPDATED: SignedDuration = SignedDuration::from_hours(1);

/// Returns whether `timestamp` lies no further than `window` in the past.
pub fn is_within(timestamp: Timestamp, window: SignedDuration) -> bool {
    Timestamp::now().duration_since(timestamp) <= window
}

/// Models with a `created_at` column.
pub trait HasCreatedAt {
    /// Returns the creation timestamp.
    fn created_at(&self) -> Timestamp;

    /// Returns whether the row was created in the last day.
    fn is_recently_created(&self) -> bool {
        is_within(self.created_at(), RECENTLY_CREATED)
    }

    /// Returns the age of the row.
    fn creation_age(&self) -> SignedDuration {
        Timestamp::now().duration_since(self.created_at())
    }
}

/// Models with an `updated_at` column.
pub trait HasUpdatedAt {
    /// Returns the last update timestamp.
    fn updated_at(&self) -> Timestamp;

    /// Returns whether the row changed in the last hour.
    fn is_recently_updated(&self) -> bool {
        is_within(self.updated_at(), RECENTLY_UPDATED)
    }
}

/// Models with an `expires_at` column.
pub trait HasExpiresAt {
    /// Returns the expiration timestamp.
    fn expires_at(&self) -> Timestamp;

    /// Returns whether the row has expired.
    fn is_expired(&self) -> bool {
        Timestamp::now() > self.expires_at()
    }

    /// Returns the time left before expiry, or `None` once expired.
    fn time_until_expiry(&self) -> Option<SignedDuration> {
        let remaining = self.expires_at().duration_since(Timestamp::now());
        remaining.is_positive().then_some(remaining)
    }

    /// Returns whether the row expires within `threshold`.
    fn is_expiring_soon(&self, threshold: SignedDuration) -> bool {
        self.time_until_expiry()
            .is_some_and(|remaining| remaining <= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Expiring(Timestamp);

    impl HasExpiresAt for Expiring {
        fn expires_at(&self) -> Timestamp {
            self.0
        }
    }

    #[test]
    fn expiry_tracks_the_clock() {
        let past = Expiring(Timestamp::now() - SignedDuration::from_mins(5));
        assert!(past.is_expired());
        assert!(past.time_until_expiry().is_none());

        let soon = Expiring(Timestamp::now() + SignedDuration::from_mins(5));
        assert!(!soon.is_expired());
        assert!(soon.is_expiring_soon(SignedDuration::from_hours(1)));
        assert!(!soon.is_expiring_soon(SignedDuration::from_mins(1)));
    }

    #[test]
    fn within_window() {
        let now = Timestamp::now();
        assert!(is_within(now, RECENTLY_UPDATED));
        assert!(!is_within(now - SignedDuration::from_hours(2), RECENTLY_UPDATED));
    }
}
