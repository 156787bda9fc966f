//! Constants used throughout the crate.

/// Database-related constants.
pub mod database {
    /// Default offset pagination limit.
    pub const DEFAULT_PAGE_SIZE: i64 = 50;

    /// Maximum offset pagination limit.
    pub const MAX_PAGE_SIZE: i64 = 1000;

    /// Rows written per statement by bulk inserts.
    ///
    /// Keeps `createMany` below the 65535 bind parameter limit of the
    /// PostgreSQL wire protocol for the widest table.
    pub const INSERT_CHUNK_SIZE: usize = 1000;
}

/// Invitation constants.
pub mod invite {
    /// Number of days an invitation remains valid by default.
    pub const DEFAULT_EXPIRY_DAYS: i64 = 7;
}

/// Task progress constants.
pub mod task_progress {
    /// Status of work that started and has not finished.
    pub const STATUS_IN_PROGRESS: &str = "in_progress";

    /// Status of finished work.
    pub const STATUS_COMPLETED: &str = "completed";
}

/// Session constants.
pub mod session {
    /// Default lifetime of a session in hours.
    pub const DEFAULT_TTL_HOURS: i64 = 24;
}

/// Transaction defaults.
pub mod transaction {
    use std::time::Duration;

    /// Default time allowed to acquire a connection for a transaction.
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

    /// Default time allowed for a whole transaction.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}
