//! Reports produced by the migration functions.

use std::time::Duration;

use serde::Serialize;

/// Applied versus embedded migrations.
///
/// Versions are diesel migration versions (`20250110000001`), sorted
/// ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Embedded migrations recorded in `__diesel_schema_migrations`.
    pub applied_versions: Vec<String>,
    /// Embedded migrations not yet applied.
    pub pending_versions: Vec<String>,
    /// Versions recorded in the database that this build does not embed.
    ///
    /// Non-empty when the database was migrated by a newer build.
    pub unknown_versions: Vec<String>,
}

impl MigrationStatus {
    /// Classifies `recorded` versions against the `embedded` ones.
    pub fn compare(embedded: &[String], recorded: &[String]) -> Self {
        let mut status = Self::default();

        for version in embedded {
            if recorded.contains(version) {
                status.applied_versions.push(version.clone());
            } else {
                status.pending_versions.push(version.clone());
            }
        }
        status.unknown_versions = recorded
            .iter()
            .filter(|version| !embedded.contains(version))
            .cloned()
            .collect();

        status.applied_versions.sort();
        status.pending_versions.sort();
        status.unknown_versions.sort();
        status
    }

    /// Newest applied version.
    pub fn last_applied_version(&self) -> Option<&str> {
        self.applied_versions.last().map(String::as_str)
    }

    /// Oldest pending version, the next one to run.
    pub fn next_pending_version(&self) -> Option<&str> {
        self.pending_versions.first().map(String::as_str)
    }

    /// Number of embedded migrations.
    #[inline]
    pub fn total_migrations(&self) -> usize {
        self.applied_versions.len() + self.pending_versions.len()
    }

    /// Share of embedded migrations applied, from 0.0 to 1.0.
    pub fn progress_ratio(&self) -> f64 {
        match self.total_migrations() {
            0 => 1.0,
            total => self.applied_versions.len() as f64 / total as f64,
        }
    }

    /// Whether every embedded migration is applied.
    #[inline]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_versions.is_empty()
    }

    /// Whether the database and this build agree exactly.
    #[inline]
    pub fn is_in_sync(&self) -> bool {
        self.is_up_to_date() && self.unknown_versions.is_empty()
    }
}

/// Outcome of [`run_pending_migrations`](super::run_pending_migrations).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    /// Wall time of the run, hooks included.
    pub duration: Duration,
    /// Versions applied by this run, in order.
    pub processed_versions: Vec<String>,
}

impl MigrationResult {
    /// Creates a result.
    pub fn new(duration: Duration, processed_versions: Vec<String>) -> Self {
        Self {
            duration,
            processed_versions,
        }
    }

    /// Whether nothing needed applying.
    pub fn is_no_op(&self) -> bool {
        self.processed_versions.is_empty()
    }

    /// Newest version applied by this run.
    pub fn last_processed_version(&self) -> Option<&str> {
        self.processed_versions.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn compare_splits_applied_pending_and_unknown() {
        let embedded = versions(&["00000000000000", "20250110000001", "20250110000002"]);
        let recorded = versions(&["20250110000001", "00000000000000", "20990101000000"]);
        let status = MigrationStatus::compare(&embedded, &recorded);

        assert_eq!(
            status.applied_versions,
            versions(&["00000000000000", "20250110000001"])
        );
        assert_eq!(status.next_pending_version(), Some("20250110000002"));
        assert_eq!(status.unknown_versions, versions(&["20990101000000"]));
        assert!(!status.is_up_to_date());
        assert!(!status.is_in_sync());
        assert_eq!(status.total_migrations(), 3);
    }

    #[test]
    fn fresh_database_is_all_pending() {
        let embedded = versions(&["1", "2"]);
        let status = MigrationStatus::compare(&embedded, &[]);
        assert_eq!(status.progress_ratio(), 0.0);
        assert_eq!(status.last_applied_version(), None);
    }

    #[test]
    fn empty_run_is_no_op() {
        let result = MigrationResult::new(Duration::from_millis(3), Vec::new());
        assert!(result.is_no_op());
        assert_eq!(result.last_processed_version(), None);
    }
}
