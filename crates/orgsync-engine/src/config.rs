//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for any single directory or secret-store call
    /// (default: 30 seconds).
    pub external_call_timeout_secs: u64,
    /// Maximum concurrent directory calls issued by one operation
    /// (default: 8).
    pub max_directory_concurrency: usize,
    /// Interval of the state-sync validation schedule
    /// (default: 600 = 10 minutes).
    pub sync_validation_interval_secs: u64,
    /// Interval of the orphan detection schedule
    /// (default: 1800 = 30 minutes).
    pub orphan_detection_interval_secs: u64,
    /// How long a cached result stays readable (default: 3600 = 1 hour).
    pub result_ttl_secs: u64,
    /// Maximum number of organizations kept in each result cache
    /// (default: 1024).
    pub result_cache_capacity: usize,
    /// Apply low-risk repairs after each orphan detection tick.
    pub auto_cleanup: bool,
    /// Name fragments identifying database-credential secrets. Super
    /// administrators may only touch secrets matching one of these.
    pub credential_secret_markers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            external_call_timeout_secs: 30,
            max_directory_concurrency: 8,
            sync_validation_interval_secs: 600,
            orphan_detection_interval_secs: 1800,
            result_ttl_secs: 3600,
            result_cache_capacity: 1024,
            auto_cleanup: false,
            credential_secret_markers: vec![
                "dbcred".into(),
                "database".into(),
                "db-".into(),
                "sql".into(),
                "connection".into(),
            ],
        }
    }
}

impl EngineConfig {
    pub fn external_call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }

    pub fn sync_validation_interval(&self) -> Duration {
        Duration::from_secs(self.sync_validation_interval_secs)
    }

    pub fn orphan_detection_interval(&self) -> Duration {
        Duration::from_secs(self.orphan_detection_interval_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Fan-out limit, never below one.
    pub fn fan_out(&self) -> usize {
        self.max_directory_concurrency.max(1)
    }
}
