//! Storage configuration types.

use std::time::Duration;

use serde::Deserialize;

/// PostgreSQL pool configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URI.
    pub url: String,
    /// Upper bound on pooled connections.
    pub pool_max: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/chargeflow".to_string(),
            pool_max: 10,
            acquire_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}
