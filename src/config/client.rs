//! Outbound HTTP client configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Payment provider (Silvergate) endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub submit_representment_path: String,
    pub capture_path: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            submit_representment_path: "/api/v1/dispute/representment".to_string(),
            capture_path: "/api/v1/capture".to_string(),
            timeout_secs: 20,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Ingest to API hand-off.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Total attempts for transient failures, the first call included.
    pub retry_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10,
            retry_attempts: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

impl ApiClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
