//! Retry utilities: backoff builders for outbound calls.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::ApiClientConfig;

/// Backoff for the ingest to API hand-off.
///
/// `retry_attempts` counts the first call, so the builder allows one fewer
/// retry.
pub fn api_client_backoff(config: &ApiClientConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.retry_base_delay_ms))
        .with_max_delay(Duration::from_millis(config.retry_max_delay_ms))
        .with_max_times(config.retry_attempts.saturating_sub(1))
        .with_jitter()
}

/// Backoff for infrastructure connections at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
