//! Shared storage integration tests.
//!
//! Contract tests for the event sinks and aggregate repositories. Each
//! backend's test binary runs them against its own implementation.

pub mod event_sink_tests;
pub mod repository_tests;
