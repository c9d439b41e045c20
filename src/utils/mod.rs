//! Process plumbing shared by the binaries and adapters.

pub mod bootstrap;
#[cfg(feature = "otel")]
pub mod metrics;
pub mod retry;
