//! Consumer-side OpenTelemetry instruments.
//!
//! Recorded by the bus middleware. Exporters are installed by the host
//! process; without one the global meter is a no-op.

use std::sync::LazyLock;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("chargeflow"));

// ============================================================================
// Consumers
// ============================================================================

/// Duration of one handled broker message, middleware included.
pub static MESSAGE_PROCESSING_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("message.processing.duration")
        .with_description("Broker message processing duration")
        .with_unit("s")
        .build()
});

/// Total broker messages handled, by outcome.
pub static MESSAGES_PROCESSED_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("messages.processed.total")
        .with_description("Total broker messages processed")
        .build()
});

// ============================================================================
// Dead Letter Queue
// ============================================================================

/// Total DLQ publish operations.
pub static DLQ_PUBLISH_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("dlq.publish.total")
        .with_description("Total DLQ publish operations")
        .build()
});

// ============================================================================
// Attributes
// ============================================================================

pub fn topic_attr(topic: &str) -> KeyValue {
    KeyValue::new("topic", topic.to_string())
}

pub fn consumer_group_attr(group: &str) -> KeyValue {
    KeyValue::new("consumer_group", group.to_string())
}

/// `success` or `error`.
pub fn status_attr(status: &str) -> KeyValue {
    KeyValue::new("status", status.to_string())
}
