//! PostgreSQL implementations of storage interfaces.

mod dispute_repo;
mod event_sink;
mod order_repo;

pub use dispute_repo::{PgDisputeRepo, PgTxDisputeRepo};
pub use event_sink::{DisputeEvents, EventStream, OrderEvents, PgEventSink};
pub use order_repo::{PgOrderRepo, PgTxOrderRepo};

/// Order event log on PostgreSQL.
pub type PgOrderEventSink = PgEventSink<OrderEvents>;

/// Dispute event log on PostgreSQL.
pub type PgDisputeEventSink = PgEventSink<DisputeEvents>;
