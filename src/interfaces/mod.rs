//! Abstract interfaces for chargeflow components.
//!
//! These traits define the contracts for:
//! - Event logs (append + keyset query)
//! - Aggregate repositories and their transactional views
//! - The payment provider gateway
//! - Wall-clock time

pub mod clock;
pub mod dispute_repo;
pub mod event_sink;
pub mod gateway;
pub mod order_repo;
pub mod transaction;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dispute_repo::{DisputeRepo, TxDisputeRepo};
pub use event_sink::{EventSink, StorageError};
pub use gateway::{
    CapturePaymentRequest, CaptureResult, CaptureStatus, GatewayError, ProviderGateway,
    RepresentmentRequest, RepresentmentResult,
};
pub use order_repo::{OrderRepo, TxOrderRepo};
pub use transaction::{run_in_transaction, Transaction};
