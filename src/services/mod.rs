//! Domain services.
//!
//! Each service co-commits aggregate changes with their event records through
//! the repository transaction boundary.

pub mod dispute;
pub mod order;

pub use dispute::DisputeService;
pub use order::OrderService;
