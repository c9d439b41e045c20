//! External service clients.

pub mod api;
pub mod mock;
pub mod provider;

pub use api::{ApiClient, ApiClientError};
pub use mock::MockGateway;
pub use provider::SilvergateClient;
