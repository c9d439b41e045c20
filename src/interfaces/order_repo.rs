//! Order aggregate repository.

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::event_sink::Result;
use super::transaction::{run_in_transaction, Transaction};
use crate::domain::{NewEvent, Order, OrderError, OrderEvent, OrderEventKind, OrdersQuery};

/// Pool-level order reads plus the entry point into a transaction.
#[async_trait]
pub trait OrderRepo: Send + Sync {
    /// Opens a transactional view. Fails with `StorageError::BeginFailed`.
    async fn begin(&self) -> Result<Box<dyn TxOrderRepo>>;

    async fn get(&self, order_id: &str) -> Result<Option<Order>>;

    async fn list(&self, query: &OrdersQuery) -> Result<Vec<Order>>;
}

/// Order writes scoped to one open transaction, together with the order
/// event log on the same connection.
#[async_trait]
pub trait TxOrderRepo: Transaction {
    /// Fails with `StorageError::Conflict` when the order id is taken.
    async fn create(&mut self, order: &Order) -> Result<()>;

    /// Loads the order and locks its row until the transaction ends.
    async fn get_for_update(&mut self, order_id: &str) -> Result<Option<Order>>;

    /// Persists `status`, `on_hold`, `hold_reason` and `updated_at`.
    async fn update(&mut self, order: &Order) -> Result<()>;

    /// Fails with `StorageError::EventAlreadyStored` on a duplicate
    /// `(order_id, provider_event_id)`.
    async fn append_event(&mut self, event: NewEvent<OrderEventKind>) -> Result<OrderEvent>;
}

impl dyn OrderRepo {
    /// Begins a transaction, hands its view to `f`, then commits or rolls back.
    pub async fn in_transaction<T, F>(&self, f: F) -> std::result::Result<T, OrderError>
    where
        F: for<'t> FnOnce(
            &'t mut (dyn TxOrderRepo + 'static),
        ) -> BoxFuture<'t, std::result::Result<T, OrderError>>,
    {
        let tx = self.begin().await?;
        run_in_transaction(tx, f).await
    }
}
