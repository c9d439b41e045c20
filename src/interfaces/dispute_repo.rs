//! Dispute aggregate and evidence repository.

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use super::event_sink::Result;
use super::transaction::{run_in_transaction, Transaction};
use crate::domain::{Dispute, DisputeError, DisputeEvent, DisputeEventKind, Evidence, NewEvent};

#[async_trait]
pub trait DisputeRepo: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn TxDisputeRepo>>;

    async fn get(&self, dispute_id: Uuid) -> Result<Option<Dispute>>;

    async fn get_by_order(&self, order_id: &str) -> Result<Option<Dispute>>;

    /// All disputes, most recently opened first.
    async fn list(&self) -> Result<Vec<Dispute>>;

    async fn get_evidence(&self, dispute_id: Uuid) -> Result<Option<Evidence>>;
}

#[async_trait]
pub trait TxDisputeRepo: Transaction {
    /// Fails with `StorageError::Conflict` when the order already has a dispute.
    async fn create(&mut self, dispute: &Dispute) -> Result<()>;

    async fn get_for_update(&mut self, dispute_id: Uuid) -> Result<Option<Dispute>>;

    async fn get_by_order_for_update(&mut self, order_id: &str) -> Result<Option<Dispute>>;

    async fn update(&mut self, dispute: &Dispute) -> Result<()>;

    async fn get_evidence(&mut self, dispute_id: Uuid) -> Result<Option<Evidence>>;

    /// Replaces fields, files and `updated_at` of the dispute's evidence.
    async fn upsert_evidence(&mut self, evidence: &Evidence) -> Result<()>;

    async fn append_event(&mut self, event: NewEvent<DisputeEventKind>) -> Result<DisputeEvent>;
}

impl dyn DisputeRepo {
    pub async fn in_transaction<T, F>(&self, f: F) -> std::result::Result<T, DisputeError>
    where
        F: for<'t> FnOnce(
            &'t mut (dyn TxDisputeRepo + 'static),
        ) -> BoxFuture<'t, std::result::Result<T, DisputeError>>,
    {
        let tx = self.begin().await?;
        run_in_transaction(tx, f).await
    }
}
