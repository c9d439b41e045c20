//! Transaction boundary shared by the aggregate repositories.

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::warn;

use super::event_sink::{Result, StorageError};

/// A unit of work that either commits or rolls back as a whole.
///
/// Dropping an uncommitted transaction rolls it back.
#[async_trait]
pub trait Transaction: Send {
    /// Fails with [`StorageError::CommitFailed`].
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Runs `f` against an open transaction, committing on success and rolling
/// back on any error.
///
/// When rollback itself fails after `f` errored, the error from `f` is
/// returned and the rollback failure is only logged.
pub async fn run_in_transaction<Tx, T, E, F>(mut tx: Box<Tx>, f: F) -> std::result::Result<T, E>
where
    Tx: Transaction + ?Sized,
    E: From<StorageError> + std::fmt::Display,
    F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, std::result::Result<T, E>>,
{
    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %err, rollback_error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
