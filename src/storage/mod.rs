//! Storage implementations.
//!
//! [`Database`] owns the PostgreSQL pool and runs closures inside a
//! transaction. The `postgres` module builds the event sinks and aggregate
//! repositories on top of it; `mock` provides in-memory equivalents.

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
pub use crate::interfaces::event_sink::{Result, StorageError};

pub mod cursor;
pub mod mock;
pub mod postgres;
pub mod schema;

pub use cursor::Cursor;
pub use mock::MockStorage;
pub use postgres::{
    DisputeEvents, EventStream, OrderEvents, PgDisputeRepo, PgEventSink, PgOrderRepo,
};

/// Pooled PostgreSQL handle shared by every repository.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool sized by `config.pool_max`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        info!(pool_max = config.pool_max, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("migrations/postgres").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(StorageError::BeginFailed)
    }

    /// Run `f` on a transaction connection; commit on `Ok`, roll back on `Err`.
    pub async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StorageError> + std::fmt::Display,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, std::result::Result<T, E>>,
    {
        let mut tx = self.begin().await?;
        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(StorageError::CommitFailed)?;
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

    /// Like [`transaction`](Self::transaction) but always rolls back, leaving
    /// the database untouched. Tests use it to exercise writes in isolation.
    pub async fn sandbox_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<StorageError>,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, std::result::Result<T, E>>,
    {
        let mut tx = self.begin().await?;
        let result = f(&mut *tx).await;
        if let Err(rollback_err) = tx.rollback().await {
            warn!(rollback_error = %rollback_err, "Sandbox rollback failed");
        }
        result
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

/// `true` when `err` is a PostgreSQL unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
