//! Event log interface.

use async_trait::async_trait;

use crate::domain::{Event, EventKind, EventPage, EventQuery, NewEvent};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to begin transaction: {0}")]
    BeginFailed(#[source] sqlx::Error),

    #[error("Failed to commit transaction: {0}")]
    CommitFailed(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The `(entity_id, provider_event_id)` pair is already in the log.
    #[error("Event already stored")]
    EventAlreadyStored,

    /// Primary or unique key collision on an aggregate table.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Undecodable cursor")]
    BadCursor,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A stored value outside its closed vocabulary.
    #[error("Corrupt value in column {column}: '{value}'")]
    Corrupt { column: &'static str, value: String },

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure injected or raised by an in-memory backend.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Append-only event log for one entity kind.
///
/// Implementations:
/// - `PgEventSink`: PostgreSQL tables `order_events` / `dispute_events`
/// - `MockStorage`: in-memory, shared with the mock repositories
#[async_trait]
pub trait EventSink<K: EventKind>: Send + Sync {
    /// Append an event outside any aggregate transaction.
    ///
    /// Fails with [`StorageError::EventAlreadyStored`] when the
    /// `(entity_id, provider_event_id)` pair already exists.
    async fn create(&self, event: NewEvent<K>) -> Result<Event<K>>;

    /// Keyset-paginated read ordered by `(created_at, event_id)`.
    async fn query(&self, query: &EventQuery<K>) -> Result<EventPage<K>>;
}
