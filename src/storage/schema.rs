//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! Tables are created by the migrations under `migrations/postgres`.

use sea_query::Iden;

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "order_id"]
    OrderId,
    #[iden = "user_id"]
    UserId,
    #[iden = "status"]
    Status,
    #[iden = "on_hold"]
    OnHold,
    #[iden = "hold_reason"]
    HoldReason,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Disputes table schema.
#[derive(Iden)]
pub enum Disputes {
    Table,
    Id,
    OrderId,
    SubmittingId,
    Status,
    Reason,
    Amount,
    Currency,
    OpenedAt,
    EvidenceDueAt,
    SubmittedAt,
    ClosedAt,
}

/// Evidence table schema, one row per dispute.
#[derive(Iden)]
pub enum Evidence {
    Table,
    DisputeId,
    Fields,
    Files,
    UpdatedAt,
}

/// Columns shared by `order_events` and `dispute_events`.
///
/// The entity column (`order_id` / `dispute_id`) and the table name are
/// supplied per stream by [`EventStream`](super::postgres::EventStream).
#[derive(Iden)]
pub enum EventLog {
    #[iden = "id"]
    Id,
    #[iden = "kind"]
    Kind,
    #[iden = "provider_event_id"]
    ProviderEventId,
    #[iden = "data"]
    Data,
    #[iden = "created_at"]
    CreatedAt,
}
