//! Order aggregate, its status machine and the operator request types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{Event, EventKind};
use crate::interfaces::{GatewayError, StorageError};

pub type Result<T> = std::result::Result<T, OrderError>;

/// Default and maximum page sizes for order listings.
pub const DEFAULT_ORDERS_LIMIT: u32 = 10;
pub const MAX_ORDERS_LIMIT: u32 = 1000;

// ============================================================================
// Vocabulary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Updated,
    Failed,
    Success,
}

string_enum!(OrderStatus, "order status", {
    Created => "created",
    Updated => "updated",
    Failed => "failed",
    Success => "success",
});

impl OrderStatus {
    /// Terminal statuses accept no further transitions and block capture.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Success)
    }

    /// `created` is only ever an initial status; every non-terminal status may
    /// move to `updated`, `failed` or `success`.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        !self.is_terminal() && to != OrderStatus::Created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    ManualReview,
    Risk,
}

string_enum!(HoldReason, "hold reason", {
    ManualReview => "manual_review",
    Risk => "risk",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldAction {
    Set,
    Clear,
}

string_enum!(HoldAction, "hold action", {
    Set => "set",
    Clear => "clear",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    WebhookReceived,
    HoldSet,
    HoldCleared,
    CaptureRequested,
    CaptureCompleted,
    CaptureFailed,
}

string_enum!(OrderEventKind, "order event kind", {
    WebhookReceived => "webhook_received",
    HoldSet => "hold_set",
    HoldCleared => "hold_cleared",
    CaptureRequested => "capture_requested",
    CaptureCompleted => "capture_completed",
    CaptureFailed => "capture_failed",
});

impl EventKind for OrderEventKind {
    fn as_str(&self) -> &'static str {
        OrderEventKind::as_str(self)
    }
}

pub type OrderEvent = Event<OrderEventKind>;

// ============================================================================
// Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub on_hold: bool,
    pub hold_reason: Option<HoldReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds the aggregate a `created` webhook describes.
    pub fn from_webhook(webhook: &PaymentWebhook, now: DateTime<Utc>) -> Self {
        let created_at = webhook.created_at.unwrap_or(now);
        Self {
            order_id: webhook.order_id.clone(),
            user_id: webhook.user_id.clone(),
            status: webhook.status,
            on_hold: false,
            hold_reason: None,
            created_at,
            updated_at: webhook.updated_at.unwrap_or(created_at),
        }
    }

    /// Validates and applies a webhook-driven status change.
    pub fn transition(&mut self, to: OrderStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidStatus {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    /// Capture preconditions: not held, not terminal.
    pub fn ensure_capturable(&self) -> Result<()> {
        if self.on_hold {
            return Err(OrderError::OnHold(self.order_id.clone()));
        }
        if self.status.is_terminal() {
            return Err(OrderError::InFinalStatus {
                order_id: self.order_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}

/// Order state notification from the payment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentWebhook {
    pub provider_event_id: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl PaymentWebhook {
    pub fn validate(&self) -> Result<()> {
        if self.provider_event_id.trim().is_empty() {
            return Err(OrderError::BadRequest("provider_event_id is required".into()));
        }
        if self.order_id.trim().is_empty() {
            return Err(OrderError::BadRequest("order_id is required".into()));
        }
        if self.status == OrderStatus::Created && self.user_id.trim().is_empty() {
            return Err(OrderError::BadRequest(
                "user_id is required for created orders".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Operator requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldRequest {
    pub action: HoldAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<HoldReason>,
}

impl HoldRequest {
    pub fn set(reason: HoldReason) -> Self {
        Self {
            action: HoldAction::Set,
            reason: Some(reason),
        }
    }

    pub fn clear() -> Self {
        Self {
            action: HoldAction::Clear,
            reason: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (self.action, self.reason) {
            (HoldAction::Set, None) => Err(OrderError::BadRequest(
                "reason is required when action is 'set'".into(),
            )),
            (HoldAction::Clear, Some(_)) => Err(OrderError::BadRequest(
                "reason must be omitted when action is 'clear'".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldResponse {
    pub order_id: String,
    pub on_hold: bool,
    pub reason: Option<HoldReason>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub amount: f64,
    pub currency: String,
    pub idempotency_key: String,
}

impl CaptureRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(OrderError::BadRequest("amount must be positive".into()));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(OrderError::BadRequest(
                "currency must be a three-letter code".into(),
            ));
        }
        let key_len = self.idempotency_key.len();
        if key_len == 0 || key_len > 255 {
            return Err(OrderError::BadRequest(
                "idempotency_key must be 1..=255 bytes".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: OrderStatus,
    pub provider_tx_id: String,
    pub captured_at: DateTime<Utc>,
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

string_enum!(SortField, "sort field", {
    CreatedAt => "created_at",
    UpdatedAt => "updated_at",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

string_enum!(SortOrder, "sort order", {
    Asc => "asc",
    Desc => "desc",
});

/// Offset-paginated order listing filter.
#[derive(Debug, Clone, PartialEq)]
pub struct OrdersQuery {
    pub ids: Vec<String>,
    pub user_ids: Vec<String>,
    pub statuses: Vec<OrderStatus>,
    pub limit: u32,
    pub offset: u64,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl OrdersQuery {
    pub fn builder() -> OrdersQueryBuilder {
        OrdersQueryBuilder::default()
    }

    /// `true` when `order` passes every set filter.
    pub fn matches(&self, order: &Order) -> bool {
        (self.ids.is_empty() || self.ids.contains(&order.order_id))
            && (self.user_ids.is_empty() || self.user_ids.contains(&order.user_id))
            && (self.statuses.is_empty() || self.statuses.contains(&order.status))
    }
}

impl Default for OrdersQuery {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            user_ids: Vec::new(),
            statuses: Vec::new(),
            limit: DEFAULT_ORDERS_LIMIT,
            offset: 0,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

/// Sort options are kept as raw text until `build` so that bad input from the
/// query string surfaces as a single `InvalidQuery`.
#[derive(Debug, Clone, Default)]
pub struct OrdersQueryBuilder {
    ids: Vec<String>,
    user_ids: Vec<String>,
    statuses: Vec<OrderStatus>,
    limit: Option<u32>,
    offset: u64,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

impl OrdersQueryBuilder {
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn user_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_by = Some(field.into());
        self
    }

    pub fn sort_order(mut self, order: impl Into<String>) -> Self {
        self.sort_order = Some(order.into());
        self
    }

    pub fn build(self) -> Result<OrdersQuery> {
        let limit = self.limit.unwrap_or(DEFAULT_ORDERS_LIMIT);
        if !(1..=MAX_ORDERS_LIMIT).contains(&limit) {
            return Err(OrderError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_ORDERS_LIMIT}"
            )));
        }
        let sort_by = match self.sort_by.as_deref() {
            None | Some("") => SortField::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e: super::UnknownVariant| OrderError::InvalidQuery(e.to_string()))?,
        };
        let sort_order = match self.sort_order.as_deref() {
            None | Some("") => SortOrder::default(),
            Some(raw) => raw
                .to_ascii_lowercase()
                .parse()
                .map_err(|e: super::UnknownVariant| OrderError::InvalidQuery(e.to_string()))?,
        };

        Ok(OrdersQuery {
            ids: self.ids,
            user_ids: self.user_ids,
            statuses: self.statuses,
            limit,
            offset: self.offset,
            sort_by,
            sort_order,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found: {0}")]
    NotFound(String),

    #[error("order already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatus { from: OrderStatus, to: OrderStatus },

    #[error("order {0} is on hold")]
    OnHold(String),

    #[error("order {order_id} is in final status {status}")]
    InFinalStatus {
        order_id: String,
        status: OrderStatus,
    },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("bad cursor")]
    BadCursor,

    #[error("event already stored")]
    EventAlreadyStored,

    #[error("provider error: {0}")]
    Provider(#[from] GatewayError),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for OrderError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EventAlreadyStored => OrderError::EventAlreadyStored,
            StorageError::BadCursor => OrderError::BadCursor,
            StorageError::InvalidQuery(msg) => OrderError::InvalidQuery(msg),
            other => OrderError::Storage(other),
        }
    }
}

impl OrderError {
    /// Duplicate deliveries that callers acknowledge as already handled.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, OrderError::EventAlreadyStored | OrderError::AlreadyExists(_))
    }

    /// Failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            OrderError::Storage(_) => true,
            OrderError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}
