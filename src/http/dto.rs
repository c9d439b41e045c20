//! Request and response bodies that are not domain types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChargebackWebhook, EventKind, EventQuery, OrderError, OrdersQuery, PaymentWebhook,
};

// ============================================================================
// Internal updates (ingest -> API)
// ============================================================================

/// A payment webhook as forwarded by the ingest service.
///
/// `status` stays a string so the API, not the transport, decides whether
/// it is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdateRequest {
    pub provider_event_id: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl From<&PaymentWebhook> for OrderUpdateRequest {
    fn from(webhook: &PaymentWebhook) -> Self {
        Self {
            provider_event_id: webhook.provider_event_id.clone(),
            order_id: webhook.order_id.clone(),
            user_id: webhook.user_id.clone(),
            status: webhook.status.to_string(),
            created_at: webhook.created_at,
            updated_at: webhook.updated_at,
            meta: webhook.meta.clone(),
        }
    }
}

impl TryFrom<OrderUpdateRequest> for PaymentWebhook {
    type Error = OrderError;

    fn try_from(req: OrderUpdateRequest) -> Result<Self, Self::Error> {
        let status = req
            .status
            .parse()
            .map_err(|e: crate::domain::UnknownVariant| OrderError::BadRequest(e.to_string()))?;
        Ok(Self {
            provider_event_id: req.provider_event_id,
            order_id: req.order_id,
            user_id: req.user_id,
            status,
            created_at: req.created_at,
            updated_at: req.updated_at,
            meta: req.meta,
        })
    }
}

/// A chargeback webhook as forwarded by the ingest service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisputeUpdateRequest {
    pub provider_event_id: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_due_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl From<&ChargebackWebhook> for DisputeUpdateRequest {
    fn from(webhook: &ChargebackWebhook) -> Self {
        Self {
            provider_event_id: webhook.provider_event_id.clone(),
            order_id: webhook.order_id.clone(),
            user_id: webhook.user_id.clone(),
            status: webhook.status.clone(),
            reason: webhook.reason.clone(),
            amount: webhook.amount,
            currency: webhook.currency.clone(),
            occurred_at: webhook.occurred_at,
            evidence_due_at: webhook.evidence_due_at,
            meta: webhook.meta.clone(),
        }
    }
}

impl From<DisputeUpdateRequest> for ChargebackWebhook {
    fn from(req: DisputeUpdateRequest) -> Self {
        Self {
            provider_event_id: req.provider_event_id,
            order_id: req.order_id,
            user_id: req.user_id,
            status: req.status,
            reason: req.reason,
            amount: req.amount,
            currency: req.currency,
            occurred_at: req.occurred_at,
            evidence_due_at: req.evidence_due_at,
            meta: req.meta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UpdateResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            success: true,
            message: Some("event already processed".to_string()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Webhook acknowledgements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn accepted() -> Self {
        Self {
            status: "accepted".to_string(),
        }
    }

    pub fn duplicate() -> Self {
        Self {
            status: "duplicate".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ============================================================================
// Query parameters
// ============================================================================

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// `GET /orders` parameters. List filters are comma-separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersParams {
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl OrdersParams {
    pub fn to_query(&self) -> Result<OrdersQuery, OrderError> {
        let statuses = split_list(self.status.as_deref())
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<_>, crate::domain::UnknownVariant>>()
            .map_err(|e| OrderError::InvalidQuery(e.to_string()))?;

        let mut builder = OrdersQuery::builder()
            .ids(split_list(self.order_id.as_deref()))
            .user_ids(split_list(self.user_id.as_deref()))
            .statuses(statuses);
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        if let Some(sort_by) = &self.sort_by {
            builder = builder.sort_by(sort_by.as_str());
        }
        if let Some(sort_order) = &self.sort_order {
            builder = builder.sort_order(sort_order.as_str());
        }
        builder.build()
    }
}

/// Event-log parameters shared by `/orders/events` and `/disputes/events`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsParams {
    pub order_ids: Option<String>,
    pub dispute_ids: Option<String>,
    pub kinds: Option<String>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub sort_asc: bool,
}

impl EventsParams {
    /// Builds the query over `entity_ids`. Unknown kinds are rejected with
    /// their error message.
    pub fn to_query<K: EventKind>(&self, entity_ids: Option<&str>) -> Result<EventQuery<K>, String> {
        let kinds = split_list(self.kinds.as_deref())
            .iter()
            .map(|k| k.parse::<K>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;

        let mut builder = EventQuery::builder()
            .entity_ids(split_list(entity_ids))
            .kinds(kinds)
            .ascending(self.sort_asc)
            .limit(self.limit.unwrap_or(0));
        if let Some(from) = self.time_from {
            builder = builder.time_from(from);
        }
        if let Some(to) = self.time_to {
            builder = builder.time_to(to);
        }
        if let Some(cursor) = &self.cursor {
            builder = builder.cursor(cursor.as_str());
        }
        Ok(builder.build())
    }
}
