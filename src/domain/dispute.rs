//! Dispute aggregate, evidence and chargeback notifications.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventKind};
use crate::interfaces::{GatewayError, StorageError};

pub type Result<T> = std::result::Result<T, DisputeError>;

/// Namespace for dispute ids derived from order ids.
const DISPUTE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_4a2e_93d7_5b80_a4e2_1f0c_8d3b_7e59);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Submitted,
    Won,
    Lost,
    Closed,
    Canceled,
}

string_enum!(DisputeStatus, "dispute status", {
    Open => "open",
    UnderReview => "under_review",
    Submitted => "submitted",
    Won => "won",
    Lost => "lost",
    Closed => "closed",
    Canceled => "canceled",
});

impl DisputeStatus {
    /// Evidence may only change while the provider is still collecting it.
    pub fn is_editable(&self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::UnderReview)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargebackStatus {
    Opened,
    Updated,
    Closed,
}

string_enum!(ChargebackStatus, "chargeback status", {
    Opened => "opened",
    Updated => "updated",
    Closed => "closed",
});

/// Outcome carried in `meta.resolution` of a `closed` chargeback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Won,
    Lost,
}

string_enum!(Resolution, "resolution", {
    Won => "won",
    Lost => "lost",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeEventKind {
    WebhookOpened,
    WebhookUpdated,
    ProviderDecision,
    EvidenceAdded,
    EvidenceSubmitted,
}

string_enum!(DisputeEventKind, "dispute event kind", {
    WebhookOpened => "webhook_opened",
    WebhookUpdated => "webhook_updated",
    ProviderDecision => "provider_decision",
    EvidenceAdded => "evidence_added",
    EvidenceSubmitted => "evidence_submitted",
});

impl DisputeEventKind {
    pub fn for_chargeback(status: ChargebackStatus) -> Self {
        match status {
            ChargebackStatus::Opened => DisputeEventKind::WebhookOpened,
            ChargebackStatus::Updated => DisputeEventKind::WebhookUpdated,
            ChargebackStatus::Closed => DisputeEventKind::ProviderDecision,
        }
    }
}

impl EventKind for DisputeEventKind {
    fn as_str(&self) -> &'static str {
        DisputeEventKind::as_str(self)
    }
}

pub type DisputeEvent = Event<DisputeEventKind>;

/// Chargeback notification from the payment provider.
///
/// `status` is kept as received so that vocabulary the service does not know
/// reaches the domain instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargebackWebhook {
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

impl ChargebackWebhook {
    pub fn validate(&self) -> Result<()> {
        if self.provider_event_id.trim().is_empty() {
            return Err(DisputeError::BadRequest("provider_event_id is required".into()));
        }
        if self.order_id.trim().is_empty() {
            return Err(DisputeError::BadRequest("order_id is required".into()));
        }
        if self.status.trim().is_empty() {
            return Err(DisputeError::BadRequest("status is required".into()));
        }
        Ok(())
    }

    pub fn chargeback_status(&self) -> Result<ChargebackStatus> {
        self.status
            .parse()
            .map_err(|_| DisputeError::UnknownStatus(self.status.clone()))
    }

    /// `None` when the provider sent no decisive outcome. In lenient mode an
    /// unrecognised value is treated the same way.
    pub fn resolution(&self, lenient: bool) -> Result<Option<Resolution>> {
        let raw = self
            .meta
            .get("resolution")
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if raw.is_empty() {
            return Ok(None);
        }
        match raw.parse::<Resolution>() {
            Ok(resolution) => Ok(Some(resolution)),
            Err(_) if lenient => Ok(None),
            Err(_) => Err(DisputeError::UnknownResolution(raw)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: Uuid,
    pub order_id: String,
    pub submitting_id: Option<String>,
    pub status: DisputeStatus,
    pub reason: String,
    pub amount: f64,
    pub currency: String,
    pub opened_at: DateTime<Utc>,
    pub evidence_due_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// A fresh dispute in `open`, as described by an `opened` chargeback.
    /// Identity of the dispute for `order_id`. Stable across deliveries, so
    /// concurrent copies of one chargeback collide on the event-log key.
    pub fn id_for_order(order_id: &str) -> Uuid {
        Uuid::new_v5(&DISPUTE_ID_NAMESPACE, order_id.as_bytes())
    }

    pub fn open(id: Uuid, webhook: &ChargebackWebhook) -> Self {
        Self {
            id,
            order_id: webhook.order_id.clone(),
            submitting_id: None,
            status: DisputeStatus::Open,
            reason: webhook.reason.clone(),
            amount: webhook.amount,
            currency: webhook.currency.clone(),
            opened_at: webhook.occurred_at,
            evidence_due_at: webhook.evidence_due_at,
            submitted_at: None,
            closed_at: None,
        }
    }

    /// Folds a chargeback into an existing dispute.
    ///
    /// `status` is `None` for vocabulary accepted in lenient mode, which only
    /// refreshes the evidence deadline like an `updated` notification.
    pub fn apply_chargeback(
        &mut self,
        webhook: &ChargebackWebhook,
        status: Option<ChargebackStatus>,
        lenient: bool,
    ) -> Result<()> {
        if let Some(due) = webhook.evidence_due_at {
            self.evidence_due_at = Some(due);
        }
        match status {
            Some(ChargebackStatus::Opened) => {
                self.status = DisputeStatus::Open;
            }
            Some(ChargebackStatus::Updated) | None => {}
            Some(ChargebackStatus::Closed) => {
                self.status = match webhook.resolution(lenient)? {
                    Some(Resolution::Won) => DisputeStatus::Won,
                    Some(Resolution::Lost) => DisputeStatus::Lost,
                    None => DisputeStatus::Closed,
                };
                self.closed_at = Some(webhook.occurred_at);
            }
        }
        Ok(())
    }

    pub fn ensure_editable(&self) -> Result<()> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(DisputeError::NotEditable {
                dispute_id: self.id,
                status: self.status,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub file_id: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceUpsert {
    #[serde(default)]
    pub fields: HashMap<String, String>,
    #[serde(default)]
    pub files: Vec<EvidenceFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub dispute_id: Uuid,
    pub fields: HashMap<String, String>,
    pub files: Vec<EvidenceFile>,
    pub updated_at: DateTime<Utc>,
}

impl Evidence {
    pub fn from_upsert(dispute_id: Uuid, upsert: EvidenceUpsert, at: DateTime<Utc>) -> Self {
        Self {
            dispute_id,
            fields: upsert.fields,
            files: upsert.files,
            updated_at: at,
        }
    }

    pub fn empty(dispute_id: Uuid, at: DateTime<Utc>) -> Self {
        Self::from_upsert(dispute_id, EvidenceUpsert::default(), at)
    }

    pub fn file_ids(&self) -> Vec<String> {
        self.files.iter().map(|f| f.file_id.clone()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DisputeError {
    #[error("dispute not found: {0}")]
    NotFound(String),

    #[error("dispute already exists for order {0}")]
    AlreadyExists(String),

    #[error("dispute {dispute_id} is not editable in status {status}")]
    NotEditable {
        dispute_id: Uuid,
        status: DisputeStatus,
    },

    #[error("unknown chargeback status: '{0}'")]
    UnknownStatus(String),

    #[error("unknown chargeback resolution: '{0}'")]
    UnknownResolution(String),

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

impl From<StorageError> for DisputeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EventAlreadyStored => DisputeError::EventAlreadyStored,
            StorageError::BadCursor => DisputeError::BadCursor,
            StorageError::InvalidQuery(msg) => DisputeError::InvalidQuery(msg),
            other => DisputeError::Storage(other),
        }
    }
}

impl DisputeError {
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            DisputeError::EventAlreadyStored | DisputeError::AlreadyExists(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        match self {
            DisputeError::Storage(_) => true,
            DisputeError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}
