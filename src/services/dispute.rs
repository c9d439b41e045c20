//! Dispute lifecycle: chargeback intake, evidence and representment.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::dispute::Result;
use crate::domain::{
    ChargebackStatus, ChargebackWebhook, Dispute, DisputeError, DisputeEventKind, DisputeStatus,
    EventPage, EventQuery, Evidence, EvidenceUpsert, NewEvent,
};
use crate::interfaces::{
    Clock, DisputeRepo, EventSink, ProviderGateway, RepresentmentRequest, StorageError,
};

pub struct DisputeService {
    disputes: Arc<dyn DisputeRepo>,
    events: Arc<dyn EventSink<DisputeEventKind>>,
    gateway: Arc<dyn ProviderGateway>,
    clock: Arc<dyn Clock>,
    accept_unknown_vocabulary: bool,
}

impl DisputeService {
    pub fn new(
        disputes: Arc<dyn DisputeRepo>,
        events: Arc<dyn EventSink<DisputeEventKind>>,
        gateway: Arc<dyn ProviderGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            disputes,
            events,
            gateway,
            clock,
            accept_unknown_vocabulary: false,
        }
    }

    /// Record chargebacks with unrecognised status or resolution instead of
    /// rejecting them.
    pub fn with_unknown_vocabulary(mut self, accept: bool) -> Self {
        self.accept_unknown_vocabulary = accept;
        self
    }

    #[tracing::instrument(
        name = "dispute.process_chargeback",
        skip_all,
        fields(order_id = %webhook.order_id, provider_event_id = %webhook.provider_event_id, status = %webhook.status)
    )]
    pub async fn process_chargeback(&self, webhook: &ChargebackWebhook) -> Result<Dispute> {
        webhook.validate()?;
        let lenient = self.accept_unknown_vocabulary;
        let status = match webhook.chargeback_status() {
            Ok(status) => Some(status),
            Err(err) if lenient => {
                warn!(error = %err, "Recording chargeback with unknown status");
                None
            }
            Err(err) => return Err(err),
        };
        let kind = status
            .map(DisputeEventKind::for_chargeback)
            .unwrap_or(DisputeEventKind::WebhookUpdated);
        let now = self.clock.now();
        let data = serde_json::to_value(webhook)?;
        let webhook = webhook.clone();

        let dispute = self
            .disputes
            .in_transaction(move |tx| {
                Box::pin(async move {
                    let existing = tx.get_by_order_for_update(&webhook.order_id).await?;
                    if existing.is_none() && status != Some(ChargebackStatus::Opened) {
                        return Err(DisputeError::NotFound(format!(
                            "no dispute for order {}",
                            webhook.order_id
                        )));
                    }
                    let dispute_id = existing
                        .as_ref()
                        .map_or_else(|| Dispute::id_for_order(&webhook.order_id), |d| d.id);

                    tx.append_event(NewEvent::external(
                        dispute_id.to_string(),
                        kind,
                        &webhook.provider_event_id,
                        data,
                        now,
                    ))
                    .await?;

                    match existing {
                        Some(mut dispute) => {
                            dispute.apply_chargeback(&webhook, status, lenient)?;
                            tx.update(&dispute).await?;
                            Ok(dispute)
                        }
                        None => {
                            let dispute = Dispute::open(dispute_id, &webhook);
                            tx.create(&dispute).await.map_err(|e| match e {
                                StorageError::Conflict(_) => {
                                    DisputeError::AlreadyExists(dispute.order_id.clone())
                                }
                                other => other.into(),
                            })?;
                            Ok(dispute)
                        }
                    }
                })
            })
            .await?;

        info!(dispute_id = %dispute.id, dispute_status = %dispute.status, "Chargeback applied");
        Ok(dispute)
    }

    /// Replace the dispute's evidence. The first upsert moves an `open`
    /// dispute to `under_review`.
    #[tracing::instrument(name = "dispute.upsert_evidence", skip(self, upsert))]
    pub async fn upsert_evidence(&self, dispute_id: Uuid, upsert: EvidenceUpsert) -> Result<Evidence> {
        let now = self.clock.now();

        self.disputes
            .in_transaction(move |tx| {
                Box::pin(async move {
                    let mut dispute = tx
                        .get_for_update(dispute_id)
                        .await?
                        .ok_or_else(|| DisputeError::NotFound(dispute_id.to_string()))?;
                    dispute.ensure_editable()?;

                    let evidence = Evidence::from_upsert(dispute_id, upsert, now);
                    tx.upsert_evidence(&evidence).await?;

                    if dispute.status == DisputeStatus::Open {
                        dispute.status = DisputeStatus::UnderReview;
                        tx.update(&dispute).await?;
                    }

                    tx.append_event(NewEvent::internal(
                        dispute_id.to_string(),
                        DisputeEventKind::EvidenceAdded,
                        json!({
                            "fields": evidence.fields.len(),
                            "files": evidence.file_ids(),
                        }),
                        now,
                    ))
                    .await?;
                    Ok(evidence)
                })
            })
            .await
    }

    /// Send the current evidence to the provider and mark the dispute
    /// `submitted`.
    #[tracing::instrument(name = "dispute.submit", skip(self))]
    pub async fn submit(&self, dispute_id: Uuid) -> Result<Dispute> {
        let dispute = self.get_dispute(dispute_id).await?;
        dispute.ensure_editable()?;
        let evidence = self
            .disputes
            .get_evidence(dispute_id)
            .await?
            .unwrap_or_else(|| Evidence::empty(dispute_id, self.clock.now()));
        let file_ids = evidence.file_ids();

        let result = self
            .gateway
            .submit_representment(RepresentmentRequest {
                order_id: dispute.order_id.clone(),
                evidence,
            })
            .await?;
        let now = self.clock.now();
        let submission_id = result.submission_id;

        let dispute = self
            .disputes
            .in_transaction(move |tx| {
                Box::pin(async move {
                    let mut dispute = tx
                        .get_for_update(dispute_id)
                        .await?
                        .ok_or_else(|| DisputeError::NotFound(dispute_id.to_string()))?;
                    dispute.ensure_editable()?;
                    dispute.submitting_id = Some(submission_id.clone());
                    dispute.submitted_at = Some(now);
                    dispute.status = DisputeStatus::Submitted;
                    tx.update(&dispute).await?;

                    tx.append_event(NewEvent::internal(
                        dispute_id.to_string(),
                        DisputeEventKind::EvidenceSubmitted,
                        json!({ "submission_id": submission_id, "files": file_ids }),
                        now,
                    ))
                    .await?;
                    Ok(dispute)
                })
            })
            .await?;

        info!(submitting_id = ?dispute.submitting_id, "Representment submitted");
        Ok(dispute)
    }

    pub async fn get_dispute(&self, dispute_id: Uuid) -> Result<Dispute> {
        self.disputes
            .get(dispute_id)
            .await?
            .ok_or_else(|| DisputeError::NotFound(dispute_id.to_string()))
    }

    /// All disputes, most recently opened first.
    pub async fn get_disputes(&self) -> Result<Vec<Dispute>> {
        Ok(self.disputes.list().await?)
    }

    pub async fn get_evidence(&self, dispute_id: Uuid) -> Result<Evidence> {
        self.get_dispute(dispute_id).await?;
        self.disputes
            .get_evidence(dispute_id)
            .await?
            .ok_or_else(|| DisputeError::NotFound(format!("evidence for dispute {dispute_id}")))
    }

    pub async fn get_events(
        &self,
        query: &EventQuery<DisputeEventKind>,
    ) -> Result<EventPage<DisputeEventKind>> {
        Ok(self.events.query(query).await?)
    }
}
