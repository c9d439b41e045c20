//! PostgreSQL dispute and evidence repository.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order, PostgresQueryBuilder, Query, SelectStatement};
use sea_query_binder::SqlxBinder;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use super::event_sink::{insert_event, DisputeEvents};
use crate::domain::{Dispute, DisputeEvent, DisputeEventKind, Evidence, NewEvent};
use crate::interfaces::{DisputeRepo, Transaction, TxDisputeRepo};
use crate::storage::schema::{Disputes, Evidence as EvidenceTable};
use crate::storage::{is_unique_violation, Database, Result, StorageError};

pub struct PgDisputeRepo {
    db: Database,
}

impl PgDisputeRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn select_disputes() -> SelectStatement {
    Query::select()
        .columns([
            Disputes::Id,
            Disputes::OrderId,
            Disputes::SubmittingId,
            Disputes::Status,
            Disputes::Reason,
            Disputes::Amount,
            Disputes::Currency,
            Disputes::OpenedAt,
            Disputes::EvidenceDueAt,
            Disputes::SubmittedAt,
            Disputes::ClosedAt,
        ])
        .from(Disputes::Table)
        .to_owned()
}

fn select_evidence(dispute_id: Uuid) -> SelectStatement {
    Query::select()
        .columns([
            EvidenceTable::DisputeId,
            EvidenceTable::Fields,
            EvidenceTable::Files,
            EvidenceTable::UpdatedAt,
        ])
        .from(EvidenceTable::Table)
        .and_where(Expr::col(EvidenceTable::DisputeId).eq(dispute_id))
        .to_owned()
}

fn dispute_from_row(row: &PgRow) -> Result<Dispute> {
    let status: String = row.try_get("status")?;
    Ok(Dispute {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        submitting_id: row.try_get("submitting_id")?,
        status: status.parse().map_err(|_| StorageError::Corrupt {
            column: "status",
            value: status.clone(),
        })?,
        reason: row.try_get("reason")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        opened_at: row.try_get("opened_at")?,
        evidence_due_at: row.try_get("evidence_due_at")?,
        submitted_at: row.try_get("submitted_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

fn evidence_from_row(row: &PgRow) -> Result<Evidence> {
    let fields: serde_json::Value = row.try_get("fields")?;
    let files: serde_json::Value = row.try_get("files")?;
    Ok(Evidence {
        dispute_id: row.try_get("dispute_id")?,
        fields: serde_json::from_value(fields)?,
        files: serde_json::from_value(files)?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl DisputeRepo for PgDisputeRepo {
    async fn begin(&self) -> Result<Box<dyn TxDisputeRepo>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgTxDisputeRepo { tx }))
    }

    async fn get(&self, dispute_id: Uuid) -> Result<Option<Dispute>> {
        let (sql, values) = select_disputes()
            .and_where(Expr::col(Disputes::Id).eq(dispute_id))
            .build_sqlx(PostgresQueryBuilder);
        let row = sqlx::query_with(&sql, values)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn get_by_order(&self, order_id: &str) -> Result<Option<Dispute>> {
        let (sql, values) = select_disputes()
            .and_where(Expr::col(Disputes::OrderId).eq(order_id))
            .build_sqlx(PostgresQueryBuilder);
        let row = sqlx::query_with(&sql, values)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Dispute>> {
        let (sql, values) = select_disputes()
            .order_by(Disputes::OpenedAt, Order::Desc)
            .order_by(Disputes::Id, Order::Desc)
            .build_sqlx(PostgresQueryBuilder);
        let rows = sqlx::query_with(&sql, values)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(dispute_from_row).collect()
    }

    async fn get_evidence(&self, dispute_id: Uuid) -> Result<Option<Evidence>> {
        let (sql, values) = select_evidence(dispute_id).build_sqlx(PostgresQueryBuilder);
        let row = sqlx::query_with(&sql, values)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(evidence_from_row).transpose()
    }
}

pub struct PgTxDisputeRepo {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTxDisputeRepo {
    async fn fetch_locked(&mut self, select: &mut SelectStatement) -> Result<Option<Dispute>> {
        let (sql, values) = select.lock_exclusive().build_sqlx(PostgresQueryBuilder);
        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(dispute_from_row).transpose()
    }
}

#[async_trait]
impl Transaction for PgTxDisputeRepo {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(StorageError::CommitFailed)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl TxDisputeRepo for PgTxDisputeRepo {
    async fn create(&mut self, dispute: &Dispute) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(Disputes::Table)
            .columns([
                Disputes::Id,
                Disputes::OrderId,
                Disputes::SubmittingId,
                Disputes::Status,
                Disputes::Reason,
                Disputes::Amount,
                Disputes::Currency,
                Disputes::OpenedAt,
                Disputes::EvidenceDueAt,
                Disputes::SubmittedAt,
                Disputes::ClosedAt,
            ])
            .values_panic([
                dispute.id.into(),
                dispute.order_id.clone().into(),
                dispute.submitting_id.clone().into(),
                dispute.status.as_str().into(),
                dispute.reason.clone().into(),
                dispute.amount.into(),
                dispute.currency.clone().into(),
                dispute.opened_at.into(),
                dispute.evidence_due_at.into(),
                dispute.submitted_at.into(),
                dispute.closed_at.into(),
            ])
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::Conflict(format!("dispute for order {}", dispute.order_id))
                } else {
                    StorageError::Database(e)
                }
            })?;
        Ok(())
    }

    async fn get_for_update(&mut self, dispute_id: Uuid) -> Result<Option<Dispute>> {
        let mut select = select_disputes();
        select.and_where(Expr::col(Disputes::Id).eq(dispute_id));
        self.fetch_locked(&mut select).await
    }

    async fn get_by_order_for_update(&mut self, order_id: &str) -> Result<Option<Dispute>> {
        let mut select = select_disputes();
        select.and_where(Expr::col(Disputes::OrderId).eq(order_id));
        self.fetch_locked(&mut select).await
    }

    async fn update(&mut self, dispute: &Dispute) -> Result<()> {
        let (sql, values) = Query::update()
            .table(Disputes::Table)
            .values([
                (Disputes::SubmittingId, dispute.submitting_id.clone().into()),
                (Disputes::Status, dispute.status.as_str().into()),
                (Disputes::EvidenceDueAt, dispute.evidence_due_at.into()),
                (Disputes::SubmittedAt, dispute.submitted_at.into()),
                (Disputes::ClosedAt, dispute.closed_at.into()),
            ])
            .and_where(Expr::col(Disputes::Id).eq(dispute.id))
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn get_evidence(&mut self, dispute_id: Uuid) -> Result<Option<Evidence>> {
        let (sql, values) = select_evidence(dispute_id).build_sqlx(PostgresQueryBuilder);
        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(evidence_from_row).transpose()
    }

    async fn upsert_evidence(&mut self, evidence: &Evidence) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(EvidenceTable::Table)
            .columns([
                EvidenceTable::DisputeId,
                EvidenceTable::Fields,
                EvidenceTable::Files,
                EvidenceTable::UpdatedAt,
            ])
            .values_panic([
                evidence.dispute_id.into(),
                serde_json::to_value(&evidence.fields)?.into(),
                serde_json::to_value(&evidence.files)?.into(),
                evidence.updated_at.into(),
            ])
            .on_conflict(
                OnConflict::column(EvidenceTable::DisputeId)
                    .update_columns([
                        EvidenceTable::Fields,
                        EvidenceTable::Files,
                        EvidenceTable::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent<DisputeEventKind>) -> Result<DisputeEvent> {
        insert_event::<DisputeEvents>(&mut self.tx, event).await
    }
}
