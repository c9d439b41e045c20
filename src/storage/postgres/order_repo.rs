//! PostgreSQL order repository.

use async_trait::async_trait;
use sea_query::{Expr, Order as SqlOrder, PostgresQueryBuilder, Query, SelectStatement};
use sea_query_binder::SqlxBinder;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};

use super::event_sink::{insert_event, OrderEvents};
use crate::domain::{
    NewEvent, Order, OrderEvent, OrderEventKind, OrdersQuery, SortField, SortOrder,
};
use crate::interfaces::{OrderRepo, Transaction, TxOrderRepo};
use crate::storage::schema::Orders;
use crate::storage::{is_unique_violation, Database, Result, StorageError};

pub struct PgOrderRepo {
    db: Database,
}

impl PgOrderRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn select_orders() -> SelectStatement {
    Query::select()
        .columns([
            Orders::OrderId,
            Orders::UserId,
            Orders::Status,
            Orders::OnHold,
            Orders::HoldReason,
            Orders::CreatedAt,
            Orders::UpdatedAt,
        ])
        .from(Orders::Table)
        .to_owned()
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let hold_reason: Option<String> = row.try_get("hold_reason")?;

    Ok(Order {
        order_id: row.try_get("order_id")?,
        user_id: row.try_get("user_id")?,
        status: status.parse().map_err(|_| StorageError::Corrupt {
            column: "status",
            value: status.clone(),
        })?,
        on_hold: row.try_get("on_hold")?,
        hold_reason: hold_reason
            .map(|raw| {
                raw.parse().map_err(|_| StorageError::Corrupt {
                    column: "hold_reason",
                    value: raw.clone(),
                })
            })
            .transpose()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl OrderRepo for PgOrderRepo {
    async fn begin(&self) -> Result<Box<dyn TxOrderRepo>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgTxOrderRepo { tx }))
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        let (sql, values) = select_orders()
            .and_where(Expr::col(Orders::OrderId).eq(order_id))
            .build_sqlx(PostgresQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list(&self, query: &OrdersQuery) -> Result<Vec<Order>> {
        let mut select = select_orders();
        if !query.ids.is_empty() {
            select.and_where(Expr::col(Orders::OrderId).is_in(query.ids.clone()));
        }
        if !query.user_ids.is_empty() {
            select.and_where(Expr::col(Orders::UserId).is_in(query.user_ids.clone()));
        }
        if !query.statuses.is_empty() {
            select.and_where(
                Expr::col(Orders::Status).is_in(query.statuses.iter().map(|s| s.as_str())),
            );
        }

        let sort_column = match query.sort_by {
            SortField::CreatedAt => Orders::CreatedAt,
            SortField::UpdatedAt => Orders::UpdatedAt,
        };
        let order = match query.sort_order {
            SortOrder::Asc => SqlOrder::Asc,
            SortOrder::Desc => SqlOrder::Desc,
        };

        let (sql, values) = select
            .order_by(sort_column, order.clone())
            .order_by(Orders::OrderId, order)
            .limit(u64::from(query.limit))
            .offset(query.offset)
            .build_sqlx(PostgresQueryBuilder);

        let rows = sqlx::query_with(&sql, values)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(order_from_row).collect()
    }
}

/// Order writes bound to one open transaction.
pub struct PgTxOrderRepo {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTxOrderRepo {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(StorageError::CommitFailed)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl TxOrderRepo for PgTxOrderRepo {
    async fn create(&mut self, order: &Order) -> Result<()> {
        let (sql, values) = Query::insert()
            .into_table(Orders::Table)
            .columns([
                Orders::OrderId,
                Orders::UserId,
                Orders::Status,
                Orders::OnHold,
                Orders::HoldReason,
                Orders::CreatedAt,
                Orders::UpdatedAt,
            ])
            .values_panic([
                order.order_id.clone().into(),
                order.user_id.clone().into(),
                order.status.as_str().into(),
                order.on_hold.into(),
                order.hold_reason.map(|r| r.to_string()).into(),
                order.created_at.into(),
                order.updated_at.into(),
            ])
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::Conflict(format!("order {}", order.order_id))
                } else {
                    StorageError::Database(e)
                }
            })?;
        Ok(())
    }

    async fn get_for_update(&mut self, order_id: &str) -> Result<Option<Order>> {
        let (sql, values) = select_orders()
            .and_where(Expr::col(Orders::OrderId).eq(order_id))
            .lock_exclusive()
            .build_sqlx(PostgresQueryBuilder);

        let row = sqlx::query_with(&sql, values)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update(&mut self, order: &Order) -> Result<()> {
        let (sql, values) = Query::update()
            .table(Orders::Table)
            .values([
                (Orders::Status, order.status.as_str().into()),
                (Orders::OnHold, order.on_hold.into()),
                (Orders::HoldReason, order.hold_reason.map(|r| r.to_string()).into()),
                (Orders::UpdatedAt, order.updated_at.into()),
            ])
            .and_where(Expr::col(Orders::OrderId).eq(order.order_id.as_str()))
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent<OrderEventKind>) -> Result<OrderEvent> {
        insert_event::<OrderEvents>(&mut self.tx, event).await
    }
}
