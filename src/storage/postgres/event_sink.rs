//! PostgreSQL event log.
//!
//! One generic implementation serves both `order_events` and
//! `dispute_events`; the stream marker type supplies the table, the entity
//! column and the kind vocabulary.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sea_query::{Alias, Expr, Order, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::domain::{
    DisputeEventKind, Event, EventKind, EventPage, EventQuery, NewEvent, OrderEventKind,
    SortDirection,
};
use crate::interfaces::EventSink;
use crate::storage::cursor::{paginate, Cursor};
use crate::storage::schema::EventLog;
use crate::storage::{is_unique_violation, Database, Result, StorageError};

/// Binds an event vocabulary to its table.
pub trait EventStream: Send + Sync + 'static {
    type Kind: EventKind;

    const TABLE: &'static str;
    const ENTITY_COLUMN: &'static str;
}

/// `order_events` keyed by `order_id`.
pub struct OrderEvents;

impl EventStream for OrderEvents {
    type Kind = OrderEventKind;

    const TABLE: &'static str = "order_events";
    const ENTITY_COLUMN: &'static str = "order_id";
}

/// `dispute_events` keyed by `dispute_id`.
pub struct DisputeEvents;

impl EventStream for DisputeEvents {
    type Kind = DisputeEventKind;

    const TABLE: &'static str = "dispute_events";
    const ENTITY_COLUMN: &'static str = "dispute_id";
}

/// PostgreSQL implementation of [`EventSink`].
pub struct PgEventSink<S> {
    db: Database,
    _stream: PhantomData<S>,
}

impl<S: EventStream> PgEventSink<S> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _stream: PhantomData,
        }
    }
}

#[async_trait]
impl<S: EventStream> EventSink<S::Kind> for PgEventSink<S> {
    async fn create(&self, event: NewEvent<S::Kind>) -> Result<Event<S::Kind>> {
        let mut conn = self.db.pool().acquire().await?;
        insert_event::<S>(&mut conn, event).await
    }

    async fn query(&self, query: &EventQuery<S::Kind>) -> Result<EventPage<S::Kind>> {
        let mut conn = self.db.pool().acquire().await?;
        query_events::<S>(&mut conn, query).await
    }
}

/// Append on an existing connection, which may be inside a transaction.
pub(crate) async fn insert_event<S: EventStream>(
    conn: &mut PgConnection,
    event: NewEvent<S::Kind>,
) -> Result<Event<S::Kind>> {
    let stored = Event {
        event_id: Uuid::new_v4(),
        entity_id: event.entity_id,
        kind: event.kind,
        provider_event_id: event.provider_event_id,
        data: event.data,
        created_at: event.created_at.trunc_subsecs(6),
    };

    let (sql, values) = Query::insert()
        .into_table(Alias::new(S::TABLE))
        .columns(
            [
                "id",
                S::ENTITY_COLUMN,
                "kind",
                "provider_event_id",
                "data",
                "created_at",
            ]
            .map(Alias::new),
        )
        .values_panic([
            stored.event_id.into(),
            stored.entity_id.clone().into(),
            stored.kind.as_str().into(),
            stored.provider_event_id.clone().into(),
            stored.data.clone().into(),
            stored.created_at.into(),
        ])
        .build_sqlx(PostgresQueryBuilder);

    sqlx::query_with(&sql, values)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::EventAlreadyStored
            } else {
                StorageError::Database(e)
            }
        })?;

    Ok(stored)
}

/// Keyset-paginated read on an existing connection.
pub(crate) async fn query_events<S: EventStream>(
    conn: &mut PgConnection,
    query: &EventQuery<S::Kind>,
) -> Result<EventPage<S::Kind>> {
    let cursor = query.cursor.as_deref().map(Cursor::decode).transpose()?;
    let order = match query.direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    };

    let mut select = Query::select();
    select
        .column(EventLog::Id)
        .expr_as(Expr::col(Alias::new(S::ENTITY_COLUMN)), Alias::new("entity_id"))
        .column(EventLog::Kind)
        .column(EventLog::ProviderEventId)
        .column(EventLog::Data)
        .column(EventLog::CreatedAt)
        .from(Alias::new(S::TABLE));

    if !query.entity_ids.is_empty() {
        select.and_where(Expr::col(Alias::new(S::ENTITY_COLUMN)).is_in(query.entity_ids.clone()));
    }
    if !query.kinds.is_empty() {
        select.and_where(Expr::col(EventLog::Kind).is_in(query.kinds.iter().map(|k| k.as_str())));
    }
    if let Some(from) = query.time_from {
        select.and_where(Expr::col(EventLog::CreatedAt).gte(from));
    }
    if let Some(to) = query.time_to {
        select.and_where(Expr::col(EventLog::CreatedAt).lt(to));
    }
    if let Some(cursor) = cursor {
        let row_key = Expr::tuple([
            Expr::col(EventLog::CreatedAt).into(),
            Expr::col(EventLog::Id).into(),
        ]);
        let cursor_key = Expr::tuple([
            Expr::val(cursor.created_at).into(),
            Expr::val(cursor.event_id).into(),
        ]);
        select.and_where(match query.direction {
            SortDirection::Asc => row_key.gt(cursor_key),
            SortDirection::Desc => row_key.lt(cursor_key),
        });
    }

    let (sql, values) = select
        .order_by(EventLog::CreatedAt, order.clone())
        .order_by(EventLog::Id, order)
        .limit(u64::from(query.limit) + 1)
        .build_sqlx(PostgresQueryBuilder);

    let rows = sqlx::query_with(&sql, values).fetch_all(&mut *conn).await?;
    let events = rows
        .iter()
        .map(event_from_row::<S::Kind>)
        .collect::<Result<Vec<_>>>()?;

    Ok(paginate(events, query.limit))
}

fn event_from_row<K: EventKind>(row: &PgRow) -> Result<Event<K>> {
    let kind: String = row.try_get("kind")?;
    let kind = kind.parse().map_err(|_| StorageError::Corrupt {
        column: "kind",
        value: kind.clone(),
    })?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Event {
        event_id: row.try_get("id")?,
        entity_id: row.try_get("entity_id")?,
        kind,
        provider_event_id: row.try_get("provider_event_id")?,
        data: row.try_get("data")?,
        created_at,
    })
}
