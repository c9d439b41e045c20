//! In-memory storage for testing and broker-less local runs.
//!
//! A transaction takes the store lock, works on a copy of the state and
//! swaps it back in on commit. Rolled-back or dropped transactions leave the
//! store untouched, matching the PostgreSQL behaviour the services rely on.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SubsecRound;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::domain::{
    Dispute, DisputeEvent, DisputeEventKind, Event, EventKind, EventPage, EventQuery, Evidence,
    NewEvent, Order, OrderEvent, OrderEventKind, OrdersQuery, SortDirection, SortField, SortOrder,
};
use crate::interfaces::{DisputeRepo, EventSink, OrderRepo, Transaction, TxDisputeRepo, TxOrderRepo};
use crate::storage::cursor::{paginate, Cursor};
use crate::storage::{Result, StorageError};


#[derive(Debug, Clone, Default)]
struct State {
    orders: HashMap<String, Order>,
    order_events: Vec<OrderEvent>,
    disputes: HashMap<Uuid, Dispute>,
    evidence: HashMap<Uuid, Evidence>,
    dispute_events: Vec<DisputeEvent>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_begin: RwLock<bool>,
    fail_on_commit: RwLock<bool>,
    fail_on_append: RwLock<bool>,
}

impl Faults {
    async fn check_append(&self) -> Result<()> {
        if *self.fail_on_append.read().await {
            return Err(StorageError::Unavailable("event append disabled".into()));
        }
        Ok(())
    }
}

/// Shared in-memory store implementing every repository and event sink.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_begin(&self, fail: bool) {
        *self.faults.fail_on_begin.write().await = fail;
    }

    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.faults.fail_on_commit.write().await = fail;
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.faults.fail_on_append.write().await = fail;
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.values().cloned().collect()
    }

    pub async fn order_events(&self) -> Vec<OrderEvent> {
        self.state.lock().await.order_events.clone()
    }

    pub async fn disputes(&self) -> Vec<Dispute> {
        self.state.lock().await.disputes.values().cloned().collect()
    }

    pub async fn dispute_events(&self) -> Vec<DisputeEvent> {
        self.state.lock().await.dispute_events.clone()
    }

    async fn begin_tx(&self) -> Result<MockTx> {
        if *self.faults.fail_on_begin.read().await {
            return Err(StorageError::BeginFailed(sqlx::Error::PoolTimedOut));
        }
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(MockTx {
            guard,
            work,
            faults: Arc::clone(&self.faults),
        })
    }
}

fn append<K: EventKind>(log: &mut Vec<Event<K>>, event: NewEvent<K>) -> Result<Event<K>> {
    if !event.provider_event_id.is_empty()
        && log.iter().any(|e| {
            e.entity_id == event.entity_id && e.provider_event_id == event.provider_event_id
        })
    {
        return Err(StorageError::EventAlreadyStored);
    }
    let stored = Event {
        event_id: Uuid::new_v4(),
        entity_id: event.entity_id,
        kind: event.kind,
        provider_event_id: event.provider_event_id,
        data: event.data,
        created_at: event.created_at.trunc_subsecs(6),
    };
    log.push(stored.clone());
    Ok(stored)
}

fn select<K: EventKind>(log: &[Event<K>], query: &EventQuery<K>) -> Result<EventPage<K>> {
    let cursor = query.cursor.as_deref().map(Cursor::decode).transpose()?;
    let mut rows: Vec<Event<K>> = log
        .iter()
        .filter(|e| query.entity_ids.is_empty() || query.entity_ids.contains(&e.entity_id))
        .filter(|e| query.kinds.is_empty() || query.kinds.contains(&e.kind))
        .filter(|e| query.time_from.map_or(true, |from| e.created_at >= from))
        .filter(|e| query.time_to.map_or(true, |to| e.created_at < to))
        .filter(|e| {
            cursor.map_or(true, |c| {
                let key = (e.created_at, e.event_id);
                match query.direction {
                    SortDirection::Asc => key > c.key(),
                    SortDirection::Desc => key < c.key(),
                }
            })
        })
        .cloned()
        .collect();

    rows.sort_by_key(|e| (e.created_at, e.event_id));
    if query.direction == SortDirection::Desc {
        rows.reverse();
    }
    rows.truncate(query.limit as usize + 1);
    Ok(paginate(rows, query.limit))
}

fn compare_orders(a: &Order, b: &Order, query: &OrdersQuery) -> Ordering {
    let ordering = match query.sort_by {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
    .then_with(|| a.order_id.cmp(&b.order_id));
    match query.sort_order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

#[async_trait]
impl OrderRepo for MockStorage {
    async fn begin(&self) -> Result<Box<dyn TxOrderRepo>> {
        Ok(Box::new(self.begin_tx().await?))
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(order_id).cloned())
    }

    async fn list(&self, query: &OrdersQuery) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| compare_orders(a, b, query));
        Ok(orders
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }
}

#[async_trait]
impl DisputeRepo for MockStorage {
    async fn begin(&self) -> Result<Box<dyn TxDisputeRepo>> {
        Ok(Box::new(self.begin_tx().await?))
    }

    async fn get(&self, dispute_id: Uuid) -> Result<Option<Dispute>> {
        Ok(self.state.lock().await.disputes.get(&dispute_id).cloned())
    }

    async fn get_by_order(&self, order_id: &str) -> Result<Option<Dispute>> {
        let state = self.state.lock().await;
        Ok(state
            .disputes
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Dispute>> {
        let mut disputes = self.disputes().await;
        disputes.sort_by(|a, b| (b.opened_at, b.id).cmp(&(a.opened_at, a.id)));
        Ok(disputes)
    }

    async fn get_evidence(&self, dispute_id: Uuid) -> Result<Option<Evidence>> {
        Ok(self.state.lock().await.evidence.get(&dispute_id).cloned())
    }
}

#[async_trait]
impl EventSink<OrderEventKind> for MockStorage {
    async fn create(&self, event: NewEvent<OrderEventKind>) -> Result<OrderEvent> {
        self.faults.check_append().await?;
        append(&mut self.state.lock().await.order_events, event)
    }

    async fn query(
        &self,
        query: &EventQuery<OrderEventKind>,
    ) -> Result<EventPage<OrderEventKind>> {
        select(&self.state.lock().await.order_events, query)
    }
}

#[async_trait]
impl EventSink<DisputeEventKind> for MockStorage {
    async fn create(&self, event: NewEvent<DisputeEventKind>) -> Result<DisputeEvent> {
        self.faults.check_append().await?;
        append(&mut self.state.lock().await.dispute_events, event)
    }

    async fn query(
        &self,
        query: &EventQuery<DisputeEventKind>,
    ) -> Result<EventPage<DisputeEventKind>> {
        select(&self.state.lock().await.dispute_events, query)
    }
}

/// Transaction over a private copy of the store.
pub struct MockTx {
    guard: OwnedMutexGuard<State>,
    work: State,
    faults: Arc<Faults>,
}

#[async_trait]
impl Transaction for MockTx {
    async fn commit(self: Box<Self>) -> Result<()> {
        if *self.faults.fail_on_commit.read().await {
            return Err(StorageError::CommitFailed(sqlx::Error::WorkerCrashed));
        }
        let MockTx { mut guard, work, .. } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TxOrderRepo for MockTx {
    async fn create(&mut self, order: &Order) -> Result<()> {
        if self.work.orders.contains_key(&order.order_id) {
            return Err(StorageError::Conflict(format!("order {}", order.order_id)));
        }
        self.work
            .orders
            .insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get_for_update(&mut self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.work.orders.get(order_id).cloned())
    }

    async fn update(&mut self, order: &Order) -> Result<()> {
        if let Some(existing) = self.work.orders.get_mut(&order.order_id) {
            existing.status = order.status;
            existing.on_hold = order.on_hold;
            existing.hold_reason = order.hold_reason;
            existing.updated_at = order.updated_at;
        }
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent<OrderEventKind>) -> Result<OrderEvent> {
        self.faults.check_append().await?;
        append(&mut self.work.order_events, event)
    }
}

#[async_trait]
impl TxDisputeRepo for MockTx {
    async fn create(&mut self, dispute: &Dispute) -> Result<()> {
        let taken = self
            .work
            .disputes
            .values()
            .any(|d| d.id == dispute.id || d.order_id == dispute.order_id);
        if taken {
            return Err(StorageError::Conflict(format!(
                "dispute for order {}",
                dispute.order_id
            )));
        }
        self.work.disputes.insert(dispute.id, dispute.clone());
        Ok(())
    }

    async fn get_for_update(&mut self, dispute_id: Uuid) -> Result<Option<Dispute>> {
        Ok(self.work.disputes.get(&dispute_id).cloned())
    }

    async fn get_by_order_for_update(&mut self, order_id: &str) -> Result<Option<Dispute>> {
        Ok(self
            .work
            .disputes
            .values()
            .find(|d| d.order_id == order_id)
            .cloned())
    }

    async fn update(&mut self, dispute: &Dispute) -> Result<()> {
        if let Some(existing) = self.work.disputes.get_mut(&dispute.id) {
            *existing = dispute.clone();
        }
        Ok(())
    }

    async fn get_evidence(&mut self, dispute_id: Uuid) -> Result<Option<Evidence>> {
        Ok(self.work.evidence.get(&dispute_id).cloned())
    }

    async fn upsert_evidence(&mut self, evidence: &Evidence) -> Result<()> {
        self.work
            .evidence
            .insert(evidence.dispute_id, evidence.clone());
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent<DisputeEventKind>) -> Result<DisputeEvent> {
        self.faults.check_append().await?;
        append(&mut self.work.dispute_events, event)
    }
}
