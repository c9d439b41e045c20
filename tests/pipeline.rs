//! End-to-end webhook scenarios.
//!
//! Drives the HTTP routers over in-memory storage. The async scenarios run
//! the ingest router, a channel bus and a consumer runner in one process.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use chargeflow::bus::middleware::compose;
use chargeflow::bus::{ChannelBus, Envelope, MessageSource, RetryConfig, Runner, Worker};
use chargeflow::clients::MockGateway;
use chargeflow::context::{Context, CORRELATION_HEADER};
use chargeflow::dlq::{ChannelDeadLetterPublisher, DeadLetterPublisher};
use chargeflow::domain::{DisputeEventKind, DisputeStatus, OrderStatus};
use chargeflow::handlers::OrderConsumer;
use chargeflow::http::{api_router, ingest_router, ApiServices, HealthState};
use chargeflow::interfaces::FixedClock;
use chargeflow::services::{DisputeService, OrderService};
use chargeflow::storage::MockStorage;
use chargeflow::webhook::{AsyncProcessor, SyncProcessor};

const ORDERS: &str = "/webhooks/payments/orders";
const CHARGEBACKS: &str = "/webhooks/payments/chargebacks";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap()
}

struct Harness {
    storage: MockStorage,
    clock: FixedClock,
    orders: Arc<OrderService>,
    disputes: Arc<DisputeService>,
}

impl Harness {
    fn new() -> Self {
        let storage = MockStorage::new();
        let clock = FixedClock::new(t0());
        let gateway = Arc::new(MockGateway::new());
        let orders = Arc::new(OrderService::new(
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            gateway.clone(),
            Arc::new(clock.clone()),
        ));
        let disputes = Arc::new(DisputeService::new(
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            gateway,
            Arc::new(clock.clone()),
        ));
        Self {
            storage,
            clock,
            orders,
            disputes,
        }
    }

    fn services(&self) -> ApiServices {
        ApiServices {
            orders: self.orders.clone(),
            disputes: self.disputes.clone(),
        }
    }

    /// API router in sync mode.
    fn sync_api(&self) -> Router {
        let processor = Arc::new(SyncProcessor::new(self.orders.clone(), self.disputes.clone()));
        api_router(
            Context::background(),
            self.services(),
            Some(processor),
            HealthState::default(),
        )
    }

    fn tick(&self) {
        self.clock.advance(chrono::Duration::seconds(1));
    }
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    call(router, req).await
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    call(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn order_webhook(event_id: &str, order_id: &str, status: &str) -> Value {
    json!({
        "provider_event_id": event_id,
        "order_id": order_id,
        "user_id": "u1",
        "status": status,
        "amount": "100.50",
        "currency": "USD",
    })
}

fn chargeback(event_id: &str, status: &str, occurred_at: DateTime<Utc>) -> Value {
    json!({
        "provider_event_id": event_id,
        "order_id": "o1",
        "user_id": "u1",
        "status": status,
        "reason": "product_not_received",
        "amount": 100.5,
        "currency": "USD",
        "occurred_at": occurred_at,
    })
}

// ============================================================================
// Sync mode
// ============================================================================

#[tokio::test]
async fn s1_create_then_update() {
    let h = Harness::new();
    let api = h.sync_api();

    let (status, _) = post(&api, ORDERS, order_webhook("e1", "o1", "created")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    h.tick();
    let (status, _) = post(
        &api,
        ORDERS,
        json!({"provider_event_id": "e2", "order_id": "o1", "status": "updated"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, order) = get(&api, "/orders/o1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "updated");

    let (status, page) = get(&api, "/orders/events?order_ids=o1&sort_asc=true").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["provider_event_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["e1", "e2"]);
}

#[tokio::test]
async fn s2_duplicate_webhook_is_benign() {
    let h = Harness::new();
    let api = h.sync_api();

    let (first, _) = post(&api, ORDERS, order_webhook("e1", "o1", "created")).await;
    let (second, body) = post(&api, ORDERS, order_webhook("e1", "o1", "created")).await;

    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
    let events = h.storage.order_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].provider_event_id, "e1");
}

#[tokio::test]
async fn s3_forbidden_transition() {
    let h = Harness::new();
    let api = h.sync_api();

    post(&api, ORDERS, order_webhook("e1", "o1", "created")).await;
    let (status, _) = post(&api, ORDERS, order_webhook("e2", "o1", "failed")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = post(&api, ORDERS, order_webhook("e3", "o1", "success")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, order) = get(&api, "/orders/o1").await;
    assert_eq!(order["status"], "failed");
    assert_eq!(h.storage.order_events().await.len(), 2);
}

#[tokio::test]
async fn s4_chargeback_opens_and_closes_won() {
    let h = Harness::new();
    let api = h.sync_api();
    let t1 = t0() + chrono::Duration::days(3);

    let (status, _) = post(&api, CHARGEBACKS, chargeback("cb1", "opened", t0())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let disputes = h.storage.disputes().await;
    assert_eq!(disputes.len(), 1);
    assert_eq!(disputes[0].status, DisputeStatus::Open);

    let mut closed = chargeback("cb2", "closed", t1);
    closed["meta"] = json!({"resolution": "won"});
    let (status, _) = post(&api, CHARGEBACKS, closed).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let dispute = &h.storage.disputes().await[0];
    assert_eq!(dispute.status, DisputeStatus::Won);
    assert_eq!(dispute.closed_at, Some(t1));
    let kinds: Vec<_> = h.storage.dispute_events().await.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![DisputeEventKind::WebhookOpened, DisputeEventKind::ProviderDecision]
    );
}

#[tokio::test]
async fn s5_evidence_gating() {
    let h = Harness::new();
    let api = h.sync_api();
    post(&api, CHARGEBACKS, chargeback("cb1", "opened", t0())).await;
    let id = h.storage.disputes().await[0].id;

    let (status, _) = post(
        &api,
        &format!("/disputes/{id}/evidence"),
        json!({"fields": {"tracking": "1Z999"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.storage.disputes().await[0].status,
        DisputeStatus::UnderReview
    );

    let (status, dispute) = post(&api, &format!("/disputes/{id}/submit"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dispute["status"], "submitted");
    assert!(dispute["submitted_at"].is_string());
    assert!(h
        .storage
        .dispute_events()
        .await
        .iter()
        .any(|e| e.kind == DisputeEventKind::EvidenceSubmitted));

    let mut closed = chargeback("cb2", "closed", t0() + chrono::Duration::days(5));
    closed["meta"] = json!({"resolution": "won"});
    post(&api, CHARGEBACKS, closed).await;

    let (status, body) = post(
        &api,
        &format!("/disputes/{id}/evidence"),
        json!({"fields": {"late": "yes"}}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("won"));
}

// ============================================================================
// Async mode
// ============================================================================

#[tokio::test]
async fn s6_async_mode_partition_key() {
    let orders_bus = Arc::new(ChannelBus::new("webhooks.orders"));
    let disputes_bus = Arc::new(ChannelBus::new("webhooks.disputes"));
    let ingest = ingest_router(
        Context::background(),
        Arc::new(AsyncProcessor::new(orders_bus.clone(), disputes_bus.clone())),
        HealthState::default(),
    );

    let (status, body) = post(
        &ingest,
        ORDERS,
        json!({"provider_event_id": "e1", "order_id": "oX", "user_id": "u1", "status": "created"}),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    let published = orders_bus.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, "u1");
    assert!(disputes_bus.published().await.is_empty());
}

#[tokio::test]
async fn test_async_pipeline_applies_and_dead_letters() {
    let h = Harness::new();
    let bus = Arc::new(ChannelBus::new("webhooks.orders"));
    let ingest = ingest_router(
        Context::background(),
        Arc::new(AsyncProcessor::new(bus.clone(), Arc::new(ChannelBus::new("webhooks.disputes")))),
        HealthState::default(),
    );
    let (dlq, mut dead_letters) = ChannelDeadLetterPublisher::new();
    let runner = Runner::new(
        vec![Worker::new(bus.clone() as Arc<dyn MessageSource>)],
        compose(
            OrderConsumer::new(h.orders.clone()),
            RetryConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            Arc::new(dlq) as Arc<dyn DeadLetterPublisher>,
            "webhooks.orders",
            "orders-processor",
        ),
    );
    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let running = tokio::spawn(async move { runner.start(&ctx).await });

    let req = Request::post(ORDERS)
        .header(header::CONTENT_TYPE, "application/json")
        .header(CORRELATION_HEADER, "corr-pipe")
        .body(Body::from(order_webhook("e1", "o1", "created").to_string()))
        .unwrap();
    assert_eq!(call(&ingest, req).await.0, StatusCode::ACCEPTED);
    // Accepted by ingest, rejected by the domain: an update for an unknown order.
    let (status, _) = post(&ingest, ORDERS, order_webhook("e2", "o-missing", "updated")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    // Redelivery of e1 is acknowledged without a second event.
    post(&ingest, ORDERS, order_webhook("e1", "o1", "created")).await;

    let dead = tokio::time::timeout(Duration::from_secs(5), dead_letters.recv())
        .await
        .expect("dead letter expected")
        .expect("channel open");
    let payload = Envelope::decode(&dead.value).unwrap().payload;
    assert_eq!(payload["order_id"], "o-missing");

    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.committed_offsets().await.len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all three messages should be committed");

    token.cancel();
    running.await.unwrap().unwrap();

    assert_eq!(bus.committed_offsets().await, vec![0, 1, 2]);
    let orders = h.storage.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Created);
    assert_eq!(h.storage.order_events().await.len(), 1);

    let api = api_router(Context::background(), h.services(), None, HealthState::default());
    let (status, order) = get(&api, "/orders/o1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["user_id"], "u1");
}
