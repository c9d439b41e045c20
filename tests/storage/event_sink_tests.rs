//! EventSink interface tests.
//!
//! Entity ids are random per test so suites can share one database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use chargeflow::domain::{EventQuery, NewEvent, OrderEventKind};
use chargeflow::interfaces::{EventSink, StorageError};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn entity() -> String {
    format!("ord-{}", Uuid::new_v4())
}

fn external(entity_id: &str, provider_event_id: &str, minutes: i64) -> NewEvent<OrderEventKind> {
    NewEvent::external(
        entity_id,
        OrderEventKind::WebhookReceived,
        provider_event_id,
        json!({ "provider_event_id": provider_event_id }),
        base() + Duration::minutes(minutes),
    )
}

// =============================================================================
// create
// =============================================================================

pub async fn test_create_assigns_id<S: EventSink<OrderEventKind>>(sink: &S) {
    let id = entity();

    let stored = sink
        .create(external(&id, "evt-1", 0))
        .await
        .expect("create should succeed");

    assert_eq!(stored.entity_id, id);
    assert_eq!(stored.provider_event_id, "evt-1");
    assert_eq!(stored.kind, OrderEventKind::WebhookReceived);
    assert_eq!(stored.created_at, base());
    assert!(!stored.event_id.is_nil());
}

pub async fn test_create_rejects_duplicate_provider_event<S: EventSink<OrderEventKind>>(sink: &S) {
    let id = entity();
    sink.create(external(&id, "evt-1", 0))
        .await
        .expect("first create should succeed");

    let err = sink
        .create(external(&id, "evt-1", 1))
        .await
        .expect_err("duplicate should be rejected");

    assert!(matches!(err, StorageError::EventAlreadyStored), "got {err:?}");
}

pub async fn test_same_provider_event_on_other_entity<S: EventSink<OrderEventKind>>(sink: &S) {
    sink.create(external(&entity(), "evt-shared", 0))
        .await
        .expect("create should succeed");
    sink.create(external(&entity(), "evt-shared", 0))
        .await
        .expect("same provider event on another entity should succeed");
}

pub async fn test_internal_events_never_collide<S: EventSink<OrderEventKind>>(sink: &S) {
    let id = entity();
    for _ in 0..2 {
        sink.create(NewEvent::internal(
            &id,
            OrderEventKind::CaptureRequested,
            json!({}),
            base(),
        ))
        .await
        .expect("internal events should not be deduplicated");
    }

    let page = sink
        .query(&EventQuery::builder().entity_ids([id.as_str()]).build())
        .await
        .expect("query should succeed");
    assert_eq!(page.items.len(), 2);
}

// =============================================================================
// query
// =============================================================================

pub async fn test_query_pages_descending<S: EventSink<OrderEventKind>>(sink: &S) {
    let id = entity();
    for i in 0..5 {
        sink.create(external(&id, &format!("evt-{i}"), i))
            .await
            .expect("create should succeed");
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut builder = EventQuery::builder().entity_ids([id.as_str()]).limit(2);
        if let Some(c) = cursor.take() {
            builder = builder.cursor(c);
        }
        let page = sink.query(&builder.build()).await.expect("query should succeed");
        seen.extend(page.items.iter().map(|e| e.provider_event_id.clone()));
        match page.next_cursor {
            Some(next) => {
                assert!(page.has_more);
                cursor = Some(next);
            }
            None => {
                assert!(!page.has_more);
                break;
            }
        }
    }

    assert_eq!(seen, vec!["evt-4", "evt-3", "evt-2", "evt-1", "evt-0"]);
}

pub async fn test_query_ascending_with_time_window<S: EventSink<OrderEventKind>>(sink: &S) {
    let id = entity();
    for i in 0..4 {
        sink.create(external(&id, &format!("evt-{i}"), i))
            .await
            .expect("create should succeed");
    }

    let page = sink
        .query(
            &EventQuery::builder()
                .entity_ids([id.as_str()])
                .time_from(base() + Duration::minutes(1))
                .time_to(base() + Duration::minutes(3))
                .ascending(true)
                .build(),
        )
        .await
        .expect("query should succeed");

    let ids: Vec<_> = page.items.iter().map(|e| e.provider_event_id.as_str()).collect();
    assert_eq!(ids, vec!["evt-1", "evt-2"]);
    assert!(!page.has_more);
}

pub async fn test_query_filters_kinds<S: EventSink<OrderEventKind>>(sink: &S) {
    let id = entity();
    sink.create(external(&id, "evt-1", 0))
        .await
        .expect("create should succeed");
    sink.create(NewEvent::internal(
        &id,
        OrderEventKind::HoldSet,
        json!({ "reason": "risk" }),
        base() + Duration::minutes(1),
    ))
    .await
    .expect("create should succeed");

    let page = sink
        .query(
            &EventQuery::builder()
                .entity_ids([id.as_str()])
                .kinds([OrderEventKind::HoldSet])
                .build(),
        )
        .await
        .expect("query should succeed");

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].kind, OrderEventKind::HoldSet);
    assert_eq!(page.items[0].data["reason"], "risk");
}

pub async fn test_query_rejects_bad_cursor<S: EventSink<OrderEventKind>>(sink: &S) {
    let err = sink
        .query(&EventQuery::builder().cursor("%%not-a-cursor%%").build())
        .await
        .expect_err("bad cursor should be rejected");

    assert!(matches!(err, StorageError::BadCursor), "got {err:?}");
}

/// Run all EventSink tests against a sink.
#[macro_export]
macro_rules! run_event_sink_tests {
    ($sink:expr) => {
        use $crate::storage::event_sink_tests::*;

        test_create_assigns_id($sink).await;
        println!("  test_create_assigns_id: PASSED");

        test_create_rejects_duplicate_provider_event($sink).await;
        println!("  test_create_rejects_duplicate_provider_event: PASSED");

        test_same_provider_event_on_other_entity($sink).await;
        println!("  test_same_provider_event_on_other_entity: PASSED");

        test_internal_events_never_collide($sink).await;
        println!("  test_internal_events_never_collide: PASSED");

        test_query_pages_descending($sink).await;
        println!("  test_query_pages_descending: PASSED");

        test_query_ascending_with_time_window($sink).await;
        println!("  test_query_ascending_with_time_window: PASSED");

        test_query_filters_kinds($sink).await;
        println!("  test_query_filters_kinds: PASSED");

        test_query_rejects_bad_cursor($sink).await;
        println!("  test_query_rejects_bad_cursor: PASSED");
    };
}
