//! OrderRepo and DisputeRepo interface tests.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use chargeflow::domain::{
    ChargebackWebhook, Dispute, DisputeEventKind, DisputeStatus, Evidence, EvidenceFile,
    EvidenceUpsert, HoldReason, NewEvent, Order, OrderEventKind, OrderStatus, OrdersQuery,
};
use chargeflow::interfaces::{DisputeRepo, OrderRepo, StorageError};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn order(order_id: &str, user_id: &str, minutes: i64) -> Order {
    let at = base() + Duration::minutes(minutes);
    Order {
        order_id: order_id.to_string(),
        user_id: user_id.to_string(),
        status: OrderStatus::Created,
        on_hold: false,
        hold_reason: None,
        created_at: at,
        updated_at: at,
    }
}

fn chargeback(order_id: &str) -> ChargebackWebhook {
    ChargebackWebhook {
        provider_event_id: format!("cb-{}", Uuid::new_v4()),
        order_id: order_id.to_string(),
        user_id: "user-1".to_string(),
        status: "opened".to_string(),
        reason: "fraudulent".to_string(),
        amount: 19.99,
        currency: "USD".to_string(),
        occurred_at: base(),
        evidence_due_at: Some(base() + Duration::days(7)),
        meta: HashMap::new(),
    }
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

// =============================================================================
// Orders
// =============================================================================

pub async fn test_order_commit_is_visible<R: OrderRepo>(repo: &R) {
    let id = unique("ord");
    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&order(&id, "user-1", 0))
        .await
        .expect("create should succeed");
    tx.append_event(NewEvent::external(
        &id,
        OrderEventKind::WebhookReceived,
        "evt-1",
        json!({}),
        base(),
    ))
    .await
    .expect("append should succeed");
    tx.commit().await.expect("commit should succeed");

    let stored = repo.get(&id).await.expect("get should succeed");
    assert_eq!(stored, Some(order(&id, "user-1", 0)));
}

pub async fn test_order_rollback_discards_everything<R: OrderRepo>(repo: &R) {
    let id = unique("ord");
    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&order(&id, "user-1", 0))
        .await
        .expect("create should succeed");
    tx.rollback().await.expect("rollback should succeed");

    assert_eq!(repo.get(&id).await.expect("get should succeed"), None);
}

pub async fn test_order_create_conflict<R: OrderRepo>(repo: &R) {
    let id = unique("ord");
    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&order(&id, "user-1", 0))
        .await
        .expect("create should succeed");
    tx.commit().await.expect("commit should succeed");

    let mut tx = repo.begin().await.expect("begin should succeed");
    let err = tx
        .create(&order(&id, "user-1", 0))
        .await
        .expect_err("second create should conflict");
    assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");
    tx.rollback().await.expect("rollback should succeed");
}

pub async fn test_order_update_round_trips_hold<R: OrderRepo>(repo: &R) {
    let id = unique("ord");
    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&order(&id, "user-1", 0))
        .await
        .expect("create should succeed");
    tx.commit().await.expect("commit should succeed");

    let mut tx = repo.begin().await.expect("begin should succeed");
    let mut locked = tx
        .get_for_update(&id)
        .await
        .expect("get_for_update should succeed")
        .expect("order should exist");
    locked.on_hold = true;
    locked.hold_reason = Some(HoldReason::Risk);
    locked.status = OrderStatus::Updated;
    locked.updated_at = base() + Duration::minutes(5);
    tx.update(&locked).await.expect("update should succeed");
    tx.commit().await.expect("commit should succeed");

    let stored = repo
        .get(&id)
        .await
        .expect("get should succeed")
        .expect("order should exist");
    assert_eq!(stored, locked);
}

pub async fn test_order_append_rejects_duplicate_in_tx<R: OrderRepo>(repo: &R) {
    let id = unique("ord");
    let event = || {
        NewEvent::external(&id, OrderEventKind::WebhookReceived, "evt-1", json!({}), base())
    };

    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.append_event(event()).await.expect("append should succeed");
    tx.commit().await.expect("commit should succeed");

    let mut tx = repo.begin().await.expect("begin should succeed");
    let err = tx
        .append_event(event())
        .await
        .expect_err("duplicate append should fail");
    assert!(matches!(err, StorageError::EventAlreadyStored), "got {err:?}");
    tx.rollback().await.expect("rollback should succeed");
}

pub async fn test_order_list_filters_and_sorts<R: OrderRepo>(repo: &R) {
    let user = unique("user");
    let ids: Vec<String> = (0..3).map(|_| unique("ord")).collect();

    let mut tx = repo.begin().await.expect("begin should succeed");
    for (i, id) in ids.iter().enumerate() {
        tx.create(&order(id, &user, i as i64))
            .await
            .expect("create should succeed");
    }
    tx.create(&order(&unique("ord"), "someone-else", 0))
        .await
        .expect("create should succeed");
    tx.commit().await.expect("commit should succeed");

    let query = OrdersQuery::builder()
        .user_ids([user.as_str()])
        .sort_by("created_at")
        .sort_order("asc")
        .build()
        .expect("query should build");
    let listed: Vec<String> = repo
        .list(&query)
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|o| o.order_id)
        .collect();
    assert_eq!(listed, ids);

    let query = OrdersQuery::builder()
        .user_ids([user.as_str()])
        .limit(1)
        .offset(1)
        .build()
        .expect("query should build");
    let listed = repo.list(&query).await.expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].order_id, ids[1]);
}

// =============================================================================
// Disputes
// =============================================================================

pub async fn test_dispute_create_and_lookup<D: DisputeRepo>(repo: &D) {
    let order_id = unique("ord");
    let dispute = Dispute::open(Uuid::new_v4(), &chargeback(&order_id));

    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&dispute).await.expect("create should succeed");
    tx.append_event(NewEvent::external(
        dispute.id.to_string(),
        DisputeEventKind::WebhookOpened,
        "cb-1",
        json!({}),
        base(),
    ))
    .await
    .expect("append should succeed");
    tx.commit().await.expect("commit should succeed");

    let by_id = repo.get(dispute.id).await.expect("get should succeed");
    let by_order = repo
        .get_by_order(&order_id)
        .await
        .expect("get_by_order should succeed");
    assert_eq!(by_id, Some(dispute.clone()));
    assert_eq!(by_order, Some(dispute.clone()));
    assert_eq!(dispute.status, DisputeStatus::Open);
    assert!(repo
        .list()
        .await
        .expect("list should succeed")
        .iter()
        .any(|d| d.id == dispute.id));
}

pub async fn test_dispute_one_per_order<D: DisputeRepo>(repo: &D) {
    let order_id = unique("ord");

    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&Dispute::open(Uuid::new_v4(), &chargeback(&order_id)))
        .await
        .expect("create should succeed");
    tx.commit().await.expect("commit should succeed");

    let mut tx = repo.begin().await.expect("begin should succeed");
    let err = tx
        .create(&Dispute::open(Uuid::new_v4(), &chargeback(&order_id)))
        .await
        .expect_err("second dispute for the order should conflict");
    assert!(matches!(err, StorageError::Conflict(_)), "got {err:?}");
    tx.rollback().await.expect("rollback should succeed");
}

pub async fn test_evidence_upsert_replaces<D: DisputeRepo>(repo: &D) {
    let dispute = Dispute::open(Uuid::new_v4(), &chargeback(&unique("ord")));
    let mut tx = repo.begin().await.expect("begin should succeed");
    tx.create(&dispute).await.expect("create should succeed");
    tx.commit().await.expect("commit should succeed");

    assert_eq!(
        repo.get_evidence(dispute.id).await.expect("get_evidence should succeed"),
        None
    );

    let first = Evidence::from_upsert(
        dispute.id,
        EvidenceUpsert {
            fields: HashMap::from([("note".to_string(), "first".to_string())]),
            files: vec![EvidenceFile {
                file_id: "f-1".into(),
                name: "receipt.pdf".into(),
                content_type: "application/pdf".into(),
                size: 1024,
            }],
        },
        base(),
    );
    let second = Evidence::from_upsert(
        dispute.id,
        EvidenceUpsert {
            fields: HashMap::from([("note".to_string(), "second".to_string())]),
            files: vec![],
        },
        base() + Duration::minutes(1),
    );

    for evidence in [&first, &second] {
        let mut tx = repo.begin().await.expect("begin should succeed");
        tx.upsert_evidence(evidence)
            .await
            .expect("upsert should succeed");
        tx.commit().await.expect("commit should succeed");
    }

    let stored = repo
        .get_evidence(dispute.id)
        .await
        .expect("get_evidence should succeed");
    assert_eq!(stored, Some(second));
}

/// Run all repository tests.
#[macro_export]
macro_rules! run_repository_tests {
    ($orders:expr, $disputes:expr) => {
        use $crate::storage::repository_tests::*;

        test_order_commit_is_visible($orders).await;
        println!("  test_order_commit_is_visible: PASSED");

        test_order_rollback_discards_everything($orders).await;
        println!("  test_order_rollback_discards_everything: PASSED");

        test_order_create_conflict($orders).await;
        println!("  test_order_create_conflict: PASSED");

        test_order_update_round_trips_hold($orders).await;
        println!("  test_order_update_round_trips_hold: PASSED");

        test_order_append_rejects_duplicate_in_tx($orders).await;
        println!("  test_order_append_rejects_duplicate_in_tx: PASSED");

        test_order_list_filters_and_sorts($orders).await;
        println!("  test_order_list_filters_and_sorts: PASSED");

        test_dispute_create_and_lookup($disputes).await;
        println!("  test_dispute_create_and_lookup: PASSED");

        test_dispute_one_per_order($disputes).await;
        println!("  test_dispute_one_per_order: PASSED");

        test_evidence_upsert_replaces($disputes).await;
        println!("  test_evidence_upsert_replaces: PASSED");
    };
}
