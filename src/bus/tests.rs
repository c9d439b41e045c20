use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::context::CORRELATION_HEADER;
use crate::dlq::{ChannelDeadLetterPublisher, ERROR_HEADER};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

fn message(offset: i64) -> Message {
    Message {
        topic: "webhooks.orders".into(),
        offset,
        key: b"user-1".to_vec(),
        value: b"{}".to_vec(),
        ..Default::default()
    }
}

/// Fails the first `failures` calls, then succeeds.
struct Flaky {
    failures: usize,
    calls: AtomicUsize,
}

impl Flaky {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for Flaky {
    async fn handle(&self, _ctx: &Context, _message: &Message) -> std::result::Result<(), HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(format!("transient failure {call}").into())
        } else {
            Ok(())
        }
    }
}

/// A source whose fetch always fails.
struct BrokenSource;

#[async_trait]
impl MessageSource for BrokenSource {
    fn topic(&self) -> &str {
        "broken"
    }

    async fn fetch(&self) -> Result<Message> {
        Err(BusError::Fetch("broker unreachable".into()))
    }

    async fn commit(&self, _message: &Message) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Envelope
// ============================================================================

#[test]
fn test_envelope_wire_format() {
    let env = Envelope::new("user-1", ORDER_WEBHOOK, &json!({"order_id": "o-1"})).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();

    assert_eq!(value["type"], "order.webhook");
    assert_eq!(value["key"], "user-1");
    assert_eq!(value["payload"]["order_id"], "o-1");
    assert!(value["event_id"].as_str().is_some());
    assert!(value["timestamp"].as_str().is_some());
}

#[test]
fn test_envelope_decode_and_payload() {
    #[derive(serde::Deserialize)]
    struct Payload {
        order_id: String,
    }

    let env = Envelope::new("user-1", DISPUTE_WEBHOOK, &json!({"order_id": "o-2"})).unwrap();
    let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();

    assert_eq!(decoded, env);
    assert_eq!(decoded.payload_as::<Payload>().unwrap().order_id, "o-2");
}

#[test]
fn test_envelope_decode_rejects_garbage() {
    assert!(matches!(Envelope::decode(b"not json"), Err(BusError::Encoding(_))));
}

#[test]
fn test_message_header_is_case_insensitive() {
    let mut msg = message(0);
    msg.headers.insert("x-correlation-id".into(), "abc".into());
    assert_eq!(msg.header(CORRELATION_HEADER), Some("abc"));
    assert_eq!(msg.header("missing"), None);
}

// ============================================================================
// Worker
// ============================================================================

#[tokio::test]
async fn test_worker_commits_only_successful_messages() {
    let bus = Arc::new(ChannelBus::new("webhooks.orders"));
    for _ in 0..3 {
        bus.send_raw("k", "v", HashMap::new()).await.unwrap();
    }
    MessageSource::close(bus.as_ref()).await.unwrap();

    let handler = HandlerFn(|_ctx: Context, msg: Message| -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        Box::pin(async move {
            if msg.offset == 1 {
                Err("rejected".into())
            } else {
                Ok(())
            }
        })
    });

    let worker = Worker::new(bus.clone());
    worker
        .start(&Context::background(), Arc::new(handler))
        .await
        .unwrap();

    assert_eq!(bus.committed_offsets().await, vec![0, 2]);
}

#[tokio::test]
async fn test_worker_propagates_or_generates_correlation_id() {
    let bus = Arc::new(ChannelBus::new("t"));
    bus.send_raw(
        "k",
        "v",
        HashMap::from([(CORRELATION_HEADER.to_string(), "corr-1".to_string())]),
    )
    .await
    .unwrap();
    bus.send_raw("k", "v", HashMap::new()).await.unwrap();
    MessageSource::close(bus.as_ref()).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = HandlerFn(move |ctx: Context, _msg: Message| -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().await.push(ctx.correlation_id().map(str::to_string));
            Ok(())
        })
    });

    Worker::new(bus)
        .start(&Context::background(), Arc::new(handler))
        .await
        .unwrap();

    let seen = seen.lock().await;
    assert_eq!(seen[0].as_deref(), Some("corr-1"));
    assert!(uuid::Uuid::parse_str(seen[1].as_deref().unwrap()).is_ok());
}

#[tokio::test]
async fn test_worker_stops_cleanly_on_cancel() {
    let bus = Arc::new(ChannelBus::new("t"));
    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let handler = Flaky::new(0);

    let worker = Worker::new(bus);
    let run = tokio::spawn(async move { worker.start(&ctx, handler).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_worker_commits_message_handled_as_shutdown_begins() {
    let bus = Arc::new(ChannelBus::new("t"));
    for _ in 0..2 {
        bus.send_raw("k", "v", HashMap::new()).await.unwrap();
    }
    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());

    let handler = HandlerFn(move |_ctx: Context, _msg: Message| -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        let token = token.clone();
        Box::pin(async move {
            token.cancel();
            Ok(())
        })
    });

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        Worker::new(bus.clone()).start(&ctx, Arc::new(handler)),
    )
    .await
    .expect("worker did not stop");
    assert!(result.is_ok());

    // Handled before shutdown was observed, so committed; the next one waits for redelivery.
    assert_eq!(bus.committed_offsets().await, vec![0]);
}

#[tokio::test]
async fn test_worker_returns_fetch_errors() {
    let worker = Worker::new(Arc::new(BrokenSource));
    let err = worker
        .start(&Context::background(), Flaky::new(0))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Fetch(_)));
}

// ============================================================================
// Runner
// ============================================================================

#[tokio::test]
async fn test_runner_recovers_worker_panics() {
    let bus = Arc::new(ChannelBus::new("t"));
    bus.send_raw("k", "v", HashMap::new()).await.unwrap();

    let handler = HandlerFn(|_ctx: Context, msg: Message| -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        Box::pin(async move {
            if msg.offset >= 0 {
                panic!("handler exploded");
            }
            Ok(())
        })
    });
    let runner = Runner::new(vec![Worker::new(bus.clone())], Arc::new(handler));

    tokio::time::timeout(Duration::from_secs(1), runner.start(&Context::background()))
        .await
        .expect("runner did not finish")
        .unwrap();

    // The panicking worker was closed.
    assert!(matches!(
        bus.publish(&Context::background(), &Envelope::new("u", ORDER_WEBHOOK, &json!({})).unwrap())
            .await,
        Err(BusError::Closed)
    ));
    assert!(bus.committed_offsets().await.is_empty());
}

#[tokio::test]
async fn test_runner_first_error_cancels_other_workers() {
    let healthy = Arc::new(ChannelBus::new("healthy"));
    let runner = Runner::new(
        vec![Worker::new(healthy.clone()), Worker::new(Arc::new(BrokenSource))],
        Flaky::new(0),
    );

    let err = tokio::time::timeout(Duration::from_secs(1), runner.start(&Context::background()))
        .await
        .expect("runner did not finish")
        .unwrap_err();

    assert!(matches!(err, BusError::Fetch(_)));
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_retry_succeeds_after_transient_failures() {
    let inner = Flaky::new(2);
    let handler = WithRetry::new(inner.clone(), fast_retry());

    handler.handle(&Context::background(), &message(0)).await.unwrap();
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_wraps_last_error() {
    let inner = Flaky::new(10);
    let handler = WithRetry::new(inner.clone(), fast_retry());

    let err = handler.handle(&Context::background(), &message(0)).await.unwrap_err();
    let exceeded = err.downcast_ref::<MaxRetriesExceeded>().expect("MaxRetriesExceeded");

    assert_eq!(exceeded.attempts, 3);
    assert_eq!(exceeded.last.to_string(), "transient failure 2");
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn test_retry_skips_permanent_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let inner = HandlerFn(move |_ctx: Context, _msg: Message| -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(Permanent::wrap("invalid status transition")) })
    });
    let handler = WithRetry::new(inner, fast_retry());

    let err = handler.handle(&Context::background(), &message(0)).await.unwrap_err();
    assert!(err.is::<Permanent>());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_stops_when_cancelled_during_backoff() {
    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let inner = Flaky::new(10);
    let handler = WithRetry::new(
        inner.clone(),
        RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(10),
        },
    );

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let err = tokio::time::timeout(Duration::from_secs(1), handler.handle(&ctx, &message(0)))
        .await
        .expect("retry ignored cancellation")
        .unwrap_err();
    canceller.await.unwrap();

    assert!(err.is::<middleware::RetryCancelled>());
    assert_eq!(inner.calls(), 1);
}

proptest! {
    #[test]
    fn prop_retry_delay_is_bounded(
        backoff_ms in 0u64..10_000,
        max_ms in 1u64..10_000,
        jitter_ms in 0u64..100,
    ) {
        let backoff = Duration::from_millis(backoff_ms);
        let max = Duration::from_millis(max_ms);
        let delay = middleware::retry_delay(backoff, max, Duration::from_millis(jitter_ms));

        prop_assert!(delay <= max);
        prop_assert!(delay >= backoff.min(max));
    }
}

// ============================================================================
// DLQ
// ============================================================================

#[tokio::test]
async fn test_dlq_publishes_terminal_failure_and_reports_success() {
    let (publisher, mut dead_letters) = ChannelDeadLetterPublisher::new();
    let handler = WithDlq::new(
        WithRetry::new(Flaky::new(10), fast_retry()),
        Arc::new(publisher),
    );

    handler.handle(&Context::background(), &message(7)).await.unwrap();

    let dl = dead_letters.recv().await.unwrap();
    assert_eq!(dl.source_offset, 7);
    assert_eq!(dl.key, b"user-1".to_vec());
    assert!(dl.headers()[ERROR_HEADER].contains("max retries exceeded"));
}

#[tokio::test]
async fn test_dlq_swallows_publish_failures() {
    let (publisher, receiver) = ChannelDeadLetterPublisher::new();
    drop(receiver);
    let handler = WithDlq::new(Flaky::new(10), Arc::new(publisher));

    assert!(handler.handle(&Context::background(), &message(0)).await.is_ok());
}

#[tokio::test]
async fn test_dlq_passes_through_cancellation() {
    let (publisher, mut dead_letters) = ChannelDeadLetterPublisher::new();
    let token = CancellationToken::new();
    token.cancel();
    let handler = WithDlq::new(Flaky::new(10), Arc::new(publisher));

    let result = handler.handle(&Context::new(token), &message(0)).await;

    assert!(result.is_err());
    assert!(dead_letters.try_recv().is_err());
}

#[tokio::test]
async fn test_composed_stack_commits_dead_lettered_messages() {
    let bus = Arc::new(ChannelBus::new("webhooks.orders"));
    bus.send_raw("user-1", "payload", HashMap::new()).await.unwrap();
    MessageSource::close(bus.as_ref()).await.unwrap();

    let (publisher, mut dead_letters) = ChannelDeadLetterPublisher::new();
    let handler = middleware::compose(
        Flaky::new(10),
        fast_retry(),
        Arc::new(publisher),
        "webhooks.orders",
        "orders-processor",
    );

    Worker::new(bus.clone())
        .start(&Context::background(), handler)
        .await
        .unwrap();

    assert_eq!(bus.committed_offsets().await, vec![0]);
    assert_eq!(dead_letters.recv().await.unwrap().value, b"payload".to_vec());
}
