//! Cross-module seed scenarios: end-to-end flows that
//! exercise intake, the broker, the retrying consumer, the DLQ/replayer, and
//! the comparison engine together rather than in isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use strangler_core::broker::InMemoryBroker;
use strangler_core::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState};
use strangler_core::comparison::compare_all;
use strangler_core::consumer::RetryingConsumer;
use strangler_core::dlq::MAX_RETRIES;
use strangler_core::intake::{IntakeCoordinator, LegacyClient, LegacyClientError};
use strangler_core::legacy_consumer::{FaultInjection, LegacyConsumer};
use strangler_core::models::{NewOrder, Order, OrderItem};
use strangler_core::publisher::EventPublisher;
use strangler_core::replayer::{DlqReplayer, ReplayerConfig};
use strangler_core::sleeper::TrackingSleeper;
use strangler_core::store::{InMemoryOrderStore, OrderStore};

/// Surfaces the breaker's/consumer's `tracing` output (state transitions,
/// DLQ routing, clamp warnings) under `cargo test -- --nocapture`.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("strangler_core=debug").try_init();
    });
}

fn draft(id: &str, amount: f64) -> NewOrder {
    NewOrder {
        id: Some(id.to_string()),
        customer_id: "C1".to_string(),
        items: vec![OrderItem {
            product_id: "P1".to_string(),
            quantity: 2,
            unit_price: amount / 2.0,
            specifications: HashMap::new(),
        }],
        total_amount: amount,
        delivery_date: chrono::Utc::now(),
        status: None,
        created_at: None,
    }
}

/// Seed scenario 1: happy path event-only flow. Submitting an order
/// persists it modern-side, publishes `order.created`, and the retrying
/// consumer applying that event converges the legacy store, bringing
/// system-wide comparison to 100% sync.
#[tokio::test]
async fn happy_path_converges_modern_and_legacy_stores() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let modern_store = Arc::new(InMemoryOrderStore::new());
    let legacy_store = Arc::new(InMemoryOrderStore::new());

    let coordinator = IntakeCoordinator::event_only(modern_store.clone(), EventPublisher::new(Arc::new(broker.producer())));
    let order = coordinator.create_order(draft("O1", 20.00)).await.expect("order accepted");
    assert_eq!(order.id, "O1");

    let mut consumer = RetryingConsumer::new(
        broker.consumer("order.created"),
        Arc::new(broker.producer()),
        LegacyConsumer::new(legacy_store.clone(), FaultInjection::default()),
    );
    let token = CancellationToken::new();
    let message = broker.consumer("order.created").poll().await.expect("event published");
    consumer.process_one(message, &token).await;
    assert_eq!(consumer.metrics().success, 1);

    let legacy_order = legacy_store.get("O1").await.expect("legacy record present");
    assert_eq!(legacy_order.total_amount, 20.00);

    let modern_orders = modern_store.list().await.unwrap();
    let legacy_orders = legacy_store.list().await.unwrap();
    let report = compare_all(&modern_orders, &legacy_orders);
    assert_eq!(report.sync_percentage, 100.0);
    assert_eq!(report.status, "excellent");
}

/// Seed scenario 2: repeated legacy outage during dual-write opens the
/// circuit breaker, after which further submissions are rejected without
/// ever calling the legacy client again, and totals match exactly the
/// number of attempts made before it opened.
#[tokio::test]
async fn circuit_opens_on_repeated_legacy_failure_during_dual_write() {
    init_tracing();
    struct AlwaysFailLegacy(Arc<AtomicUsize>);

    #[async_trait]
    impl LegacyClient for AlwaysFailLegacy {
        async fn create_order(&self, _order: &Order) -> Result<(), LegacyClientError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(LegacyClientError("system unavailable".to_string()))
        }
    }

    let broker = InMemoryBroker::new();
    let store = Arc::new(InMemoryOrderStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let breaker = CircuitBreakerPolicy::new(
        CircuitBreakerConfig::new("legacy-seed").max_failures(3).timeout(Duration::from_secs(10)).max_requests(2),
    );
    let coordinator = IntakeCoordinator::dual_write(
        store,
        EventPublisher::new(Arc::new(broker.producer())),
        Arc::new(AlwaysFailLegacy(calls.clone())),
        breaker.clone(),
        Duration::from_secs(1),
    );

    let mut rejected_immediately = 0;
    for i in 0..5 {
        let result = coordinator.create_order(draft(&format!("O{i}"), 10.0)).await;
        assert!(result.is_err());
        if i >= 3 {
            rejected_immediately += 1;
        }
    }

    assert_eq!(rejected_immediately, 2, "4th and 5th submissions should be rejected without reaching the client");
    assert_eq!(calls.load(Ordering::SeqCst), 3, "only the first 3 attempts ever reached the legacy client");
    assert_eq!(breaker.state(), CircuitState::Open);

    let metrics = breaker.metrics();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.total_failures, 3);
    assert_eq!(metrics.total_successes, 0);
    assert!(metrics.state_changes >= 1);
}

/// Seed scenario 4: a handler that always fails exhausts its retry budget
/// and lands in the DLQ with the total attempt count recorded as
/// `retry_count`.
#[tokio::test]
async fn retry_budget_exhaustion_routes_to_dlq_with_preserved_payload() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let legacy_store = Arc::new(InMemoryOrderStore::new());

    let coordinator = IntakeCoordinator::event_only(
        Arc::new(InMemoryOrderStore::new()),
        EventPublisher::new(Arc::new(broker.producer())),
    );
    coordinator.create_order(draft("O9", 42.0)).await.unwrap();

    let mut consumer = RetryingConsumer::new(
        broker.consumer("order.created"),
        Arc::new(broker.producer()),
        LegacyConsumer::new(legacy_store, FaultInjection::new(0.0, true)),
    )
    .with_sleeper(Arc::new(TrackingSleeper::new()));

    let token = CancellationToken::new();
    let message = broker.consumer("order.created").poll().await.unwrap();
    let original_value = message.value.clone();
    let original_key = message.key.clone();
    consumer.process_one(message, &token).await;

    assert_eq!(consumer.metrics().dlq, 1);
    assert_eq!(consumer.metrics().retry, MAX_RETRIES as u64);

    let mut dlq_consumer = broker.consumer("order.created.dlq");
    let dlq_message = dlq_consumer.poll().await.unwrap();
    assert_eq!(dlq_message.value, original_value, "DLQ value must be byte-equal to the original");
    assert_eq!(dlq_message.key, original_key, "DLQ key must be byte-equal to the original");

    let entry = strangler_core::dlq::DlqEntry::from_message(&dlq_message).unwrap();
    assert_eq!(entry.metadata.retry_count, MAX_RETRIES + 1);
}

/// Seed scenario 5: a message dead-lettered while the legacy side is
/// simulating an outage is successfully replayed once the outage clears,
/// closing the loop end to end.
#[tokio::test]
async fn dlq_replay_closes_the_loop_once_legacy_recovers() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let legacy_store = Arc::new(InMemoryOrderStore::new());

    let coordinator = IntakeCoordinator::event_only(
        Arc::new(InMemoryOrderStore::new()),
        EventPublisher::new(Arc::new(broker.producer())),
    );
    coordinator.create_order(draft("O-replay", 15.0)).await.unwrap();

    let token = CancellationToken::new();
    // One stable consumer per topic: in-memory consumers track their own
    // read cursor, so a fresh instance would re-read the topic from offset
    // zero rather than picking up where a prior instance left off.
    let mut main_consumer = broker.consumer("order.created");
    let mut dlq_consumer = broker.consumer("order.created.dlq");

    // First pass: legacy is down, the message exhausts retries into the DLQ.
    let mut consumer = RetryingConsumer::new(
        broker.consumer("order.created"),
        Arc::new(broker.producer()),
        LegacyConsumer::new(legacy_store.clone(), FaultInjection::new(0.0, true)),
    )
    .with_sleeper(Arc::new(TrackingSleeper::new()));
    let message = main_consumer.poll().await.unwrap();
    consumer.process_one(message, &token).await;
    assert_eq!(consumer.metrics().dlq, 1);
    assert!(legacy_store.get("O-replay").await.is_err());

    // Replayer reinjects the DLQ entry onto the main topic.
    let mut replayer = DlqReplayer::new(
        broker.consumer("order.created.dlq"),
        Arc::new(broker.producer()),
        ReplayerConfig::default(),
    )
    .with_sleeper(Arc::new(TrackingSleeper::new()));
    let dlq_message = dlq_consumer.poll().await.unwrap();
    replayer.process_one(dlq_message, &token).await;
    assert_eq!(replayer.metrics().replayed, 1);

    // Legacy has now recovered; the replayed message is consumed and applied.
    let mut recovered_consumer = RetryingConsumer::new(
        broker.consumer("order.created"),
        Arc::new(broker.producer()),
        LegacyConsumer::new(legacy_store.clone(), FaultInjection::default()),
    );
    let replayed_message = main_consumer.poll().await.unwrap();
    assert_eq!(replayed_message.header("replayed_from_dlq"), Some("true"));
    recovered_consumer.process_one(replayed_message, &token).await;

    assert_eq!(recovered_consumer.metrics().success, 1);
    let legacy_order = legacy_store.get("O-replay").await.expect("legacy store now has the order");
    assert_eq!(legacy_order.total_amount, 15.0);
}

/// Seed scenario 6: an admission with an already-cancelled token never
/// invokes the wrapped operation and leaves every counter untouched.
#[tokio::test]
async fn pre_cancelled_admission_does_not_touch_breaker_counters() {
    init_tracing();
    #[derive(Debug, thiserror::Error)]
    #[error("unused")]
    struct Unused;

    let breaker = CircuitBreakerPolicy::new(CircuitBreakerConfig::new("cancel-seed").max_failures(3));
    let token = CancellationToken::new();
    token.cancel();
    let invoked = Arc::new(AtomicUsize::new(0));
    let invoked_clone = invoked.clone();

    let result = breaker
        .execute_cancellable(&token, move || {
            let invoked = invoked_clone.clone();
            async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, strangler_core::ResilienceError<Unused>>(())
            }
        })
        .await;

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(invoked.load(Ordering::SeqCst), 0, "fn must never run on a pre-cancelled token");
    let metrics = breaker.metrics();
    assert_eq!(metrics.total_requests, 0);
    assert_eq!(metrics.total_successes, 0);
    assert_eq!(metrics.total_failures, 0);
}
