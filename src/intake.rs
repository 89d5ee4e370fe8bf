//! Validates, persists, publishes, and — during the safety-net phase —
//! dual-writes new orders to the legacy system over HTTP, behind a named
//! circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::circuit_breaker::CircuitBreakerPolicy;
use crate::error::{CoordinatorError, ResilienceError};
use crate::models::{NewOrder, Order, OrderCreatedEvent};
use crate::publisher::EventPublisher;
use crate::store::OrderStore;
use crate::timeout::TimeoutPolicy;

/// Outbound call to the legacy system. A concrete implementation performs
/// the actual HTTP request; this port only carries the order payload and a
/// foreign failure type, letting the circuit breaker stay agnostic of the
/// transport.
#[async_trait]
pub trait LegacyClient: Send + Sync {
    async fn create_order(&self, order: &Order) -> Result<(), LegacyClientError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("legacy client error: {0}")]
pub struct LegacyClientError(pub String);

/// Which side-effects `create_order` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeMode {
    /// Safety-net phase: write to both stores. The legacy write goes over
    /// HTTP behind a circuit breaker; a failure there does not roll back
    /// the modern-store write that already succeeded (dual-write is not
    /// atomic).
    DualWrite,
    /// Terminal phase: write only to the modern store, which alone
    /// publishes the event; the legacy side converges asynchronously via
    /// the retrying consumer.
    EventOnly,
}

pub struct IntakeCoordinator {
    store: Arc<dyn OrderStore>,
    publisher: EventPublisher,
    legacy_client: Option<Arc<dyn LegacyClient>>,
    legacy_breaker: Option<CircuitBreakerPolicy>,
    /// Per-request timeout applied to the legacy HTTP call, strictly below
    /// the paired breaker's `timeout` (spec.md §4.6) so a hung dependency
    /// fails at the HTTP layer first and is counted as a breaker failure.
    /// Unused in [`IntakeMode::EventOnly`].
    legacy_http_timeout: Duration,
    mode: IntakeMode,
}

impl IntakeCoordinator {
    pub fn event_only(store: Arc<dyn OrderStore>, publisher: EventPublisher) -> Self {
        Self {
            store,
            publisher,
            legacy_client: None,
            legacy_breaker: None,
            legacy_http_timeout: Duration::ZERO,
            mode: IntakeMode::EventOnly,
        }
    }

    pub fn dual_write(
        store: Arc<dyn OrderStore>,
        publisher: EventPublisher,
        legacy_client: Arc<dyn LegacyClient>,
        legacy_breaker: CircuitBreakerPolicy,
        legacy_http_timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            legacy_client: Some(legacy_client),
            legacy_breaker: Some(legacy_breaker),
            legacy_http_timeout,
            mode: IntakeMode::DualWrite,
        }
    }

    pub fn mode(&self) -> IntakeMode {
        self.mode
    }

    pub async fn create_order(&self, draft: NewOrder) -> Result<Order, CoordinatorError> {
        let order = draft.into_order();
        if order.items.is_empty() {
            return Err(CoordinatorError::Validation("order must have at least one item".to_string()));
        }

        self.store.save(order.clone()).await?;

        if self.mode == IntakeMode::DualWrite {
            if let (Some(client), Some(breaker)) = (&self.legacy_client, &self.legacy_breaker) {
                let client = client.clone();
                let order_for_legacy = order.clone();
                let timeout_policy = match TimeoutPolicy::new(self.legacy_http_timeout) {
                    Ok(policy) => Some(policy),
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            "invalid legacy HTTP timeout configured; legacy call will not be bounded by a request timeout"
                        );
                        None
                    }
                };
                let legacy_result = breaker
                    .execute(move || {
                        let client = client.clone();
                        let order = order_for_legacy.clone();
                        async move {
                            let call = move || {
                                let client = client.clone();
                                let order = order.clone();
                                async move { client.create_order(&order).await.map_err(ResilienceError::Inner) }
                            };
                            match timeout_policy {
                                Some(policy) => policy.execute(call).await,
                                None => call().await,
                            }
                        }
                    })
                    .await;
                if let Err(err) = legacy_result {
                    return Err(CoordinatorError::Legacy(err.to_string()));
                }
            }
        }

        let event = OrderCreatedEvent::from_order(&order);
        self.publisher.publish(event).await?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::models::OrderItem;
    use crate::store::InMemoryOrderStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn draft(id: &str) -> NewOrder {
        NewOrder {
            id: Some(id.to_string()),
            customer_id: "c1".to_string(),
            items: vec![OrderItem { product_id: "p1".to_string(), quantity: 1, unit_price: 1.0, specifications: HashMap::new() }],
            total_amount: 1.0,
            delivery_date: chrono::Utc::now(),
            status: None,
            created_at: None,
        }
    }

    struct AlwaysOkLegacy;
    #[async_trait]
    impl LegacyClient for AlwaysOkLegacy {
        async fn create_order(&self, _order: &Order) -> Result<(), LegacyClientError> {
            Ok(())
        }
    }

    struct AlwaysFailLegacy;
    #[async_trait]
    impl LegacyClient for AlwaysFailLegacy {
        async fn create_order(&self, _order: &Order) -> Result<(), LegacyClientError> {
            Err(LegacyClientError("legacy down".to_string()))
        }
    }

    #[tokio::test]
    async fn event_only_mode_persists_and_publishes_without_legacy_call() {
        let broker = InMemoryBroker::new();
        let store = Arc::new(InMemoryOrderStore::new());
        let coordinator = IntakeCoordinator::event_only(store.clone(), EventPublisher::new(Arc::new(broker.producer())));
        let order = coordinator.create_order(draft("o1")).await.unwrap();
        assert_eq!(order.id, "o1");
        assert_eq!(broker.depth("order.created").await, 1);
    }

    #[tokio::test]
    async fn rejects_orders_with_no_items() {
        let broker = InMemoryBroker::new();
        let store = Arc::new(InMemoryOrderStore::new());
        let coordinator = IntakeCoordinator::event_only(store, EventPublisher::new(Arc::new(broker.producer())));
        let mut empty = draft("o1");
        empty.items.clear();
        let err = coordinator.create_order(empty).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
    }

    #[tokio::test]
    async fn dual_write_succeeds_and_publishes_on_legacy_success() {
        let broker = InMemoryBroker::new();
        let store = Arc::new(InMemoryOrderStore::new());
        let breaker = CircuitBreakerPolicy::new(CircuitBreakerConfig::new("legacy-intake").max_failures(3).timeout(Duration::from_secs(5)));
        let coordinator = IntakeCoordinator::dual_write(
            store.clone(),
            EventPublisher::new(Arc::new(broker.producer())),
            Arc::new(AlwaysOkLegacy),
            breaker,
            Duration::from_millis(500),
        );
        coordinator.create_order(draft("o1")).await.unwrap();
        assert_eq!(broker.depth("order.created").await, 1);
    }

    #[tokio::test]
    async fn dual_write_does_not_roll_back_modern_store_on_legacy_failure() {
        let broker = InMemoryBroker::new();
        let store = Arc::new(InMemoryOrderStore::new());
        let breaker = CircuitBreakerPolicy::new(CircuitBreakerConfig::new("legacy-intake-2").max_failures(3).timeout(Duration::from_secs(5)));
        let coordinator = IntakeCoordinator::dual_write(
            store.clone(),
            EventPublisher::new(Arc::new(broker.producer())),
            Arc::new(AlwaysFailLegacy),
            breaker,
            Duration::from_millis(500),
        );
        let err = coordinator.create_order(draft("o1")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Legacy(_)));
        // The modern-store write already committed and is not undone.
        assert!(store.get("o1").await.is_ok());
        // No event was published since the coordinator returned early.
        assert_eq!(broker.depth("order.created").await, 0);
    }

    #[tokio::test]
    async fn open_legacy_breaker_short_circuits_without_calling_legacy_client() {
        let broker = InMemoryBroker::new();
        let store = Arc::new(InMemoryOrderStore::new());
        let breaker = CircuitBreakerPolicy::new(CircuitBreakerConfig::new("legacy-intake-3").max_failures(1).timeout(Duration::from_secs(30)));
        let called = Arc::new(AtomicBool::new(false));

        struct TrackingLegacy(Arc<AtomicBool>);
        #[async_trait]
        impl LegacyClient for TrackingLegacy {
            async fn create_order(&self, _order: &Order) -> Result<(), LegacyClientError> {
                self.0.store(true, Ordering::SeqCst);
                Err(LegacyClientError("down".to_string()))
            }
        }

        let coordinator = IntakeCoordinator::dual_write(
            store.clone(),
            EventPublisher::new(Arc::new(broker.producer())),
            Arc::new(TrackingLegacy(called.clone())),
            breaker.clone(),
            Duration::from_secs(1),
        );
        let _ = coordinator.create_order(draft("o1")).await;
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(breaker.state(), crate::circuit_breaker::CircuitState::Open);

        called.store(false, Ordering::SeqCst);
        let _ = coordinator.create_order(draft("o2")).await;
        assert!(!called.load(Ordering::SeqCst), "breaker should short-circuit without invoking the legacy client");
    }
}
