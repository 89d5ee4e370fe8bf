//! Convenient re-exports for common types.
pub use crate::{
    backoff::Backoff,
    broker::{ConsumedMessage, Consumer, InMemoryBroker, Producer, ProducerRecord},
    circuit_breaker::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerPolicy, CircuitState},
    circuit_breaker_registry::CircuitBreakerRegistry,
    clock::{Clock, ManualClock, MonotonicClock},
    comparison::{compare_all, compare_one, ComparisonReport, FieldMismatch, Severity},
    config::AppConfig,
    consumer::{ConsumerMetricsSnapshot, OrderCreatedHandler, RetryingConsumer},
    dlq::{DlqEntry, DlqStore, MessageMetadata},
    health::HealthSnapshot,
    intake::{IntakeCoordinator, IntakeMode, LegacyClient},
    jitter::Jitter,
    legacy_consumer::{FaultInjection, LegacyConsumer},
    models::{NewOrder, Order, OrderCreatedEvent, OrderItem, OrderStatus},
    publisher::EventPublisher,
    replayer::{DlqReplayer, ReplayerConfig, ReplayerMetrics},
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper},
    store::{InMemoryOrderStore, OrderStore},
    timeout::{TimeoutError, TimeoutLayer, TimeoutPolicy},
    ResilienceError,
};
