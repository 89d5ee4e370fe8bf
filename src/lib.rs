#![forbid(unsafe_code)]

//! Resilience and event-flow machinery for a strangler-pattern migration
//! between a legacy order backend and a modern order service.
//!
//! ## Building blocks
//!
//! - [`circuit_breaker`] / [`circuit_breaker_registry`] — per-dependency
//!   circuit breakers with half-open recovery, shared via a process-wide
//!   registry.
//! - [`retry`] and [`backoff`] / [`jitter`] — generic retry-with-backoff
//!   primitives.
//! - [`broker`] — the `Producer`/`Consumer` ports the rest of the crate is
//!   built against, plus an in-memory test double.
//! - [`publisher`] — publishes `order.created` events.
//! - [`consumer`] / [`dlq`] — retrying delivery to a user handler, with
//!   dead-letter routing on exhaustion.
//! - [`replayer`] — reinjects eligible dead-lettered messages.
//! - [`store`] — transactional order persistence (in-memory, optionally
//!   Postgres behind the `postgres` feature).
//! - [`intake`] — validates, persists, and publishes new orders; optionally
//!   dual-writes to the legacy system behind a circuit breaker.
//! - [`legacy_consumer`] — applies events at the legacy side.
//! - [`comparison`] — computes convergence between the two stores.
//! - [`health`] — a read-only snapshot of breaker/consumer/replayer state.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use strangler_core::broker::InMemoryBroker;
//! use strangler_core::intake::IntakeCoordinator;
//! use strangler_core::models::{NewOrder, OrderItem};
//! use strangler_core::publisher::EventPublisher;
//! use strangler_core::store::InMemoryOrderStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = InMemoryBroker::new();
//!     let store = Arc::new(InMemoryOrderStore::new());
//!     let publisher = EventPublisher::new(Arc::new(broker.producer()));
//!     let coordinator = IntakeCoordinator::event_only(store, publisher);
//!
//!     let draft = NewOrder {
//!         id: None,
//!         customer_id: "customer-1".to_string(),
//!         items: vec![OrderItem {
//!             product_id: "sku-1".to_string(),
//!             quantity: 1,
//!             unit_price: 9.99,
//!             specifications: Default::default(),
//!         }],
//!         total_amount: 9.99,
//!         delivery_date: chrono::Utc::now(),
//!         status: None,
//!         created_at: None,
//!     };
//!     coordinator.create_order(draft).await.expect("order accepted");
//! }
//! ```

pub mod backoff;
pub mod broker;
pub mod circuit_breaker;
pub mod circuit_breaker_registry;
pub mod clock;
pub mod comparison;
pub mod config;
pub mod consumer;
pub mod dlq;
pub mod error;
pub mod health;
pub mod intake;
pub mod jitter;
pub mod legacy_consumer;
pub mod models;
pub mod publisher;
pub mod replayer;
pub mod retry;
pub mod sleeper;
pub mod store;
pub mod timeout;

pub use backoff::Backoff;
pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerPolicy, CircuitState};
pub use circuit_breaker_registry::CircuitBreakerRegistry;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{TimeoutError, TimeoutLayer, TimeoutPolicy, TimeoutService, MAX_TIMEOUT};

pub mod prelude;
