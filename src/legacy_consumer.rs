//! Applies `OrderCreatedEvent` at the legacy side. Exposes instance-owned
//! fault-injection knobs for deterministic tests, rather than mutable
//! process globals — production wiring never sets `simulate_outage` or a
//! nonzero `failure_rate`.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::consumer::OrderCreatedHandler;
use crate::models::{Order, OrderCreatedEvent, OrderStatus};
use crate::store::OrderStore;

#[derive(Debug, thiserror::Error)]
pub enum LegacyConsumerError {
    #[error("legacy system unavailable")]
    Unavailable,
    #[error("processing error: {0}")]
    Processing(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Fault-injection knobs, owned by one consumer instance.
#[derive(Debug, Clone, Copy)]
pub struct FaultInjection {
    pub failure_rate: f64,
    pub simulate_outage: bool,
}

impl Default for FaultInjection {
    fn default() -> Self {
        Self { failure_rate: 0.0, simulate_outage: false }
    }
}

impl FaultInjection {
    pub fn new(failure_rate: f64, simulate_outage: bool) -> Self {
        Self { failure_rate: failure_rate.clamp(0.0, 1.0), simulate_outage }
    }
}

pub struct LegacyConsumer {
    store: Arc<dyn OrderStore>,
    faults: FaultInjection,
}

impl LegacyConsumer {
    pub fn new(store: Arc<dyn OrderStore>, faults: FaultInjection) -> Self {
        Self { store, faults }
    }
}

#[async_trait]
impl OrderCreatedHandler for LegacyConsumer {
    type Error = LegacyConsumerError;

    async fn handle(&self, event: &OrderCreatedEvent) -> Result<(), Self::Error> {
        if self.faults.simulate_outage {
            return Err(LegacyConsumerError::Unavailable);
        }
        if self.faults.failure_rate > 0.0 {
            let roll: f64 = rand::thread_rng().gen_range(0.0..1.0);
            if roll < self.faults.failure_rate {
                return Err(LegacyConsumerError::Processing("random failure".to_string()));
            }
        }

        // The event carries no line items (see DESIGN.md), so the upserted
        // legacy-side record records an empty item list.
        let order = Order {
            id: event.order_id.clone(),
            customer_id: event.customer_id.clone(),
            items: Vec::new(),
            total_amount: event.total_amount,
            delivery_date: event.created_at,
            status: OrderStatus::Confirmed,
            created_at: event.created_at,
        };
        self.store.save_historical(order).await.map_err(|e| LegacyConsumerError::Store(e.to_string()))
    }

    fn is_retryable(&self, error: &Self::Error) -> bool {
        let message = error.to_string();
        message.contains("unavailable") || message.contains("processing error") || message.contains("random failure")
    }
}
