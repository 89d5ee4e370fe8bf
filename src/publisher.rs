//! Serializes and publishes `OrderCreatedEvent` onto the main topic.

use std::sync::Arc;

use chrono::Utc;

use crate::broker::{Producer, ProducerRecord, ORDER_CREATED_TOPIC};
use crate::error::PublishError;
use crate::models::OrderCreatedEvent;

#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<dyn Producer>,
}

impl EventPublisher {
    pub fn new(producer: Arc<dyn Producer>) -> Self {
        Self { producer }
    }

    /// Stamps `event_time = now`, serializes as JSON, and publishes keyed by
    /// `order_id` so all events for one order land on the same partition.
    pub async fn publish(&self, mut event: OrderCreatedEvent) -> Result<(), PublishError> {
        event.event_time = Utc::now();
        let value = serde_json::to_vec(&event).map_err(|e| PublishError::Serialize(e.to_string()))?;
        let record = ProducerRecord::new(ORDER_CREATED_TOPIC, event.order_id.clone().into_bytes(), value);
        self.producer.send(record).await
    }
}
