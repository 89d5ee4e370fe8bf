//! Retrying consumer: claims `order.created`, dispatches to a user-supplied
//! handler, retries transient failures in-process with exponential backoff,
//! and routes exhausted or terminal failures to the DLQ.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::broker::{Consumer, ConsumedMessage, Producer, ProducerRecord, ORDER_CREATED_DLQ_TOPIC};
use crate::dlq::{MessageMetadata, MAX_RETRIES};
use crate::models::OrderCreatedEvent;
use crate::sleeper::{Sleeper, TokioSleeper};

/// Starts at 1s, doubles per in-process retry, capped at 30s.
fn retry_backoff() -> Backoff {
    Backoff::exponential(Duration::from_secs(1)).with_max(Duration::from_secs(30))
}

/// User-supplied delivery target. Handlers MUST be idempotent: a message may
/// be redelivered after a crash between a successful `handle` and its
/// commit.
#[async_trait]
pub trait OrderCreatedHandler: Send + Sync {
    type Error: std::fmt::Display + Send + Sync + 'static;

    async fn handle(&self, event: &OrderCreatedEvent) -> Result<(), Self::Error>;

    /// Whether `error` should be retried in-process. Non-retryable errors
    /// route straight to the DLQ without consuming the retry budget.
    fn is_retryable(&self, error: &Self::Error) -> bool;
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConsumerMetricsSnapshot {
    pub processed: u64,
    pub success: u64,
    pub failure: u64,
    pub retry: u64,
    pub dlq: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    retry: AtomicU64,
    dlq: AtomicU64,
}

pub struct RetryingConsumer<C, H> {
    consumer: C,
    dlq_producer: Arc<dyn Producer>,
    handler: H,
    sleeper: Arc<dyn Sleeper>,
    counters: Arc<Counters>,
}

impl<C: Consumer, H: OrderCreatedHandler> RetryingConsumer<C, H> {
    pub fn new(consumer: C, dlq_producer: Arc<dyn Producer>, handler: H) -> Self {
        Self { consumer, dlq_producer, handler, sleeper: Arc::new(TokioSleeper), counters: Arc::new(Counters::default()) }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn metrics(&self) -> ConsumerMetricsSnapshot {
        ConsumerMetricsSnapshot {
            processed: self.counters.processed.load(Ordering::Relaxed),
            success: self.counters.success.load(Ordering::Relaxed),
            failure: self.counters.failure.load(Ordering::Relaxed),
            retry: self.counters.retry.load(Ordering::Relaxed),
            dlq: self.counters.dlq.load(Ordering::Relaxed),
        }
    }

    /// Claim loop: runs until `token` is cancelled or the underlying
    /// consumer's stream ends.
    pub async fn run(&mut self, token: &CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                message = self.consumer.poll() => {
                    let Some(message) = message else { return };
                    self.process_one(message, token).await;
                }
            }
        }
    }

    /// Process a single claimed message to completion (success, DLQ, or
    /// cancellation). Exposed directly so tests can drive one message at a
    /// time without running the claim loop.
    pub async fn process_one(&mut self, message: ConsumedMessage, token: &CancellationToken) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        let retry_count_header: usize = message.header("retry_count").and_then(|s| s.parse().ok()).unwrap_or(0);

        let event: OrderCreatedEvent = match serde_json::from_slice(&message.value) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "order.created payload failed to decode, routing to DLQ");
                self.route_to_dlq(&message, retry_count_header + 1, &err.to_string()).await;
                let _ = self.consumer.commit(&message).await;
                return;
            }
        };

        let max_retries_allowed = MAX_RETRIES + retry_count_header;
        let backoff = retry_backoff();
        let mut attempts_made = 0usize;

        loop {
            attempts_made += 1;
            match self.handler.handle(&event).await {
                Ok(()) => {
                    self.counters.success.fetch_add(1, Ordering::Relaxed);
                    let _ = self.consumer.commit(&message).await;
                    return;
                }
                Err(err) => {
                    self.counters.failure.fetch_add(1, Ordering::Relaxed);
                    let retries_so_far = attempts_made - 1;
                    let terminal = !self.handler.is_retryable(&err);
                    let exhausted = retries_so_far >= max_retries_allowed;

                    if terminal || exhausted {
                        let reason = if terminal { "terminal error" } else { "retry budget exhausted" };
                        tracing::warn!(order_id = %event.order_id, attempts_made, %reason, "routing to DLQ");
                        self.route_to_dlq(&message, retry_count_header + attempts_made, &err.to_string()).await;
                        let _ = self.consumer.commit(&message).await;
                        return;
                    }

                    self.counters.retry.fetch_add(1, Ordering::Relaxed);
                    let delay = backoff.delay(attempts_made);
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = self.sleeper.sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn route_to_dlq(&self, message: &ConsumedMessage, retry_count: usize, error_message: &str) {
        self.counters.dlq.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let metadata = MessageMetadata {
            retry_count,
            first_failure: now,
            last_failure: now,
            original_topic: message.topic.clone(),
            error_message: error_message.to_string(),
        };
        let metadata_json = match serde_json::to_string(&metadata) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize DLQ metadata, message dropped");
                return;
            }
        };
        let record = ProducerRecord::new(ORDER_CREATED_DLQ_TOPIC, message.key.clone(), message.value.clone())
            .with_header("metadata", metadata_json)
            .with_header("original_topic", message.topic.clone())
            .with_header("original_partition", message.partition.to_string())
            .with_header("original_offset", message.offset.to_string())
            .with_header("failure_time", now.to_rfc3339());
        if let Err(err) = self.dlq_producer.send(record).await {
            tracing::error!(error = %err, "DLQ publish failed; message will be re-delivered on next poll");
        }
    }
}
