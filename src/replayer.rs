//! Consumes the DLQ topic and reinjects eligible messages onto the main
//! topic after a cooldown, capping total lifetime retries so a poison
//! message cannot loop between the DLQ and the main topic forever.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::broker::{Consumer, ConsumedMessage, Producer, ProducerRecord, ORDER_CREATED_TOPIC};
use crate::dlq::{DlqEntry, DlqStatus, DlqStore, REPLAY_LIFETIME_CAP};
use crate::sleeper::{Sleeper, TokioSleeper};

#[derive(Debug, Clone)]
pub struct ReplayerConfig {
    pub cooldown: Duration,
}

impl Default for ReplayerConfig {
    fn default() -> Self {
        Self { cooldown: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReplayerMetrics {
    pub replayed: u64,
    pub abandoned: u64,
}

pub struct DlqReplayer<C> {
    consumer: C,
    producer: Arc<dyn Producer>,
    config: ReplayerConfig,
    sleeper: Arc<dyn Sleeper>,
    store: DlqStore,
    replayed: AtomicU64,
    abandoned: AtomicU64,
}

impl<C: Consumer> DlqReplayer<C> {
    pub fn new(consumer: C, producer: Arc<dyn Producer>, config: ReplayerConfig) -> Self {
        Self {
            consumer,
            producer,
            config,
            sleeper: Arc::new(TokioSleeper),
            store: DlqStore::new(),
            replayed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Every entry this replayer has seen, at whatever stage of its
    /// lifecycle — parked, replayed, or abandoned — for operator inspection.
    pub fn store(&self) -> &DlqStore {
        &self.store
    }

    pub fn metrics(&self) -> ReplayerMetrics {
        ReplayerMetrics {
            replayed: self.replayed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

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

    pub async fn process_one(&mut self, message: ConsumedMessage, token: &CancellationToken) {
        let Some(mut entry) = DlqEntry::from_message(&message) else {
            tracing::error!("DLQ message missing or malformed metadata header, abandoning");
            self.abandoned.fetch_add(1, Ordering::Relaxed);
            let _ = self.consumer.commit(&message).await;
            return;
        };

        // Parked as soon as it lands in the DLQ, so an operator listing the
        // store sees it before the cooldown/replay decision is made.
        self.store.record(entry.clone());

        if entry.metadata.retry_count >= REPLAY_LIFETIME_CAP {
            tracing::error!(
                retry_count = entry.metadata.retry_count,
                cap = REPLAY_LIFETIME_CAP,
                "DLQ message abandoned: lifetime retry cap exceeded"
            );
            self.abandoned.fetch_add(1, Ordering::Relaxed);
            entry.status = DlqStatus::Abandoned;
            self.store.record(entry);
            let _ = self.consumer.commit(&message).await;
            return;
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = self.sleeper.sleep(self.config.cooldown) => {}
        }

        let record = ProducerRecord::new(ORDER_CREATED_TOPIC, entry.key.clone(), entry.value.clone())
            .with_header("retry_count", entry.metadata.retry_count.to_string())
            .with_header("replayed_from_dlq", "true")
            .with_header("replay_time", Utc::now().to_rfc3339());

        match self.producer.send(record).await {
            Ok(()) => {
                self.replayed.fetch_add(1, Ordering::Relaxed);
                entry.status = DlqStatus::Replayed;
                self.store.record(entry);
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to republish DLQ message to main topic");
                self.abandoned.fetch_add(1, Ordering::Relaxed);
                entry.status = DlqStatus::Abandoned;
                self.store.record(entry);
            }
        }

        let _ = self.consumer.commit(&message).await;
    }
}
