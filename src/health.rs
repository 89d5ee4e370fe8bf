//! Read-only health/readiness surface: a breaker registry snapshot plus
//! consumer/DLQ metrics, serializable directly by an HTTP layer without
//! this crate building the HTTP layer itself (SPEC_FULL.md supplemented
//! features).

use serde::Serialize;

use crate::circuit_breaker::CircuitBreakerMetrics;
use crate::consumer::ConsumerMetricsSnapshot;
use crate::replayer::ReplayerMetrics;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub breakers: Vec<CircuitBreakerMetrics>,
    pub consumer: ConsumerMetricsSnapshot,
    pub replayer: ReplayerMetrics,
    pub dlq_depth: usize,
    pub store_reachable: bool,
}

impl HealthSnapshot {
    /// A deployment is healthy if the store is reachable and no breaker is
    /// open; `HalfOpen` is treated as healthy (it is actively probing
    /// recovery, not failing).
    pub fn is_healthy(&self) -> bool {
        self.store_reachable && self.breakers.iter().all(|b| b.state != "open")
    }
}
