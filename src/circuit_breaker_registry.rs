//! Process-wide registry of named circuit breakers.
//!
//! `get_or_create` is idempotent per name: the configuration passed on the
//! first call for a given name wins, and concurrent callers racing on the
//! same name observe the same breaker instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerPolicy};

#[derive(Default, Clone)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, CircuitBreakerPolicy>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the breaker registered under `config.name`, creating it with
    /// `config` if absent. If a breaker is already registered under that
    /// name, `config` is ignored and the existing instance is returned.
    pub fn get_or_create(&self, config: CircuitBreakerConfig) -> CircuitBreakerPolicy {
        let mut map = self.inner.lock().unwrap();
        map.entry(config.name.clone()).or_insert_with(|| CircuitBreakerPolicy::new(config)).clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreakerPolicy> {
        self.inner.lock().unwrap().get(name).cloned()
    }

    /// Reset a single registered breaker. Returns `false` if `name` is unregistered.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(cb) => {
                cb.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        let map = self.inner.lock().unwrap();
        for cb in map.values() {
            cb.reset();
        }
    }

    /// Metrics snapshot for every registered breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<CircuitBreakerMetrics> {
        let map = self.inner.lock().unwrap();
        let mut entries: Vec<_> = map.values().map(|cb| cb.metrics()).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub async fn shutdown_all(&self) {
        let breakers: Vec<_> = self.inner.lock().unwrap().values().cloned().collect();
        for cb in breakers {
            cb.shutdown().await;
        }
    }
}
