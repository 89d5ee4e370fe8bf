//! Operator-tunable configuration loaded from the environment. Out-of-range
//! values are clamped with a warning rather than rejected, mirroring the
//! circuit breaker's own clamp-on-construct behavior.

use std::time::Duration;

use crate::circuit_breaker::{MAX_MAX_FAILURES, MAX_MAX_REQUESTS, MAX_TIMEOUT, MIN_MAX_FAILURES, MIN_MAX_REQUESTS, MIN_TIMEOUT};

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn clamp_usize(value: usize, min: usize, max: usize, key: &str) -> usize {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(key, value, clamped, "config value out of range, clamped");
    }
    clamped
}

fn clamp_duration(value: Duration, min: Duration, max: Duration, key: &str) -> Duration {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!(key, value = ?value, clamped = ?clamped, "config value out of range, clamped");
    }
    clamped
}

/// Breaker tunables for one named dependency (currently only the legacy
/// HTTP client, but the shape generalizes to any future breaker).
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub max_failures: usize,
    pub timeout: Duration,
    pub max_requests: usize,
}

impl BreakerSettings {
    pub fn from_env(prefix: &str) -> Self {
        let max_failures = clamp_usize(
            env_usize(&format!("{prefix}_MAX_FAILURES"), 5),
            MIN_MAX_FAILURES,
            MAX_MAX_FAILURES,
            "max_failures",
        );
        let timeout = clamp_duration(
            Duration::from_millis(env_u64(&format!("{prefix}_TIMEOUT_MS"), 30_000)),
            MIN_TIMEOUT,
            MAX_TIMEOUT,
            "timeout",
        );
        let max_requests = clamp_usize(
            env_usize(&format!("{prefix}_MAX_REQUESTS"), 1),
            MIN_MAX_REQUESTS,
            MAX_MAX_REQUESTS,
            "max_requests",
        );
        Self { max_failures, timeout, max_requests }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker_addresses: Vec<String>,
    pub consumer_group_id: String,
    pub dlq_consumer_group_id: String,
    pub legacy_http_timeout: Duration,
    pub legacy_breaker: BreakerSettings,
    pub dlq_replay_cooldown: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let legacy_breaker = BreakerSettings::from_env("LEGACY_BREAKER");
        let legacy_http_timeout = Duration::from_millis(env_u64("LEGACY_HTTP_TIMEOUT_MS", 25_000));
        if legacy_http_timeout >= legacy_breaker.timeout {
            tracing::warn!(
                http_timeout_ms = legacy_http_timeout.as_millis() as u64,
                breaker_timeout_ms = legacy_breaker.timeout.as_millis() as u64,
                "legacy HTTP timeout should be strictly less than the paired breaker timeout"
            );
        }
        Self {
            broker_addresses: env_string("BROKER_ADDRESSES", "localhost:9092").split(',').map(str::to_string).collect(),
            consumer_group_id: env_string("CONSUMER_GROUP_ID", "sap-consumer-group"),
            dlq_consumer_group_id: env_string("DLQ_CONSUMER_GROUP_ID", "sap-dlq-consumer-group"),
            legacy_http_timeout,
            legacy_breaker,
            dlq_replay_cooldown: Duration::from_secs(env_u64("DLQ_REPLAY_COOLDOWN_SECS", 30)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker_addresses: vec!["localhost:9092".to_string()],
            consumer_group_id: "sap-consumer-group".to_string(),
            dlq_consumer_group_id: "sap-dlq-consumer-group".to_string(),
            legacy_http_timeout: Duration::from_millis(25_000),
            legacy_breaker: BreakerSettings { max_failures: 5, timeout: Duration::from_secs(30), max_requests: 1 },
            dlq_replay_cooldown: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.broker_addresses, vec!["localhost:9092".to_string()]);
        assert!(config.legacy_http_timeout < config.legacy_breaker.timeout);
    }

    #[test]
    fn breaker_settings_clamp_out_of_range_values() {
        // SAFETY: test-only, single-threaded access to process env via a
        // serial test; no concurrent env mutation in this crate's test suite.
        std::env::set_var("TESTCLAMP_MAX_FAILURES", "0");
        std::env::set_var("TESTCLAMP_TIMEOUT_MS", "1");
        std::env::set_var("TESTCLAMP_MAX_REQUESTS", "0");
        let settings = BreakerSettings::from_env("TESTCLAMP");
        assert_eq!(settings.max_failures, MIN_MAX_FAILURES);
        assert_eq!(settings.timeout, MIN_TIMEOUT);
        assert_eq!(settings.max_requests, MIN_MAX_REQUESTS);
        std::env::remove_var("TESTCLAMP_MAX_FAILURES");
        std::env::remove_var("TESTCLAMP_TIMEOUT_MS");
        std::env::remove_var("TESTCLAMP_MAX_REQUESTS");
    }
}
