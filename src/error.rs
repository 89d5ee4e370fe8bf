//! Error types for resilience policies and domain operations.

use std::fmt;
use std::time::Duration;

/// Cap the number of stored failures inside RetryExhausted to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Unified error type for all resilience policies (breaker, retry, timeout).
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The operation exceeded the timeout duration
    Timeout { elapsed: Duration, timeout: Duration },
    /// The circuit breaker is open
    CircuitOpen { failure_count: usize, open_duration: Duration },
    /// The call was cancelled before or during execution.
    ///
    /// Never counted as a success or a failure at any admission layer — this
    /// is what keeps `total_requests == total_successes + total_failures`
    /// holding through cancellation.
    Cancelled,
    /// The operation panicked. Counted as a failure by the circuit breaker;
    /// the original panic is not resumed, only its message is captured.
    Panicked(String),
    /// All retry attempts were exhausted
    RetryExhausted { attempts: usize, failures: Vec<E> },
    /// The underlying operation failed
    Inner(E),
}

impl<E: Clone> Clone for ResilienceError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Timeout { elapsed, timeout } => Self::Timeout { elapsed: *elapsed, timeout: *timeout },
            Self::CircuitOpen { failure_count, open_duration } => {
                Self::CircuitOpen { failure_count: *failure_count, open_duration: *open_duration }
            }
            Self::Cancelled => Self::Cancelled,
            Self::Panicked(msg) => Self::Panicked(msg.clone()),
            Self::RetryExhausted { attempts, failures } => {
                Self::RetryExhausted { attempts: *attempts, failures: failures.clone() }
            }
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for ResilienceError<E> {
    fn eq(&self, other: &Self) -> bool {
        use ResilienceError::*;
        match (self, other) {
            (Timeout { elapsed: a1, timeout: b1 }, Timeout { elapsed: a2, timeout: b2 }) => a1 == a2 && b1 == b2,
            (
                CircuitOpen { failure_count: f1, open_duration: d1 },
                CircuitOpen { failure_count: f2, open_duration: d2 },
            ) => f1 == f2 && d1 == d2,
            (Cancelled, Cancelled) => true,
            (Panicked(a), Panicked(b)) => a == b,
            (
                RetryExhausted { attempts: a1, failures: f1 },
                RetryExhausted { attempts: a2, failures: f2 },
            ) => a1 == a2 && f1 == f2,
            (Inner(e1), Inner(e2)) => e1 == e2,
            _ => false,
        }
    }
}

impl<E: Eq> Eq for ResilienceError<E> {}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::CircuitOpen { failure_count, open_duration } => {
                write!(f, "circuit breaker open ({} failures, open for {:?})", failure_count, open_duration)
            }
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Panicked(msg) => write!(f, "operation panicked: {}", msg),
            Self::RetryExhausted { attempts, failures } => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                write!(
                    f,
                    "retry exhausted after {} attempts ({} failures), last error: {}",
                    attempts,
                    failures.len(),
                    last
                )
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::RetryExhausted { failures, .. } => failures.last().map(|e| e as &dyn std::error::Error),
            _ => None,
        }
    }
}

impl<E> ResilienceError<E> {
    /// Check if this error is due to timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is due to circuit breaker
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error is due to cancellation (never counted as success/failure)
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is due to the operation panicking
    pub fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Check if this error is due to retry exhaustion
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Access all recorded failures for RetryExhausted, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Mutably borrow the inner error if present.
    pub fn as_inner_mut(&mut self) -> Option<&mut E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors from the order store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),
    #[error("order {0} already exists")]
    Duplicate(String),
    #[error("transactional write failed: {0}")]
    TransactionFailed(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from publishing an `order.created` event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(String),
    #[error("broker rejected publish after retries: {0}")]
    Broker(String),
}

/// Errors surfaced while decoding/dispatching a consumed message.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("failed to decode message payload: {0}")]
    Decode(String),
    #[error("handler failed: {0}")]
    Handler(String),
}

/// Errors from the intake coordinator.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("legacy write failed: {0}")]
    Legacy(String),
}

/// Errors from the comparison engine.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("failed to load orders for comparison: {0}")]
    Load(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for DummyError {}

    #[test]
    fn timeout_error_display() {
        let err: ResilienceError<io::Error> =
            ResilienceError::Timeout { elapsed: Duration::from_millis(5100), timeout: Duration::from_secs(5) };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn cancelled_is_not_timeout_or_circuit_open() {
        let err: ResilienceError<DummyError> = ResilienceError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert!(!err.is_circuit_open());
    }

    #[test]
    fn retry_exhausted_display_includes_last_error() {
        let err: ResilienceError<DummyError> =
            ResilienceError::RetryExhausted { attempts: 3, failures: vec![DummyError("first"), DummyError("last")] };
        let msg = format!("{}", err);
        assert!(msg.contains('3'));
        assert!(msg.contains("last"));
    }

    #[test]
    fn source_returns_last_failure_for_retry_exhausted() {
        let err: ResilienceError<DummyError> =
            ResilienceError::RetryExhausted { attempts: 3, failures: vec![DummyError("a"), DummyError("b")] };
        assert_eq!(err.source().unwrap().to_string(), "b");
    }

    #[test]
    fn predicates_cover_all_variants() {
        let timeout: ResilienceError<DummyError> =
            ResilienceError::Timeout { elapsed: Duration::from_secs(1), timeout: Duration::from_secs(2) };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_circuit_open());

        let circuit: ResilienceError<DummyError> =
            ResilienceError::CircuitOpen { failure_count: 1, open_duration: Duration::from_secs(1) };
        assert!(circuit.is_circuit_open());
    }

    #[test]
    fn store_error_messages() {
        let e = StoreError::NotFound("O1".into());
        assert_eq!(e.to_string(), "order O1 not found");
    }

    #[test]
    fn coordinator_error_wraps_store_error() {
        let e: CoordinatorError = StoreError::Duplicate("O1".into()).into();
        assert!(matches!(e, CoordinatorError::Store(StoreError::Duplicate(_))));
    }
}
