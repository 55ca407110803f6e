use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::metrics::Metrics;
use super::retry::IsTransient;

// ============================================================================
// Circuit Breaker Pattern Implementation
// ============================================================================
//
// Stops calling the payment gateway while it is unhealthy so checkout fails
// fast instead of stacking up timeouts.
//
// States:
// - Closed: Normal operation, requests pass through
// - Open: Too many failures, requests blocked immediately
// - HalfOpen: Testing if service recovered, limited requests allowed
//
// Only transient errors count as failures: a 4xx means the gateway is up.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,     // Normal operation
    Open,       // Blocking requests
    HalfOpen,   // Testing recovery
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    fn gauge_value(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<CircuitBreakerState>>,
    config: CircuitBreakerConfig,
    metrics: Option<Arc<Metrics>>,
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening circuit
    pub failure_threshold: u32,
    /// Time to wait before attempting recovery
    pub timeout: Duration,
    /// Number of successes needed to close circuit from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            })),
            config,
            metrics: None,
        }
    }

    /// Report state and transitions to Prometheus.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.update_circuit_breaker_state(CircuitState::Closed.gauge_value());
        self.metrics = Some(metrics);
        self
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: IsTransient,
    {
        // Check if circuit allows the call
        {
            let mut state = self.state.lock().await;

            match state.state {
                CircuitState::Open => {
                    let recovered = state
                        .last_failure_time
                        .map_or(true, |t| t.elapsed() >= self.config.timeout);
                    if !recovered {
                        return Err(CircuitBreakerError::CircuitOpen);
                    }
                    self.transition(&mut state, CircuitState::HalfOpen);
                    state.success_count = 0;
                }
                CircuitState::HalfOpen | CircuitState::Closed => {
                    // Allow the call
                }
            }
        }

        // Execute the operation
        match operation.await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(err) if err.is_transient() => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(err) => {
                self.record_success().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        let from = state.state;
        if from == to {
            return;
        }
        tracing::info!(from = from.as_str(), to = to.as_str(), "Circuit breaker transition");
        state.state = to;
        if let Some(metrics) = &self.metrics {
            metrics.record_circuit_breaker_transition(from.as_str(), to.as_str());
            metrics.update_circuit_breaker_state(to.gauge_value());
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.last_failure_time = None;
                }
            }
            CircuitState::Closed => {
                // Reset failure count on success
                state.failure_count = 0;
            }
            CircuitState::Open => {
                tracing::warn!("Success recorded while circuit is open");
            }
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;

        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(failures = state.failure_count, "Gateway circuit opening");
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Failure during half-open, reopening circuit");
                self.transition(&mut state, CircuitState::Open);
                state.success_count = 0;
            }
            CircuitState::Open => {
                // Already open, just update the time
            }
        }
    }

    #[cfg(test)]
    pub async fn get_state(&self) -> CircuitState {
        let state = self.state.lock().await;
        state.state
    }

    #[cfg(test)]
    pub async fn get_failure_count(&self) -> u32 {
        let state = self.state.lock().await;
        state.failure_count
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Failure(bool);

    impl IsTransient for Failure {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            timeout: Duration::from_secs(1),
            success_threshold: 2,
        };
        let metrics = Arc::new(Metrics::new().unwrap());
        let cb = CircuitBreaker::new(config).with_metrics(metrics.clone());

        // First 3 failures should open the circuit
        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>(Failure(true)) }).await;
            assert!(result.is_err());
        }

        assert_eq!(cb.get_state().await, CircuitState::Open);

        // Next call should fail immediately
        let result = cb.call(async { Ok::<_, Failure>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));

        let gathered = metrics.registry().gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }

    #[tokio::test]
    async fn test_permanent_errors_do_not_trip() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        };
        let cb = CircuitBreaker::new(config);

        for _ in 0..5 {
            let result = cb.call(async { Err::<(), _>(Failure(false)) }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
        }

        assert_eq!(cb.get_state().await, CircuitState::Closed);
        assert_eq!(cb.get_failure_count().await, 0);
    }

    #[tokio::test]
    async fn test_circuit_breaker_half_open_after_timeout() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            timeout: Duration::from_millis(100),
            success_threshold: 1,
        };
        let cb = CircuitBreaker::new(config);

        // Open the circuit
        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>(Failure(true)) }).await;
        }

        assert_eq!(cb.get_state().await, CircuitState::Open);

        // Wait for timeout
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Should transition to half-open and allow the call
        let result = cb.call(async { Ok::<_, Failure>(()) }).await;
        assert!(result.is_ok());

        // After success threshold, should be closed
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }
}
