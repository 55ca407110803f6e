// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::{health_handler, metrics_handler};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - HTTP traffic (requests, latency)
// - Order lifecycle (placements, commands, events)
// - Payment gateway calls, retries and the circuit breaker
// - Webhook deliveries and uploads
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // HTTP Metrics
    pub http_requests: IntCounterVec,
    pub http_request_duration: HistogramVec,

    // Order Metrics
    pub orders_placed: IntCounterVec,
    pub order_commands: IntCounterVec,
    pub order_events: IntCounterVec,

    // Gateway Metrics
    pub gateway_requests: IntCounterVec,
    pub gateway_request_duration: HistogramVec,
    pub webhook_events: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,

    // Upload Metrics
    pub uploads: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // HTTP Metrics
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests handled"),
            &["method", "route", "status"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method", "route"],
        )?;
        registry.register(Box::new(http_request_duration.clone()))?;

        // Order Metrics
        let orders_placed = IntCounterVec::new(
            Opts::new("orders_placed_total", "Orders placed at checkout"),
            &["payment_method"],
        )?;
        registry.register(Box::new(orders_placed.clone()))?;

        let order_commands = IntCounterVec::new(
            Opts::new("order_commands_total", "Order commands handled"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(order_commands.clone()))?;

        let order_events = IntCounterVec::new(
            Opts::new("order_events_total", "Order events appended to the event log"),
            &["event_type"],
        )?;
        registry.register(Box::new(order_events.clone()))?;

        // Gateway Metrics
        let gateway_requests = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Payment gateway calls"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(gateway_requests.clone()))?;

        let gateway_request_duration = HistogramVec::new(
            HistogramOpts::new("gateway_request_duration_seconds", "Payment gateway call latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["operation"],
        )?;
        registry.register(Box::new(gateway_request_duration.clone()))?;

        let webhook_events = IntCounterVec::new(
            Opts::new("webhook_events_total", "Gateway webhook deliveries"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(webhook_events.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Total successful retries"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Total failed retries after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Gateway circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        // Upload Metrics
        let uploads = IntCounterVec::new(
            Opts::new("uploads_total", "Files accepted by the upload store"),
            &["kind"],
        )?;
        registry.register(Box::new(uploads.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_request_duration,
            orders_placed,
            order_commands,
            order_events,
            gateway_requests,
            gateway_request_duration,
            webhook_events,
            retry_attempts_total,
            retry_success,
            retry_failure,
            circuit_breaker_state,
            circuit_breaker_transitions,
            uploads,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        self.http_requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, route])
            .observe(duration_secs);
    }

    pub fn record_order_placed(&self, payment_method: &str) {
        self.orders_placed.with_label_values(&[payment_method]).inc();
        self.order_events.with_label_values(&["OrderPlaced"]).inc();
    }

    /// Outcome is one of "applied", "noop" or "rejected".
    pub fn record_order_command(&self, command: &str, outcome: &str) {
        self.order_commands.with_label_values(&[command, outcome]).inc();
    }

    pub fn record_order_event(&self, event_type: &str) {
        self.order_events.with_label_values(&[event_type]).inc();
    }

    pub fn record_gateway_call(&self, operation: &str, duration_secs: f64, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.gateway_requests.with_label_values(&[operation, outcome]).inc();
        self.gateway_request_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_webhook(&self, event_type: &str, outcome: &str) {
        self.webhook_events.with_label_values(&[event_type, outcome]).inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    /// Helper to record retry outcome
    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    /// Helper to update circuit breaker state
    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    /// Helper to record circuit breaker transition
    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions.with_label_values(&[from_state, to_state]).inc();
    }

    pub fn record_upload(&self, kind: &str) {
        self.uploads.with_label_values(&[kind]).inc();
    }
}
