//! Prometheus metrics for the delivery pipeline.
//!
//! Tracks message throughput, connection counts, and the outbox worker's
//! delivery health, exposed on a dedicated HTTP endpoint.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Counters (monotonic increasing)
    // ========================================================================

    /// Total messages persisted via the router, across HTTP and gateway entry points.
    pub static ref MESSAGES_CREATED: IntCounter = IntCounter::new(
        "im_messages_created_total",
        "Total messages persisted"
    ).unwrap();

    /// Total notification tasks published to `notify:<userId>` topics.
    pub static ref NOTIFICATIONS_DISPATCHED: IntCounter = IntCounter::new(
        "im_notifications_dispatched_total",
        "Total notification tasks published"
    ).unwrap();

    /// Total bearer token verification failures during the gateway handshake.
    pub static ref AUTH_FAILURES: IntCounter = IntCounter::new(
        "im_auth_failures_total",
        "Total rejected connection handshakes"
    ).unwrap();

    /// Total outbox rows reclaimed by the stuck-row scanner.
    pub static ref OUTBOX_STUCK_RECLAIMED: IntCounter = IntCounter::new(
        "im_outbox_stuck_reclaimed_total",
        "Total outbox rows reclaimed after a worker crash"
    ).unwrap();

    /// Total bot webhook deliveries that failed (timeout, connection error, or non-2xx).
    pub static ref WEBHOOK_FAILURES: IntCounter = IntCounter::new(
        "im_webhook_failures_total",
        "Total bot webhook deliveries that failed"
    ).unwrap();

    // ========================================================================
    // Gauges (can increase/decrease)
    // ========================================================================

    /// Currently connected sockets, summed across every local session.
    pub static ref CONNECTED_SESSIONS: IntGauge = IntGauge::new(
        "im_connected_sessions",
        "Currently connected sockets on this node"
    ).unwrap();

    /// Outbox rows still awaiting delivery.
    pub static ref OUTBOX_PENDING: IntGauge = IntGauge::new(
        "im_outbox_pending",
        "Outbox rows not yet marked completed"
    ).unwrap();
}

/// Initialize the Prometheus metrics registry. Must be called once at
/// startup before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(MESSAGES_CREATED.clone())).unwrap();
    REGISTRY.register(Box::new(NOTIFICATIONS_DISPATCHED.clone())).unwrap();
    REGISTRY.register(Box::new(AUTH_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(OUTBOX_STUCK_RECLAIMED.clone())).unwrap();
    REGISTRY.register(Box::new(WEBHOOK_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(CONNECTED_SESSIONS.clone())).unwrap();
    REGISTRY.register(Box::new(OUTBOX_PENDING.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
