//! Prometheus metrics for the store protocols.
//!
//! All metrics follow the naming convention: `node_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., reservations_total)
//! - **Gauge**: Value that can go up or down (e.g., reserved_bytes)

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // RESERVATION METRICS
    // =========================================================================

    /// Reservation decisions by outcome
    pub static ref RESERVATIONS: CounterVec = CounterVec::new(
        Opts::new("node_reservations_total", "Reservation requests by outcome"),
        &["outcome"]  // outcome: accepted/insufficient_space/too_many_reservations/store_overloaded/range_already_reserved
    ).expect("metric creation failed");

    /// Reservations released by expiry
    pub static ref RESERVATIONS_EXPIRED: Counter = Counter::new(
        "node_reservations_expired_total",
        "Reservations released because no replica arrived before the deadline"
    ).expect("metric creation failed");

    /// Bytes held by outstanding reservations across all stores
    pub static ref RESERVED_BYTES: Gauge = Gauge::new(
        "node_reserved_bytes",
        "Bytes held by outstanding reservations"
    ).expect("metric creation failed");

    // =========================================================================
    // CONSISTENCY METRICS
    // =========================================================================

    /// Checksum disagreements detected by this node
    pub static ref CHECKSUM_MISMATCHES: Counter = Counter::new(
        "node_checksum_mismatches_total",
        "Consistency checks where the local checksum disagreed with the requester"
    ).expect("metric creation failed");

    // =========================================================================
    // DISPATCH AND FREEZE METRICS
    // =========================================================================

    /// Requests addressed to another node
    pub static ref MISROUTED_REQUESTS: Counter = Counter::new(
        "node_misrouted_requests_total",
        "Store-addressed requests rejected because they named another node"
    ).expect("metric creation failed");

    /// Frozen replicas seen by the last freeze poll, per store
    pub static ref FROZEN_REPLICAS: GaugeVec = GaugeVec::new(
        Opts::new("node_frozen_replicas", "Replicas reported frozen by the most recent freeze poll"),
        &["store_id"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless; already registered collectors are
/// skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Reservations
        Box::new(RESERVATIONS.clone()),
        Box::new(RESERVATIONS_EXPIRED.clone()),
        Box::new(RESERVED_BYTES.clone()),
        // Consistency
        Box::new(CHECKSUM_MISMATCHES.clone()),
        // Dispatch and freeze
        Box::new(MISROUTED_REQUESTS.clone()),
        Box::new(FROZEN_REPLICAS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
