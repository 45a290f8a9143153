//! Telemetry metric name constants.
//!
//! Centralised metric names for ontomap operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `ontomap_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `service`: terminology service name (e.g. "bioportal", "ols")
//! - `status`: "ok" or "error"
//! - `to`: circuit state after a transition ("closed", "open", "half_open")

/// Total search requests sent to a service (after cache misses).
///
/// Labels: `service`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "ontomap_requests_total";

/// Duration of one service call cycle (breaker + retries) in seconds.
///
/// Labels: `service`.
pub const REQUEST_DURATION_SECONDS: &str = "ontomap_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `service`.
pub const RETRIES_TOTAL: &str = "ontomap_retries_total";

/// Total cache hits.
///
/// Labels: `service`.
pub const CACHE_HITS_TOTAL: &str = "ontomap_cache_hits_total";

/// Total cache misses.
///
/// Labels: `service`.
pub const CACHE_MISSES_TOTAL: &str = "ontomap_cache_misses_total";

/// Total successful payloads written to the cache.
///
/// Labels: `service`.
pub const CACHE_SETS_TOTAL: &str = "ontomap_cache_sets_total";

/// Total entries evicted by the size bound.
pub const CACHE_EVICTIONS_TOTAL: &str = "ontomap_cache_evictions_total";

/// Total circuit breaker state transitions.
///
/// Labels: `service`, `to`.
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "ontomap_circuit_transitions_total";

/// Total calls rejected by an open circuit without reaching the service.
///
/// Labels: `service`.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "ontomap_circuit_rejections_total";

/// Total lookups that skipped or lost a service and returned partial results.
///
/// Labels: `service`.
pub const DEGRADED_LOOKUPS_TOTAL: &str = "ontomap_degraded_lookups_total";
