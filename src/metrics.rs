// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the provenance registry.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The embedding
//! process installs the exporter (Prometheus, OTEL, etc.); without one every
//! call here is a no-op.
//!
//! # Metric Naming Convention
//! - `provenance_registry_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `status`: success, failure, issued, not_found, error
//! - `backend`: sql, redis
//! - `route`: HTTP route template

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::registry::{RebuildReport, RegistryState};

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY - lifecycle and rebuilds
// ═══════════════════════════════════════════════════════════════════════════

/// Registry state as a gauge (0 = Created, 1 = Loading, 2 = Ready, 3 = Rebuilding)
/// plus a transition counter.
pub fn set_registry_state(state: RegistryState) {
    let level = match state {
        RegistryState::Created => 0,
        RegistryState::Loading => 1,
        RegistryState::Ready => 2,
        RegistryState::Rebuilding => 3,
    };
    gauge!("provenance_registry_state").set(level as f64);
    counter!(
        "provenance_registry_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record a completed rebuild
pub fn record_rebuild(status: &str, report: &RebuildReport) {
    counter!(
        "provenance_registry_rebuilds_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("provenance_registry_rebuild_seconds").record(report.elapsed.as_secs_f64());
    gauge!("provenance_registry_tree_depth").set(report.depth as f64);
    set_leaf_count(report.leaf_count);

    if report.changed {
        counter!("provenance_registry_roots_published_total").increment(1);
    }
}

/// Record a rebuild that published nothing
pub fn record_rebuild_failure() {
    counter!(
        "provenance_registry_rebuilds_total",
        "status" => "failure"
    )
    .increment(1);
}

/// Leaves in the served tree
pub fn set_leaf_count(count: usize) {
    gauge!("provenance_registry_leaves").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// PROOFS
// ═══════════════════════════════════════════════════════════════════════════

/// Record a proof request outcome (issued, not_found, error)
pub fn record_proof_request(status: &str) {
    counter!(
        "provenance_registry_proof_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a proof verification
pub fn record_verification(verified: bool) {
    let status = if verified { "verified" } else { "rejected" };
    counter!(
        "provenance_registry_verifications_total",
        "status" => status
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// BACKENDS
// ═══════════════════════════════════════════════════════════════════════════

/// Record a connection failure to a backend
pub fn record_connection_error(backend: &str) {
    counter!(
        "provenance_registry_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// HTTP
// ═══════════════════════════════════════════════════════════════════════════

/// Record an HTTP response
pub fn record_http_request(route: &str, status: u16) {
    counter!(
        "provenance_registry_http_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP handler latency
pub fn record_http_latency(route: &str, duration: Duration) {
    histogram!(
        "provenance_registry_http_request_seconds",
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records handler latency on drop
pub struct LatencyTimer {
    route: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(route: &'static str) -> Self {
        Self {
            route,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_http_latency(self.route, self.start.elapsed());
    }
}
