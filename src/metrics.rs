// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for client-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `client_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `view`: by_city, map
//! - `outcome`: fresh, applied, stale, superseded, error
//! - `op`: create, move, refresh, remove

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::dataset::ViewKind;
use crate::index::MarkerDiff;

// ═══════════════════════════════════════════════════════════════════════════
// SYNC SEQUENCES
// ═══════════════════════════════════════════════════════════════════════════

/// Record how a sync sequence ended
pub fn record_sequence(view: ViewKind, kind: &str, outcome: &str) {
    counter!(
        "client_sync_sequences_total",
        "view" => view.to_string(),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record sequence latency
pub fn record_sequence_latency(view: ViewKind, kind: &str, duration: Duration) {
    histogram!(
        "client_sync_sequence_seconds",
        "view" => view.to_string(),
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a phase transition
pub fn record_phase(phase: &str) {
    counter!(
        "client_sync_phase_transitions_total",
        "phase" => phase.to_string()
    )
    .increment(1);
}

/// Record a result dropped because a newer sequence started
pub fn record_superseded(view: ViewKind) {
    counter!(
        "client_sync_superseded_total",
        "view" => view.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Set current record count for a view
pub fn set_records(view: ViewKind, count: usize) {
    gauge!(
        "client_sync_records",
        "view" => view.to_string()
    )
    .set(count as f64);
}

/// Record applied upserts
pub fn record_upserts(view: ViewKind, count: usize) {
    counter!(
        "client_sync_upserts_total",
        "view" => view.to_string()
    )
    .increment(count as u64);
}

/// Record a prune attempt; `refused` carries the reason when the guard fired
pub fn record_prune(view: ViewKind, removed: usize, refused: Option<&str>) {
    match refused {
        Some(reason) => counter!(
            "client_sync_prune_refused_total",
            "view" => view.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1),
        None => counter!(
            "client_sync_pruned_records_total",
            "view" => view.to_string()
        )
        .increment(removed as u64),
    }
}

/// Record an address correction
pub fn record_correction(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "client_sync_corrections_total",
        "status" => status
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// MARKERS
// ═══════════════════════════════════════════════════════════════════════════

/// Record the mutations of one marker reconcile
pub fn record_marker_diff(diff: &MarkerDiff) {
    for (op, count) in [
        ("create", diff.creates()),
        ("move", diff.moves()),
        ("refresh", diff.refreshes()),
        ("remove", diff.removes()),
    ] {
        if count > 0 {
            counter!("client_sync_marker_ops_total", "op" => op).increment(count as u64);
        }
    }
}

/// Set marker and unmapped counts
pub fn set_marker_stats(markers: usize, unmapped: usize) {
    gauge!("client_sync_markers").set(markers as f64);
    gauge!("client_sync_unmapped_records").set(unmapped as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(boundary: &str, operation: &str, error_type: &str) {
    counter!(
        "client_sync_errors_total",
        "boundary" => boundary.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// A timing guard that records sequence latency on drop
pub struct SequenceTimer {
    view: ViewKind,
    kind: &'static str,
    start: Instant,
}

impl SequenceTimer {
    pub fn new(view: ViewKind, kind: &'static str) -> Self {
        Self {
            view,
            kind,
            start: Instant::now(),
        }
    }
}

impl Drop for SequenceTimer {
    fn drop(&mut self) {
        record_sequence_latency(self.view, self.kind, self.start.elapsed());
    }
}
