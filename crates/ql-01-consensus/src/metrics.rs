//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring the ordering engine.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! ql-01-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_requests_committed_total` - Requests delivered in order
//! - `consensus_byzantine_evidence_total` - Protocol violations (by kind)
//! - `consensus_view_changes_total` - View changes started
//! - `consensus_commit_latency_seconds` - PrePrepare acceptance to commit

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Requests delivered to the block builder
    pub static ref REQUESTS_COMMITTED: IntCounter = register_int_counter!(
        "consensus_requests_committed_total",
        "Total number of requests committed and delivered in order"
    )
    .expect("Failed to create REQUESTS_COMMITTED metric");

    /// Byzantine evidence, labeled by kind
    pub static ref BYZANTINE_EVIDENCE: CounterVec = register_counter_vec!(
        "consensus_byzantine_evidence_total",
        "Total number of protocol violations observed",
        &["kind"]
    )
    .expect("Failed to create BYZANTINE_EVIDENCE metric");

    /// View changes started by this replica
    pub static ref VIEW_CHANGES: IntCounter = register_int_counter!(
        "consensus_view_changes_total",
        "Total number of view changes started"
    )
    .expect("Failed to create VIEW_CHANGES metric");

    /// Histogram of commit latency
    pub static ref COMMIT_LATENCY: Histogram = register_histogram!(
        "consensus_commit_latency_seconds",
        "Time from PrePrepare acceptance to commit in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to create COMMIT_LATENCY metric");
}

/// Record a request delivered in order
#[cfg(feature = "metrics")]
pub fn record_committed() {
    REQUESTS_COMMITTED.inc();
}

/// Record observed evidence
#[cfg(feature = "metrics")]
pub fn record_evidence(kind: &str) {
    BYZANTINE_EVIDENCE.with_label_values(&[kind]).inc();
}

/// Record a view change started locally
#[cfg(feature = "metrics")]
pub fn record_view_change() {
    VIEW_CHANGES.inc();
}

/// Record commit latency
#[cfg(feature = "metrics")]
pub fn record_commit_latency(seconds: f64) {
    COMMIT_LATENCY.observe(seconds);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_committed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_evidence(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_view_change() {}

#[cfg(not(feature = "metrics"))]
pub fn record_commit_latency(_seconds: f64) {}
