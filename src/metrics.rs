//! Prometheus metrics registry and instruments.
//!
//! This module is layer-agnostic and can be used from any component.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_cache_hits_total", "Total number of cache hits"),
        &["resource"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_cache_misses_total", "Total number of cache misses"),
        &["resource"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("groombook_cache_size", "Current number of items in cache"),
        &["resource"]
    ).expect("metric can be created");

    // Remote Gateway Metrics
    pub static ref REMOTE_READS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_remote_reads_total", "Total number of remote reads"),
        &["resource", "outcome"]
    ).expect("metric can be created");
    pub static ref REMOTE_WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_remote_writes_total", "Total number of remote writes"),
        &["resource", "outcome"]
    ).expect("metric can be created");

    // Submission Metrics
    pub static ref BOOKINGS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "groombook_bookings_created_total",
        "Total number of bookings created"
    ).expect("metric can be created");
    pub static ref DUPLICATES_BLOCKED_TOTAL: IntCounter = IntCounter::new(
        "groombook_duplicates_blocked_total",
        "Total number of booking submissions blocked as duplicates"
    ).expect("metric can be created");
    pub static ref AMBIGUOUS_COMMITS_RECONCILED_TOTAL: IntCounter = IntCounter::new(
        "groombook_ambiguous_commits_reconciled_total",
        "Ambiguous transaction outcomes resolved as actual commits"
    ).expect("metric can be created");

    // Local Store Metrics
    pub static ref LOCAL_STORE_EVICTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_local_store_evictions_total", "Emergency evictions by key"),
        &["key"]
    ).expect("metric can be created");
    pub static ref JANITOR_PRUNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_janitor_pruned_total", "Records pruned by the janitor"),
        &["category"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("groombook_errors_total", "Total number of errors"),
        &["error_type", "operation"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_SIZE.clone()))
        .expect("CACHE_SIZE can be registered");
    REGISTRY
        .register(Box::new(REMOTE_READS_TOTAL.clone()))
        .expect("REMOTE_READS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REMOTE_WRITES_TOTAL.clone()))
        .expect("REMOTE_WRITES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(BOOKINGS_CREATED_TOTAL.clone()))
        .expect("BOOKINGS_CREATED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(DUPLICATES_BLOCKED_TOTAL.clone()))
        .expect("DUPLICATES_BLOCKED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(AMBIGUOUS_COMMITS_RECONCILED_TOTAL.clone()))
        .expect("AMBIGUOUS_COMMITS_RECONCILED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(LOCAL_STORE_EVICTIONS_TOTAL.clone()))
        .expect("LOCAL_STORE_EVICTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(JANITOR_PRUNED_TOTAL.clone()))
        .expect("JANITOR_PRUNED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
