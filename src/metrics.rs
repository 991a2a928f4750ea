//! Prometheus metrics for the review portal
//!
//! Defines metrics for:
//! - Storage operation counts and duration
//! - Metrics cache lookups by outcome
//! - Cache invalidations by reason

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Storage operation counter by operation and status
    pub static ref STORAGE_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("portal_storage_operations_total", "Total blob storage operations"),
        &["operation", "status"]
    )
    .expect("Failed to create STORAGE_OPERATIONS metric");

    /// Storage operation duration histogram
    pub static ref STORAGE_OPERATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "portal_storage_operation_duration_seconds",
            "Blob storage operation duration in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .expect("Failed to create STORAGE_OPERATION_DURATION metric");

    /// Cache lookups by outcome (hit, miss, coalesced)
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("portal_cache_lookups_total", "Metrics cache lookups"),
        &["outcome"]
    )
    .expect("Failed to create CACHE_LOOKUPS metric");

    /// Cache invalidations by reason
    pub static ref CACHE_INVALIDATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("portal_cache_invalidations_total", "Metrics cache invalidations"),
        &["reason"]
    )
    .expect("Failed to create CACHE_INVALIDATIONS metric");
}

/// Initialize metrics and register with the global registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(STORAGE_OPERATIONS.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CACHE_LOOKUPS.clone()))?;
    REGISTRY.register(Box::new(CACHE_INVALIDATIONS.clone()))?;
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
