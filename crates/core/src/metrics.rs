//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scanner (runs, per-candidate outcomes, durations)
//! - Library (entities added, asset downloads)
//! - Scrapers (per-slot provider failures)
//! - pHash index loads

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Scanner
// =============================================================================

/// Scanner runs by result.
pub static SCANS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_scans_total", "Total scanner runs"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Scan duration in seconds.
pub static SCAN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("trove_scan_duration_seconds", "Duration of a scanner run")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["scanner"],
    )
    .unwrap()
});

/// Scan candidates by outcome.
pub static SCAN_CANDIDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_scan_candidates_total", "Scan candidates processed"),
        &["outcome"], // "new", "skipped", "failed"
    )
    .unwrap()
});

// =============================================================================
// Library
// =============================================================================

/// Entities inserted, including linked entities created during an add.
pub static ENTITIES_ADDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_entities_added_total", "Entities inserted into the library"),
        &["content_type"],
    )
    .unwrap()
});

/// Asset downloads by outcome.
pub static ASSET_DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_asset_downloads_total", "Asset downloads"),
        &["outcome"], // "ok", "failed"
    )
    .unwrap()
});

// =============================================================================
// Scrapers
// =============================================================================

/// Provider failures recorded as slot failures.
pub static SLOT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("trove_slot_failures_total", "Provider failures per slot"),
        &["provider", "slot"],
    )
    .unwrap()
});

/// pHash index (re)loads from the library.
pub static PHASH_INDEX_LOADS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("trove_phash_index_loads_total", "pHash index loads").unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SCANS_TOTAL.clone()),
        Box::new(SCAN_DURATION.clone()),
        Box::new(SCAN_CANDIDATES.clone()),
        Box::new(ENTITIES_ADDED.clone()),
        Box::new(ASSET_DOWNLOADS.clone()),
        Box::new(SLOT_FAILURES.clone()),
        Box::new(PHASH_INDEX_LOADS.clone()),
    ]
}
