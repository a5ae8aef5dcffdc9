//! Lightweight in-memory metrics for table-data fetches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;
use studio_core::EngineError;

#[derive(Default)]
struct FetchMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    rows_returned: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static FETCH_METRICS: OnceLock<FetchMetrics> = OnceLock::new();

fn metrics() -> &'static FetchMetrics {
    FETCH_METRICS.get_or_init(FetchMetrics::default)
}

/// Records a completed fetch that returned `rows` rows
pub fn record_fetch(duration_ms: f64, rows: usize) {
    let metrics = metrics();
    metrics.total.fetch_add(1, Ordering::Relaxed);
    metrics
        .rows_returned
        .fetch_add(rows as u64, Ordering::Relaxed);
    record_duration(metrics, duration_ms);
}

/// Records a fetch that ended with `error`.
///
/// Client errors count as rejected, connection-level failures as
/// unavailable; both also count as failed.
pub fn record_failure(duration_ms: f64, error: &EngineError) {
    let metrics = metrics();
    metrics.total.fetch_add(1, Ordering::Relaxed);
    metrics.failed.fetch_add(1, Ordering::Relaxed);
    if error.is_client_error() {
        metrics.rejected.fetch_add(1, Ordering::Relaxed);
    }
    if matches!(error, EngineError::DatabaseUnavailable { .. }) {
        metrics.unavailable.fetch_add(1, Ordering::Relaxed);
    }
    record_duration(metrics, duration_ms);
}

fn record_duration(metrics: &FetchMetrics, duration_ms: f64) {
    let duration_ms = duration_ms.max(0.0) as u64;
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);

    let mut current = metrics.duration_max_ms.load(Ordering::Relaxed);
    while duration_ms > current {
        match metrics.duration_max_ms.compare_exchange(
            current,
            duration_ms,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(next) => current = next,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMetricsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub rows_returned: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> FetchMetricsSnapshot {
    let metrics = metrics();
    let total = metrics.total.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    let avg_ms = if total > 0 {
        Some(duration_total as f64 / total as f64)
    } else {
        None
    };

    FetchMetricsSnapshot {
        total,
        failed: metrics.failed.load(Ordering::Relaxed),
        rejected: metrics.rejected.load(Ordering::Relaxed),
        unavailable: metrics.unavailable.load(Ordering::Relaxed),
        rows_returned: metrics.rows_returned.load(Ordering::Relaxed),
        avg_ms,
        max_ms: if max_ms > 0 { Some(max_ms) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_flow() {
        // Other tests record concurrently, so only assert on lower bounds.
        let initial = snapshot();

        record_fetch(12.0, 50);
        let s1 = snapshot();
        assert!(s1.total > initial.total);
        assert!(s1.rows_returned >= initial.rows_returned + 50);

        record_failure(3.0, &EngineError::unknown_column("nope"));
        let s2 = snapshot();
        assert!(s2.failed > initial.failed);
        assert!(s2.rejected > initial.rejected);

        record_failure(1.0, &EngineError::unavailable("connection refused"));
        let s3 = snapshot();
        assert!(s3.unavailable > initial.unavailable);

        record_fetch(99999.0, 0);
        assert!(snapshot().max_ms.unwrap() >= 99999);
    }
}
