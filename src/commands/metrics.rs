//! Metrics command

use super::CommandResponse;
use crate::metrics::{self, FetchMetricsSnapshot};

/// Returns the current fetch metrics snapshot.
pub fn get_metrics() -> CommandResponse<FetchMetricsSnapshot> {
    CommandResponse::Ok(metrics::snapshot())
}
