//! Analytics aggregator (PRD-44).
//!
//! Thin read-side wrapper: loads cost records through the [`CostStore`] seam
//! and folds them with the pure aggregation in `fabula_core::analytics`.
//! Results are approximate-as-of-read-time; a store failure degrades to the
//! all-zero rollup so dashboards never special-case missing data.

use std::sync::Arc;

use fabula_core::analytics::{aggregate, TimeRange, UsageRollup};
use fabula_core::store::CostStore;
use fabula_core::types::DbId;

/// Rolls up hit/miss counts, tokens saved, and cost saved over time windows.
pub struct AnalyticsAggregator {
    store: Arc<dyn CostStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn CostStore>) -> Self {
        Self { store }
    }

    /// Aggregate usage for one user, or system-wide when `user_id` is
    /// `None` (privileged).
    pub async fn rollup(&self, user_id: Option<DbId>, range: TimeRange) -> UsageRollup {
        match self.store.records_in_range(user_id, range).await {
            Ok(records) => aggregate(&records, range),
            Err(e) => {
                tracing::warn!(error = %e, "Cost record read failed -- returning empty rollup");
                UsageRollup::zero()
            }
        }
    }
}
