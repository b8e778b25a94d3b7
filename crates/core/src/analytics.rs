//! Usage rollups over cost records (PRD-44).
//!
//! Pure read-side aggregation. Rollups are approximate-as-of-read-time by
//! design; loading the records is [`crate::store::CostStore`]'s job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pricing::CostRecord;
use crate::tiering::MatchTier;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Time range
// ---------------------------------------------------------------------------

/// Half-open UTC time window `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.start && at < self.end
    }
}

// ---------------------------------------------------------------------------
// Rollup
// ---------------------------------------------------------------------------

/// Aggregated cache and cost figures over a time window.
///
/// Every field is always present -- an empty window produces zeros and a
/// `by_tier` map with every tier at 0, so dashboards never special-case
/// missing data.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRollup {
    pub total_requests: i64,
    pub cache_hits: i64,
    /// `cache_hits / total_requests`; 0 for an empty window.
    pub hit_rate: f64,
    pub tokens_saved: i64,
    pub cost_saved: f64,
    /// Served-request count per tier label, all tiers always present.
    pub by_tier: BTreeMap<String, i64>,
}

impl UsageRollup {
    /// The all-zero rollup, with every tier key present.
    pub fn zero() -> Self {
        Self {
            total_requests: 0,
            cache_hits: 0,
            hit_rate: 0.0,
            tokens_saved: 0,
            cost_saved: 0.0,
            by_tier: MatchTier::ALL
                .into_iter()
                .map(|t| (t.as_str().to_string(), 0))
                .collect(),
        }
    }
}

/// Fold cost records into a rollup. Records outside `range` are skipped, so
/// callers may pass a superset (e.g. a whole month's records).
pub fn aggregate(records: &[CostRecord], range: TimeRange) -> UsageRollup {
    let mut rollup = UsageRollup::zero();
    for record in records {
        if !range.contains(record.created_at) {
            continue;
        }
        rollup.total_requests += 1;
        rollup.tokens_saved += record.tokens_saved;
        rollup.cost_saved += record.cost_saved;
        if let Some(tier) = record.served_tier {
            rollup.cache_hits += 1;
            *rollup.by_tier.entry(tier.as_str().to_string()).or_insert(0) += 1;
        }
    }
    if rollup.total_requests > 0 {
        rollup.hit_rate = rollup.cache_hits as f64 / rollup.total_requests as f64;
    }
    rollup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{CostBreakdown, Savings, TokenUsage};

    fn record(tier: Option<MatchTier>, tokens_saved: i64, cost_saved: f64) -> CostRecord {
        CostRecord::new(
            1,
            tier,
            "standard".to_string(),
            TokenUsage {
                input_tokens: 100,
                output_tokens: 200,
            },
            CostBreakdown {
                actual_cost: 0.01,
                charged_amount: 0.02,
            },
            Savings {
                tokens_saved,
                cost_saved,
            },
        )
    }

    fn wide_range() -> TimeRange {
        let now = chrono::Utc::now();
        TimeRange {
            start: now - chrono::Duration::hours(1),
            end: now + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn empty_window_is_all_zero_with_all_tiers() {
        let rollup = aggregate(&[], wide_range());
        assert_eq!(rollup.total_requests, 0);
        assert_eq!(rollup.cache_hits, 0);
        assert_eq!(rollup.hit_rate, 0.0);
        assert_eq!(rollup.tokens_saved, 0);
        assert_eq!(rollup.cost_saved, 0.0);
        assert_eq!(rollup.by_tier.len(), MatchTier::ALL.len());
        assert!(rollup.by_tier.values().all(|&n| n == 0));
    }

    #[test]
    fn mixed_hits_and_misses() {
        let records = vec![
            record(Some(MatchTier::Exact), 4_000, 0.05),
            record(None, 0, 0.0),
            record(Some(MatchTier::StructureSimilar), 1_500, 0.02),
            record(None, 0, 0.0),
        ];
        let rollup = aggregate(&records, wide_range());
        assert_eq!(rollup.total_requests, 4);
        assert_eq!(rollup.cache_hits, 2);
        assert!((rollup.hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(rollup.tokens_saved, 5_500);
        assert!((rollup.cost_saved - 0.07).abs() < 1e-9);
        assert_eq!(rollup.by_tier["exact"], 1);
        assert_eq!(rollup.by_tier["structure_similar"], 1);
        assert_eq!(rollup.by_tier["foundation_adapted"], 0);
    }

    #[test]
    fn records_outside_range_skipped() {
        let now = chrono::Utc::now();
        let range = TimeRange {
            start: now + chrono::Duration::hours(1),
            end: now + chrono::Duration::hours(2),
        };
        let rollup = aggregate(&[record(Some(MatchTier::Exact), 10, 0.01)], range);
        assert_eq!(rollup.total_requests, 0);
    }

    #[test]
    fn range_is_half_open() {
        let record = record(None, 0, 0.0);
        let range = TimeRange {
            start: record.created_at,
            end: record.created_at,
        };
        assert_eq!(aggregate(&[record], range).total_requests, 0);
    }
}
