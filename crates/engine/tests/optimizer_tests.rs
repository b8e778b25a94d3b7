//! End-to-end tests for the cache optimizer facade (PRD-40..44).
//!
//! Full lifecycle against the in-memory stores: miss, generate, commit,
//! re-lookup, accounting, budget flow-through, and rollups.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};

use fabula_core::analytics::TimeRange;
use fabula_core::budget::SubscriptionTier;
use fabula_core::pricing::TokenUsage;
use fabula_core::request::{ContentKind, GenerationRequest, MAX_PREMISE_CHARS};
use fabula_core::tiering::{MatchResult, MatchTier};
use fabula_core::types::DbId;
use fabula_engine::memory::MemoryStore;
use fabula_engine::optimizer::{CacheOptimizer, GenerationReceipt, OptimizerConfig};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const USER: DbId = 21;

fn optimizer() -> (Arc<MemoryStore>, CacheOptimizer) {
    let store = Arc::new(MemoryStore::new());
    let optimizer = CacheOptimizer::new(
        store.clone(),
        store.clone(),
        store.clone(),
        OptimizerConfig::default(),
    )
    .expect("default config valid");
    (store, optimizer)
}

fn request() -> GenerationRequest {
    GenerationRequest {
        kind: ContentKind::Foundation,
        genre: "Fantasy".to_string(),
        premise: "A thief steals time itself".to_string(),
        chapter_number: None,
        foundation_id: None,
        prior_context_hash: None,
    }
}

fn receipt(content: &str) -> GenerationReceipt {
    GenerationReceipt {
        content: content.to_string(),
        model_class: "standard".to_string(),
        usage: TokenUsage {
            input_tokens: 1_000,
            output_tokens: 4_000,
        },
    }
}

fn wide_range() -> TimeRange {
    let now = Utc::now();
    TimeRange {
        start: now - Duration::hours(1),
        end: now + Duration::hours(1),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// The core loop: first request misses, the committed generation backfills
/// the cache, and the identical second request hits EXACT for free.
#[tokio::test]
async fn miss_commit_then_exact_hit() {
    let (_store, optimizer) = optimizer();

    let result = optimizer.lookup(&request()).await;
    assert_matches!(result, MatchResult::Miss);

    let committed = optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &request(),
            receipt("Once upon a heist..."),
            None,
            None,
        )
        .await;
    assert!(committed.cost.charged_amount > committed.cost.actual_cost);
    assert_eq!(committed.savings.tokens_saved, 0);
    assert!(committed.spend.recorded);

    let result = optimizer.lookup(&request()).await;
    let entry = match result {
        MatchResult::Hit {
            tier: MatchTier::Exact,
            savings_ratio,
            entry,
        } => {
            assert_eq!(savings_ratio, 1.0);
            entry
        }
        other => panic!("expected exact hit, got {other:?}"),
    };

    let committed = optimizer
        .commit_hit(USER, SubscriptionTier::Standard, &entry, None)
        .await;
    assert_eq!(committed.cost.actual_cost, 0.0);
    assert_eq!(committed.cost.charged_amount, 0.0);
    assert_eq!(committed.savings.tokens_saved, 5_000);
    assert!(committed.savings.cost_saved > 0.0);
    assert_matches!(committed.record.served_tier, Some(MatchTier::Exact));
}

/// Hits bump the entry's usage statistics, observable on the next lookup.
#[tokio::test]
async fn lookup_records_hit_usage() {
    let (_store, optimizer) = optimizer();
    optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &request(),
            receipt("text"),
            None,
            None,
        )
        .await;

    let first = optimizer.lookup(&request()).await;
    assert_matches!(first, MatchResult::Hit { ref entry, .. } if entry.hit_count == 0);

    let second = optimizer.lookup(&request()).await;
    assert_matches!(second, MatchResult::Hit { ref entry, .. } if entry.hit_count == 1);
}

/// Committing the same request with identical content twice stores one
/// entry and keeps its usage statistics.
#[tokio::test]
async fn identical_recommit_is_idempotent() {
    let (store, optimizer) = optimizer();
    for _ in 0..2 {
        optimizer
            .commit_generation(
                USER,
                SubscriptionTier::Standard,
                &request(),
                receipt("same text"),
                None,
                None,
            )
            .await;
    }
    assert_eq!(store.entry_count(), 1);
}

/// Re-committing with changed content replaces the artifact and resets its
/// usage statistics, never duplicating the fingerprint.
#[tokio::test]
async fn changed_content_replaces_entry() {
    let (store, optimizer) = optimizer();
    optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &request(),
            receipt("first draft"),
            None,
            None,
        )
        .await;
    optimizer.lookup(&request()).await; // bump hit count

    optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &request(),
            receipt("second draft"),
            None,
            None,
        )
        .await;
    assert_eq!(store.entry_count(), 1);

    let result = optimizer.lookup(&request()).await;
    assert_matches!(
        result,
        MatchResult::Hit { ref entry, .. }
            if entry.content == "second draft" && entry.hit_count == 0
    );
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// A generation seeded by a partial-tier artifact is charged in full but
/// credited with tier-scaled savings.
#[tokio::test]
async fn adapted_generation_carries_tier_savings() {
    let (_store, optimizer) = optimizer();
    let ratio = optimizer.tier_policy().foundation_adapted_ratio;

    let committed = optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &request(),
            receipt("adapted text"),
            Some(MatchTier::FoundationAdapted),
            Some(TokenUsage {
                input_tokens: 2_000,
                output_tokens: 8_000,
            }),
        )
        .await;
    assert!(committed.cost.charged_amount > 0.0);
    assert_eq!(
        committed.savings.tokens_saved,
        (10_000.0 * ratio).floor() as i64
    );
    assert_matches!(
        committed.record.served_tier,
        Some(MatchTier::FoundationAdapted)
    );
}

/// Charged amounts flow into the budget ledger and can cross thresholds.
#[tokio::test]
async fn commit_spend_reaches_budget_alerts() {
    let (_store, optimizer) = optimizer();

    // 1M+1M standard tokens charge $21.60, blowing past the free-tier $5.
    let committed = optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Free,
            &request(),
            GenerationReceipt {
                content: "expensive".to_string(),
                model_class: "standard".to_string(),
                usage: TokenUsage {
                    input_tokens: 1_000_000,
                    output_tokens: 1_000_000,
                },
            },
            None,
            None,
        )
        .await;
    assert_eq!(committed.spend.alerts.len(), 2);
    assert!(committed.spend.prefer_looser_tiers);
}

/// Rollups reflect committed traffic: totals, hit counts, and per-tier
/// breakdown.
#[tokio::test]
async fn rollup_aggregates_committed_traffic() {
    let (_store, optimizer) = optimizer();
    optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &request(),
            receipt("text"),
            None,
            None,
        )
        .await;
    let entry = match optimizer.lookup(&request()).await {
        MatchResult::Hit { entry, .. } => entry,
        MatchResult::Miss => panic!("expected hit"),
    };
    optimizer
        .commit_hit(USER, SubscriptionTier::Standard, &entry, None)
        .await;

    let rollup = optimizer.rollup(Some(USER), wide_range()).await;
    assert_eq!(rollup.total_requests, 2);
    assert_eq!(rollup.cache_hits, 1);
    assert!((rollup.hit_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(rollup.by_tier["exact"], 1);
    assert!(rollup.tokens_saved > 0);

    // Another user's window is empty but fully shaped.
    let rollup = optimizer.rollup(Some(USER + 1), wide_range()).await;
    assert_eq!(rollup.total_requests, 0);
    assert_eq!(rollup.by_tier.len(), MatchTier::ALL.len());
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Requests past the hard limits miss instead of erroring, and their
/// generations are never backfilled into the cache.
#[tokio::test]
async fn out_of_limit_requests_miss_and_skip_backfill() {
    let (store, optimizer) = optimizer();

    let mut oversized = request();
    oversized.premise = "x".repeat(MAX_PREMISE_CHARS + 1);
    assert_matches!(optimizer.lookup(&oversized).await, MatchResult::Miss);

    let mut unpaged = request();
    unpaged.kind = ContentKind::Chapter;
    unpaged.chapter_number = Some(0);
    assert_matches!(optimizer.lookup(&unpaged).await, MatchResult::Miss);

    // The generation is still served and accounted, just not cached.
    let committed = optimizer
        .commit_generation(
            USER,
            SubscriptionTier::Standard,
            &oversized,
            receipt("served anyway"),
            None,
            None,
        )
        .await;
    assert!(committed.spend.recorded);
    assert_eq!(store.entry_count(), 0);
}
