//! Cache optimizer facade (PRD-40..44).
//!
//! The single surface the application calls. One request flows through
//! [`CacheOptimizer::lookup`]; on a miss (or an adaptable partial hit) the
//! caller performs the external generation and reports back through
//! [`CacheOptimizer::commit_generation`], which accounts cost, backfills the
//! cache, and updates the budget ledger. Nothing is committed before a
//! generation result exists, so an abandoned request costs nothing.

use std::sync::Arc;

use fabula_core::analytics::{TimeRange, UsageRollup};
use fabula_core::budget::{Budget, BudgetAlert, BudgetStatus, SubscriptionTier};
use fabula_core::cache::{CacheEntry, NewCacheEntry};
use fabula_core::error::CoreError;
use fabula_core::fingerprint::fingerprint;
use fabula_core::pricing::{
    CostBreakdown, CostRecord, PricingConfig, Savings, TokenUsage,
};
use fabula_core::request::GenerationRequest;
use fabula_core::store::{BudgetStore, CacheStore, CostStore};
use fabula_core::tiering::{MatchResult, MatchTier, TierPolicy};
use fabula_core::types::DbId;

use crate::analytics::AnalyticsAggregator;
use crate::budget::{BudgetEngine, SpendOutcome};
use crate::matcher::match_request;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Startup configuration for the optimizer: rate table + markup and the
/// tier heuristics. Validated eagerly at construction.
#[derive(Debug, Clone, Default)]
pub struct OptimizerConfig {
    pub pricing: PricingConfig,
    pub tiers: TierPolicy,
}

// ---------------------------------------------------------------------------
// Inbound / outbound DTOs
// ---------------------------------------------------------------------------

/// What the caller reports back after invoking the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationReceipt {
    pub content: String,
    pub model_class: String,
    pub usage: TokenUsage,
}

/// Result of committing one transaction (hit or fresh generation).
#[derive(Debug, Clone)]
pub struct Committed {
    pub cost: CostBreakdown,
    pub savings: Savings,
    /// The append-only accounting event, as persisted (best-effort).
    pub record: CostRecord,
    pub spend: SpendOutcome,
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// Ties fingerprinting, tiered matching, accounting, budgets, and analytics
/// into the one pipeline the request handlers drive.
pub struct CacheOptimizer {
    cache: Arc<dyn CacheStore>,
    costs: Arc<dyn CostStore>,
    budgets: BudgetEngine,
    analytics: AnalyticsAggregator,
    config: OptimizerConfig,
}

impl CacheOptimizer {
    /// Build an optimizer, validating the supplied configuration. Config
    /// errors are the caller's to fix and the only hard failure here.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        budgets: Arc<dyn BudgetStore>,
        costs: Arc<dyn CostStore>,
        config: OptimizerConfig,
    ) -> Result<Self, CoreError> {
        config.pricing.validate()?;
        config.tiers.validate()?;
        Ok(Self {
            cache,
            costs: costs.clone(),
            budgets: BudgetEngine::new(budgets),
            analytics: AnalyticsAggregator::new(costs),
            config,
        })
    }

    pub fn tier_policy(&self) -> &TierPolicy {
        &self.config.tiers
    }

    // -- lookup ------------------------------------------------------------

    /// Search the cache tiers for a request. Hits get their usage stats
    /// bumped (best-effort). Malformed requests (including oversized
    /// premises and non-positive chapter numbers) and store failures miss;
    /// nothing on this path errors.
    pub async fn lookup(&self, request: &GenerationRequest) -> MatchResult {
        let result = match_request(self.cache.as_ref(), request, &self.config.tiers).await;
        if let MatchResult::Hit { entry, .. } = &result {
            if let Err(e) = self.cache.record_hit(entry.id).await {
                tracing::warn!(entry_id = entry.id, error = %e, "Hit recording failed");
            }
        }
        result
    }

    // -- commit paths ------------------------------------------------------

    /// Account an EXACT hit served verbatim from the cache: zero cost, full
    /// savings against the estimated fresh call (defaulting to the entry's
    /// own token usage at creation).
    pub async fn commit_hit(
        &self,
        user_id: DbId,
        subscription: SubscriptionTier,
        entry: &CacheEntry,
        estimated_fresh: Option<TokenUsage>,
    ) -> Committed {
        let fresh = estimated_fresh.unwrap_or_else(|| entry.token_usage());
        let savings = self
            .config
            .pricing
            .compute_savings(1.0, fresh, &entry.model_class);
        let cost = CostBreakdown {
            actual_cost: 0.0,
            charged_amount: 0.0,
        };
        let record = CostRecord::new(
            user_id,
            Some(MatchTier::Exact),
            entry.model_class.clone(),
            TokenUsage {
                input_tokens: 0,
                output_tokens: 0,
            },
            cost,
            savings,
        );
        let spend = self.append_and_spend(user_id, subscription, record.clone()).await;
        Committed {
            cost,
            savings,
            record,
            spend,
        }
    }

    /// Account a completed fresh generation and backfill the cache.
    ///
    /// `served_tier` is the partial tier whose artifact seeded the call
    /// (`None` for a plain miss); savings are priced against
    /// `estimated_fresh` (defaulting to the receipt's own usage).
    pub async fn commit_generation(
        &self,
        user_id: DbId,
        subscription: SubscriptionTier,
        request: &GenerationRequest,
        receipt: GenerationReceipt,
        served_tier: Option<MatchTier>,
        estimated_fresh: Option<TokenUsage>,
    ) -> Committed {
        let cost = self
            .config
            .pricing
            .compute_cost(receipt.usage, &receipt.model_class);

        let savings = match served_tier {
            Some(tier) => {
                let ratio = self.config.tiers.savings_ratio(tier);
                let fresh = estimated_fresh.unwrap_or(receipt.usage);
                self.config
                    .pricing
                    .compute_savings(ratio, fresh, &receipt.model_class)
            }
            None => Savings::zero(),
        };

        // Backfill: the new artifact becomes reusable for future requests.
        // Invalid fingerprints are never stored.
        let fp = fingerprint(request, &self.config.tiers);
        if fp.is_valid() {
            let entry = NewCacheEntry::from_generation(
                request,
                &fp,
                &self.config.tiers,
                receipt.content,
                receipt.model_class.clone(),
                receipt.usage,
                cost.actual_cost,
            );
            if let Err(e) = self.cache.insert(entry).await {
                tracing::warn!(user_id, error = %e, "Cache backfill failed -- generation still served");
            }
        }

        let record = CostRecord::new(
            user_id,
            served_tier,
            receipt.model_class,
            receipt.usage,
            cost,
            savings,
        );
        let spend = self.append_and_spend(user_id, subscription, record.clone()).await;
        Committed {
            cost,
            savings,
            record,
            spend,
        }
    }

    /// Best-effort accounting tail shared by both commit paths: append the
    /// cost record, then update the budget ledger and collect alerts.
    async fn append_and_spend(
        &self,
        user_id: DbId,
        subscription: SubscriptionTier,
        record: CostRecord,
    ) -> SpendOutcome {
        if let Err(e) = self.costs.insert_record(&record).await {
            tracing::warn!(user_id, error = %e, "Cost record persistence failed");
        }
        self.budgets
            .record_spend(user_id, subscription, &record)
            .await
    }

    // -- budget & analytics passthroughs -----------------------------------

    /// Upsert a user's budget. Threshold violations are hard errors.
    pub async fn set_budget(&self, user_id: DbId, budget: Budget) -> Result<(), CoreError> {
        self.budgets.set_budget(user_id, budget).await
    }

    /// Current budget position; `None` when the store is unavailable.
    pub async fn budget_status(
        &self,
        user_id: DbId,
        subscription: SubscriptionTier,
    ) -> Option<BudgetStatus> {
        self.budgets.budget_status(user_id, subscription).await
    }

    /// Fire any alerts already crossed but not yet emitted this month.
    pub async fn check_and_emit_alerts(
        &self,
        user_id: DbId,
        subscription: SubscriptionTier,
    ) -> Vec<BudgetAlert> {
        self.budgets.check_and_emit_alerts(user_id, subscription).await
    }

    /// Usage rollup for a user, or system-wide when `user_id` is `None`.
    pub async fn rollup(&self, user_id: Option<DbId>, range: TimeRange) -> UsageRollup {
        self.analytics.rollup(user_id, range).await
    }
}
