//! Budget & alert engine (PRD-43).
//!
//! Wires the pure stage machine in `fabula_core::budget` to the atomic
//! primitives of a [`BudgetStore`]. Spend accumulation is an atomic add at
//! the storage layer; the month alert stage advances through a conditional
//! forward-only update, so under concurrent spends exactly one caller wins a
//! threshold crossing and emits its alerts.

use std::sync::Arc;

use chrono::Utc;

use fabula_core::budget::{
    crossed_between, evaluate_stage, month_key, Budget, BudgetAlert, BudgetStatus,
    SubscriptionTier,
};
use fabula_core::error::CoreError;
use fabula_core::pricing::CostRecord;
use fabula_core::store::BudgetStore;
use fabula_core::types::DbId;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of recording one spend against a user's budget.
#[derive(Debug, Clone)]
pub struct SpendOutcome {
    /// Whether the spend actually landed in the ledger. False only when the
    /// budget store was unavailable; the failure is logged, not raised.
    pub recorded: bool,
    /// Month-to-date total after this spend (0 when not recorded).
    pub month_spend: f64,
    /// Alerts newly fired by this spend. At most one per severity per month.
    pub alerts: Vec<BudgetAlert>,
    /// Signal that the caller should prefer looser cache tiers and shorter
    /// generations. Informational only; nothing here alters requests.
    pub prefer_looser_tiers: bool,
}

impl SpendOutcome {
    fn not_recorded() -> Self {
        Self {
            recorded: false,
            month_spend: 0.0,
            alerts: Vec::new(),
            prefer_looser_tiers: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tracks rolling per-user spend against configured monthly budgets.
pub struct BudgetEngine {
    store: Arc<dyn BudgetStore>,
}

impl BudgetEngine {
    pub fn new(store: Arc<dyn BudgetStore>) -> Self {
        Self { store }
    }

    /// Upsert a user's budget configuration.
    ///
    /// Threshold-ordering violations are hard validation errors. A store
    /// failure also propagates: losing an explicit configuration change
    /// silently is not acceptable degradation.
    pub async fn set_budget(&self, user_id: DbId, budget: Budget) -> Result<(), CoreError> {
        budget.validate()?;
        self.store
            .upsert_budget(user_id, &budget)
            .await
            .map_err(|e| CoreError::Internal(format!("Budget store write failed: {e}")))
    }

    /// Add a cost record's charged amount to the user's month-to-date total
    /// and evaluate threshold alerts. Safe under concurrent spends.
    pub async fn record_spend(
        &self,
        user_id: DbId,
        tier: SubscriptionTier,
        record: &CostRecord,
    ) -> SpendOutcome {
        let month = month_key(record.created_at);
        let month_spend = match self
            .store
            .add_spend(user_id, &month, record.charged_amount)
            .await
        {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Spend recording failed -- budget ledger out of date");
                return SpendOutcome::not_recorded();
            }
        };

        let budget = self.effective_budget(user_id, tier).await;
        let (alerts, prefer_looser_tiers) = self
            .fire_crossed_alerts(user_id, &budget, &month, month_spend)
            .await;

        SpendOutcome {
            recorded: true,
            month_spend,
            alerts,
            prefer_looser_tiers,
        }
    }

    /// Current budget position, or `None` when the store is unavailable.
    /// Users without an explicit budget get their subscription-tier default.
    pub async fn budget_status(
        &self,
        user_id: DbId,
        tier: SubscriptionTier,
    ) -> Option<BudgetStatus> {
        let month = month_key(Utc::now());
        let current_month_spend = match self.store.month_spend(user_id, &month).await {
            Ok(spend) => spend,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Budget status read failed");
                return None;
            }
        };
        let budget = self.effective_budget(user_id, tier).await;
        let utilization_ratio = budget.utilization(current_month_spend);
        Some(BudgetStatus {
            budget,
            current_month_spend,
            utilization_ratio,
        })
    }

    /// Re-evaluate the current month without adding spend, emitting any
    /// alerts whose threshold is already crossed but not yet fired.
    pub async fn check_and_emit_alerts(
        &self,
        user_id: DbId,
        tier: SubscriptionTier,
    ) -> Vec<BudgetAlert> {
        let month = month_key(Utc::now());
        let month_spend = match self.store.month_spend(user_id, &month).await {
            Ok(spend) => spend,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Alert check read failed");
                return Vec::new();
            }
        };
        let budget = self.effective_budget(user_id, tier).await;
        self.fire_crossed_alerts(user_id, &budget, &month, month_spend)
            .await
            .0
    }

    /// The user's configured budget, falling back to the tier default. A
    /// store read failure also falls back: alert math on the default budget
    /// beats no alert math at all.
    async fn effective_budget(&self, user_id: DbId, tier: SubscriptionTier) -> Budget {
        match self.store.find_budget(user_id).await {
            Ok(Some(budget)) => budget,
            Ok(None) => tier.default_budget(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Budget read failed -- using tier default");
                tier.default_budget()
            }
        }
    }

    /// Shared evaluation path: compute the stage transition, race for it via
    /// the store's conditional advance, and persist alerts if this caller
    /// won. Returns the fired alerts and the auto-optimization hint.
    ///
    /// The severities to emit are derived from the stage the advance
    /// actually replaced, not from the earlier read: another caller may
    /// advance (and emit for) part of the transition between our read and
    /// our advance, and those thresholds must not fire twice.
    async fn fire_crossed_alerts(
        &self,
        user_id: DbId,
        budget: &Budget,
        month: &str,
        month_spend: f64,
    ) -> (Vec<BudgetAlert>, bool) {
        let previous = match self.store.alert_stage(user_id, month).await {
            Ok(stage) => stage,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Alert stage read failed -- skipping alert evaluation");
                return (Vec::new(), false);
            }
        };

        let eval = evaluate_stage(budget, previous, month_spend);
        if eval.next_stage == previous {
            return (Vec::new(), eval.prefer_looser_tiers);
        }

        let replaced = match self
            .store
            .advance_alert_stage(user_id, month, eval.next_stage)
            .await
        {
            Ok(replaced) => replaced,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Alert stage advance failed");
                None
            }
        };
        let Some(replaced) = replaced else {
            return (Vec::new(), eval.prefer_looser_tiers);
        };
        if !budget.alerts_enabled {
            return (Vec::new(), eval.prefer_looser_tiers);
        }

        let crossed = crossed_between(replaced, eval.next_stage);
        let mut alerts = Vec::with_capacity(crossed.len());
        for severity in crossed {
            let alert = BudgetAlert {
                user_id,
                severity,
                month_key: month.to_string(),
                month_spend,
                monthly_budget: budget.monthly_budget,
                utilization_ratio: budget.utilization(month_spend),
                created_at: Utc::now(),
            };
            if let Err(e) = self.store.insert_alert(&alert).await {
                tracing::warn!(user_id, severity = %alert.severity.as_str(), error = %e,
                    "Alert persistence failed -- alert still returned to caller");
            }
            alerts.push(alert);
        }
        (alerts, eval.prefer_looser_tiers)
    }
}
