//! Token pricing, markup, and savings accounting (PRD-42).
//!
//! Pure calculation: given a rate table and a markup percentage, convert
//! token counts into provider cost and platform-charged cost, and price the
//! savings of serving a cache tier instead of a full fresh generation.
//! Nothing here mutates state or performs I/O; an unknown model class falls
//! back to the default rate with a warning signal, never an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::tiering::MatchTier;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default markup applied on top of provider cost, in percent.
pub const DEFAULT_MARKUP_PERCENT: f64 = 20.0;

/// Default per-million-token rates per model class, USD.
fn default_rates() -> HashMap<String, TokenRate> {
    HashMap::from([
        (
            "economy".to_string(),
            TokenRate {
                input_per_million: 0.25,
                output_per_million: 1.25,
            },
        ),
        (
            "standard".to_string(),
            TokenRate {
                input_per_million: 3.0,
                output_per_million: 15.0,
            },
        ),
        (
            "premium".to_string(),
            TokenRate {
                input_per_million: 15.0,
                output_per_million: 75.0,
            },
        ),
    ])
}

// ---------------------------------------------------------------------------
// Token usage
// ---------------------------------------------------------------------------

/// Token counts for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn total(self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

// ---------------------------------------------------------------------------
// Rates & config
// ---------------------------------------------------------------------------

/// Provider price per million tokens for one model class, USD.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl TokenRate {
    fn validate(&self, name: &str) -> Result<(), CoreError> {
        if self.input_per_million < 0.0 || self.output_per_million < 0.0 {
            return Err(CoreError::Validation(format!(
                "Rate for '{name}' must be non-negative"
            )));
        }
        Ok(())
    }
}

/// Pricing configuration supplied at startup: per-model rate table, the
/// fallback rate for unknown model classes, and the global markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub rates: HashMap<String, TokenRate>,
    pub default_rate: TokenRate,
    pub markup_percent: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let rates = default_rates();
        let default_rate = rates["standard"];
        Self {
            rates,
            default_rate,
            markup_percent: DEFAULT_MARKUP_PERCENT,
        }
    }
}

impl PricingConfig {
    /// Validate markup and every configured rate. Config errors are hard
    /// errors: they are caller mistakes, fixed at startup.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.markup_percent < 0.0 {
            return Err(CoreError::Validation(format!(
                "Markup percent must be non-negative, got {}",
                self.markup_percent
            )));
        }
        self.default_rate.validate("default")?;
        for (name, rate) in &self.rates {
            rate.validate(name)?;
        }
        Ok(())
    }

    /// Rate for a model class, falling back to the default rate for unknown
    /// classes. The fallback is logged, not raised: accounting never blocks
    /// a user-facing response.
    pub fn rate_for(&self, model_class: &str) -> TokenRate {
        match self.rates.get(model_class) {
            Some(rate) => *rate,
            None => {
                tracing::warn!(model_class = %model_class, "Unknown model class -- using default rate");
                self.default_rate
            }
        }
    }

    /// Convert token counts into provider cost and charged amount.
    ///
    /// `charged = actual * (1 + markup/100)`, rounded *up* to whole cents so
    /// `charged >= actual` survives rounding on sub-cent costs. Negative
    /// token counts are treated as zero.
    pub fn compute_cost(&self, usage: TokenUsage, model_class: &str) -> CostBreakdown {
        let rate = self.rate_for(model_class);
        let input = usage.input_tokens.max(0) as f64;
        let output = usage.output_tokens.max(0) as f64;
        let actual_cost = (input * rate.input_per_million + output * rate.output_per_million)
            / 1_000_000.0;
        let charged_amount = ceil_to_cents(actual_cost * (1.0 + self.markup_percent / 100.0));
        CostBreakdown {
            actual_cost,
            charged_amount,
        }
    }

    /// Price the savings of serving a cache tier instead of generating the
    /// estimated fresh call from scratch.
    ///
    /// Tokens saved is the fresh total scaled by the savings ratio, floored.
    /// Cost saved is the charged-amount-equivalent of the scaled usage.
    pub fn compute_savings(
        &self,
        savings_ratio: f64,
        estimated_fresh: TokenUsage,
        model_class: &str,
    ) -> Savings {
        let ratio = savings_ratio.clamp(0.0, 1.0);
        let tokens_saved = (estimated_fresh.total().max(0) as f64 * ratio).floor() as i64;
        let saved_usage = TokenUsage {
            input_tokens: (estimated_fresh.input_tokens.max(0) as f64 * ratio).floor() as i64,
            output_tokens: (estimated_fresh.output_tokens.max(0) as f64 * ratio).floor() as i64,
        };
        let cost_saved = self.compute_cost(saved_usage, model_class).charged_amount;
        Savings {
            tokens_saved,
            cost_saved,
        }
    }
}

/// Round a dollar amount up to whole cents.
pub fn ceil_to_cents(amount: f64) -> f64 {
    (amount * 100.0).ceil() / 100.0
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Provider cost and platform-charged amount for one call, USD.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CostBreakdown {
    pub actual_cost: f64,
    pub charged_amount: f64,
}

/// Tokens and charged cost avoided by serving a cache tier.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Savings {
    pub tokens_saved: i64,
    pub cost_saved: f64,
}

impl Savings {
    pub fn zero() -> Self {
        Self {
            tokens_saved: 0,
            cost_saved: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Cost record
// ---------------------------------------------------------------------------

/// One append-only accounting event. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Correlation id (UUIDv7, time-ordered).
    pub id: uuid::Uuid,
    pub user_id: DbId,
    /// The tier that served the request, or `None` for a plain fresh
    /// generation with no cache involvement.
    pub served_tier: Option<MatchTier>,
    pub model_class: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Provider cost, before markup.
    pub actual_cost: f64,
    /// Amount charged to the user (actual cost plus markup).
    pub charged_amount: f64,
    pub tokens_saved: i64,
    pub cost_saved: f64,
    pub created_at: Timestamp,
}

impl CostRecord {
    pub fn new(
        user_id: DbId,
        served_tier: Option<MatchTier>,
        model_class: String,
        usage: TokenUsage,
        cost: CostBreakdown,
        savings: Savings,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            user_id,
            served_tier,
            model_class,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            actual_cost: cost.actual_cost,
            charged_amount: cost.charged_amount,
            tokens_saved: savings.tokens_saved,
            cost_saved: savings.cost_saved,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: i64, output: i64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PricingConfig::default().validate().is_ok());
    }

    #[test]
    fn negative_markup_rejected() {
        let config = PricingConfig {
            markup_percent: -1.0,
            ..PricingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_rate_rejected() {
        let mut config = PricingConfig::default();
        config.rates.insert(
            "broken".to_string(),
            TokenRate {
                input_per_million: -3.0,
                output_per_million: 15.0,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        let cost = PricingConfig::default().compute_cost(usage(0, 0), "standard");
        assert_eq!(cost.actual_cost, 0.0);
        assert_eq!(cost.charged_amount, 0.0);
    }

    #[test]
    fn charged_at_least_actual() {
        let config = PricingConfig::default();
        for (i, o) in [(1, 1), (137, 9_000), (1_000_000, 1_000_000), (5, 0)] {
            let cost = config.compute_cost(usage(i, o), "standard");
            assert!(cost.actual_cost >= 0.0);
            assert!(
                cost.charged_amount >= cost.actual_cost,
                "charged {} < actual {} for ({i}, {o})",
                cost.charged_amount,
                cost.actual_cost
            );
        }
    }

    #[test]
    fn sub_cent_cost_rounds_up_to_a_cent() {
        // 100 input tokens at $3/M is $0.0003 actual; 20% markup is still
        // well under a cent, so the charge becomes exactly one cent.
        let cost = PricingConfig::default().compute_cost(usage(100, 0), "standard");
        assert!(cost.actual_cost < 0.01);
        assert_eq!(cost.charged_amount, 0.01);
    }

    #[test]
    fn known_rate_math() {
        // 1M input + 1M output on "standard" = 3 + 15 = $18 actual,
        // $21.60 charged at 20% markup.
        let cost = PricingConfig::default().compute_cost(usage(1_000_000, 1_000_000), "standard");
        assert!((cost.actual_cost - 18.0).abs() < 1e-9);
        assert!((cost.charged_amount - 21.6).abs() < 1e-9);
    }

    #[test]
    fn negative_tokens_treated_as_zero() {
        let cost = PricingConfig::default().compute_cost(usage(-50, -10), "standard");
        assert_eq!(cost.actual_cost, 0.0);
        assert_eq!(cost.charged_amount, 0.0);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let config = PricingConfig::default();
        let known = config.compute_cost(usage(10_000, 10_000), "standard");
        let unknown = config.compute_cost(usage(10_000, 10_000), "model-nobody-configured");
        assert_eq!(known.charged_amount, unknown.charged_amount);
    }

    #[test]
    fn full_savings_for_exact_ratio() {
        let config = PricingConfig::default();
        let fresh = usage(1_000, 3_000);
        let savings = config.compute_savings(1.0, fresh, "standard");
        assert_eq!(savings.tokens_saved, 4_000);
        assert_eq!(
            savings.cost_saved,
            config.compute_cost(fresh, "standard").charged_amount
        );
    }

    #[test]
    fn partial_savings_floor_token_count() {
        let savings = PricingConfig::default().compute_savings(0.7, usage(3, 0), "standard");
        // 3 * 0.7 = 2.1, floored.
        assert_eq!(savings.tokens_saved, 2);
    }

    #[test]
    fn savings_ratio_clamped() {
        let config = PricingConfig::default();
        let over = config.compute_savings(1.5, usage(100, 100), "standard");
        let exact = config.compute_savings(1.0, usage(100, 100), "standard");
        assert_eq!(over.tokens_saved, exact.tokens_saved);
        let under = config.compute_savings(-0.2, usage(100, 100), "standard");
        assert_eq!(under.tokens_saved, 0);
    }
}
