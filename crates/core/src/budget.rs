//! Per-user budgets, threshold alerts, and the month alert stage machine
//! (PRD-43).
//!
//! Pure logic only: the threshold math and the `Normal -> Warned -> Critical`
//! stage machine live here; atomic spend accumulation and stage persistence
//! live behind [`crate::store::BudgetStore`]. The stage is monotonic within a
//! month and resets at the month boundary because it is keyed by month.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Threshold defaults
// ---------------------------------------------------------------------------

/// Default fraction of the monthly budget that triggers a warning alert.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;
/// Default fraction of the monthly budget that triggers a critical alert.
pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.95;

// ---------------------------------------------------------------------------
// Month key
// ---------------------------------------------------------------------------

/// Calendar-month key ("YYYY-MM", UTC) for month-scoped spend and alerts.
pub fn month_key(at: Timestamp) -> String {
    at.format("%Y-%m").to_string()
}

// ---------------------------------------------------------------------------
// Subscription tiers
// ---------------------------------------------------------------------------

/// Platform subscription tier, used to default a budget on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Standard,
    Premium,
}

impl SubscriptionTier {
    /// Default budget configuration for this tier. Free users get automatic
    /// optimization so they stretch their small ceiling further.
    pub fn default_budget(self) -> Budget {
        let (monthly_budget, auto_optimize) = match self {
            Self::Free => (5.0, true),
            Self::Standard => (20.0, false),
            Self::Premium => (100.0, false),
        };
        Budget {
            monthly_budget,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            alerts_enabled: true,
            auto_optimize,
        }
    }
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Per-user budget configuration. Created on first use from the
/// subscription-tier default, updated by explicit user/admin action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Monthly ceiling in charged dollars.
    pub monthly_budget: f64,
    /// Fraction of the ceiling at which a warning alert fires.
    pub warning_threshold: f64,
    /// Fraction of the ceiling at which a critical alert fires.
    pub critical_threshold: f64,
    pub alerts_enabled: bool,
    /// Whether crossing the warning threshold should signal callers to
    /// prefer looser cache tiers and shorter generations.
    pub auto_optimize: bool,
}

impl Budget {
    /// Validate the threshold ordering invariant and the ceiling.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.monthly_budget <= 0.0 {
            return Err(CoreError::Validation(format!(
                "Monthly budget must be positive, got {}",
                self.monthly_budget
            )));
        }
        if !(0.0..=1.0).contains(&self.warning_threshold)
            || !(0.0..=1.0).contains(&self.critical_threshold)
            || self.warning_threshold >= self.critical_threshold
        {
            return Err(CoreError::Validation(format!(
                "Thresholds require 0 <= warning < critical <= 1, got warning={}, critical={}",
                self.warning_threshold, self.critical_threshold
            )));
        }
        Ok(())
    }

    /// Month-to-date utilization of this budget. A non-positive ceiling
    /// yields 0 rather than a division blowup.
    pub fn utilization(&self, month_spend: f64) -> f64 {
        if self.monthly_budget <= 0.0 {
            0.0
        } else {
            month_spend / self.monthly_budget
        }
    }
}

/// Snapshot of a user's budget position.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub budget: Budget,
    pub current_month_spend: f64,
    pub utilization_ratio: f64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Severity of a threshold-crossing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A write-once threshold-crossing event with its budget snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub user_id: DbId,
    pub severity: AlertSeverity,
    /// The month the crossing happened in ("YYYY-MM").
    pub month_key: String,
    pub month_spend: f64,
    pub monthly_budget: f64,
    pub utilization_ratio: f64,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Stage machine
// ---------------------------------------------------------------------------

/// Per-user-month alert stage. Monotonic within a month: each threshold
/// fires at most once, no matter how many spends land past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStage {
    Normal,
    Warned,
    Critical,
}

impl AlertStage {
    /// Storage representation (SMALLINT). Ordering must match enum order.
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Normal => 0,
            Self::Warned => 1,
            Self::Critical => 2,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            2 => Self::Critical,
            1 => Self::Warned,
            _ => Self::Normal,
        }
    }
}

/// Outcome of evaluating a user-month against its thresholds.
#[derive(Debug, Clone)]
pub struct StageEvaluation {
    /// Stage the month should land on. Never below the previous stage.
    pub next_stage: AlertStage,
    /// Severities newly crossed by this evaluation, in ascending order.
    /// Both thresholds crossed in a single spend yields both severities.
    pub crossed: Vec<AlertSeverity>,
    /// True when auto-optimization is enabled and utilization has reached
    /// the warning threshold. Returned as a flag, never acted on here.
    pub prefer_looser_tiers: bool,
}

/// The severities whose thresholds lie strictly past `previous` and within
/// `next`, in ascending order. This is the single source of truth for which
/// alerts a stage transition fires; callers must feed it the stage the
/// transition *actually* replaced, not a possibly stale read.
pub fn crossed_between(previous: AlertStage, next: AlertStage) -> Vec<AlertSeverity> {
    let mut crossed = Vec::new();
    if previous < AlertStage::Warned && next >= AlertStage::Warned {
        crossed.push(AlertSeverity::Warning);
    }
    if previous < AlertStage::Critical && next >= AlertStage::Critical {
        crossed.push(AlertSeverity::Critical);
    }
    crossed
}

/// Evaluate where a month's spend puts the alert stage.
///
/// The stage never regresses: `next_stage = max(previous, stage(utilization))`.
/// `crossed` contains only the thresholds passed *by this evaluation*, which
/// is what makes alerts single-fire per month.
pub fn evaluate_stage(budget: &Budget, previous: AlertStage, month_spend: f64) -> StageEvaluation {
    let utilization = budget.utilization(month_spend);

    let target = if utilization >= budget.critical_threshold {
        AlertStage::Critical
    } else if utilization >= budget.warning_threshold {
        AlertStage::Warned
    } else {
        AlertStage::Normal
    };
    let next_stage = previous.max(target);

    StageEvaluation {
        next_stage,
        crossed: crossed_between(previous, next_stage),
        prefer_looser_tiers: budget.auto_optimize && utilization >= budget.warning_threshold,
    }
}
