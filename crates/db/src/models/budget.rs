//! Budget configuration row model (PRD-43). The month ledger and alert
//! stage tables are read as scalars directly in the repository.

use sqlx::FromRow;

use fabula_core::budget::Budget;
use fabula_core::types::{DbId, Timestamp};

/// Row of `user_budgets`.
#[derive(Debug, Clone, FromRow)]
pub struct BudgetRow {
    pub user_id: DbId,
    pub monthly_budget: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub alerts_enabled: bool,
    pub auto_optimize: bool,
    pub updated_at: Timestamp,
}

impl From<BudgetRow> for Budget {
    fn from(row: BudgetRow) -> Self {
        Budget {
            monthly_budget: row.monthly_budget,
            warning_threshold: row.warning_threshold,
            critical_threshold: row.critical_threshold,
            alerts_enabled: row.alerts_enabled,
            auto_optimize: row.auto_optimize,
        }
    }
}
