//! Repository for budget configuration, the month spend ledger, and alert
//! state (PRD-43).
//!
//! The ledger and alert-stage updates are the concurrency-critical pieces.
//! The ledger add is a single-statement atomic upsert, so two simultaneous
//! spends never lose an increment. The stage advance serializes crossers on
//! a row lock and hands back the stage it replaced, so only one caller wins
//! a crossing and it knows exactly which thresholds it passed.

use sqlx::PgPool;

use fabula_core::budget::{AlertStage, Budget, BudgetAlert};
use fabula_core::types::DbId;

use crate::models::budget::BudgetRow;

/// Column list for `user_budgets` SELECT queries.
const BUDGET_COLUMNS: &str = "\
    user_id, monthly_budget, warning_threshold, critical_threshold, \
    alerts_enabled, auto_optimize, updated_at";

/// Provides query operations for budgets, the month ledger, and alerts.
pub struct BudgetRepo;

impl BudgetRepo {
    pub async fn find_budget(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<BudgetRow>, sqlx::Error> {
        let query = format!("SELECT {BUDGET_COLUMNS} FROM user_budgets WHERE user_id = $1");
        sqlx::query_as::<_, BudgetRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn upsert_budget(
        pool: &PgPool,
        user_id: DbId,
        budget: &Budget,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_budgets \
                (user_id, monthly_budget, warning_threshold, critical_threshold, \
                 alerts_enabled, auto_optimize, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET \
                monthly_budget = EXCLUDED.monthly_budget, \
                warning_threshold = EXCLUDED.warning_threshold, \
                critical_threshold = EXCLUDED.critical_threshold, \
                alerts_enabled = EXCLUDED.alerts_enabled, \
                auto_optimize = EXCLUDED.auto_optimize, \
                updated_at = NOW()",
        )
        .bind(user_id)
        .bind(budget.monthly_budget)
        .bind(budget.warning_threshold)
        .bind(budget.critical_threshold)
        .bind(budget.alerts_enabled)
        .bind(budget.auto_optimize)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Atomically add to a user's month-to-date spend, returning the new
    /// total. First spend of a month creates the ledger row.
    pub async fn add_spend(
        pool: &PgPool,
        user_id: DbId,
        month_key: &str,
        amount: f64,
    ) -> Result<f64, sqlx::Error> {
        let (spend,): (f64,) = sqlx::query_as(
            "INSERT INTO budget_month_ledger (user_id, month_key, spend) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, month_key) DO UPDATE SET \
                spend = budget_month_ledger.spend + EXCLUDED.spend \
             RETURNING spend",
        )
        .bind(user_id)
        .bind(month_key)
        .bind(amount)
        .fetch_one(pool)
        .await?;
        Ok(spend)
    }

    /// Month-to-date spend; 0 for a month with no ledger row.
    pub async fn month_spend(
        pool: &PgPool,
        user_id: DbId,
        month_key: &str,
    ) -> Result<f64, sqlx::Error> {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT spend FROM budget_month_ledger WHERE user_id = $1 AND month_key = $2",
        )
        .bind(user_id)
        .bind(month_key)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(s,)| s).unwrap_or(0.0))
    }

    /// Current alert stage for a user-month; `Normal` when none recorded,
    /// which is also how a new month resets the cycle.
    pub async fn alert_stage(
        pool: &PgPool,
        user_id: DbId,
        month_key: &str,
    ) -> Result<AlertStage, sqlx::Error> {
        let row: Option<(i16,)> = sqlx::query_as(
            "SELECT stage FROM budget_alert_stages WHERE user_id = $1 AND month_key = $2",
        )
        .bind(user_id)
        .bind(month_key)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(s,)| AlertStage::from_i16(s)).unwrap_or(AlertStage::Normal))
    }

    /// Forward-only stage advance. Returns the stage this call replaced
    /// when it moved the stage, `None` when the stored stage was already at
    /// or past `to`.
    ///
    /// Runs in a transaction with the existing row locked (`FOR UPDATE`):
    /// concurrent crossers serialize here, so the returned previous stage
    /// is exactly what this call overwrote and the caller can derive the
    /// severities to emit from it. Two callers racing to create the first
    /// row for a month resolve via `ON CONFLICT DO NOTHING`; the loser
    /// reports no advance.
    pub async fn advance_alert_stage(
        pool: &PgPool,
        user_id: DbId,
        month_key: &str,
        to: AlertStage,
    ) -> Result<Option<AlertStage>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let row: Option<(i16,)> = sqlx::query_as(
            "SELECT stage FROM budget_alert_stages \
             WHERE user_id = $1 AND month_key = $2 \
             FOR UPDATE",
        )
        .bind(user_id)
        .bind(month_key)
        .fetch_optional(&mut *tx)
        .await?;

        let replaced = match row {
            Some((stage,)) => {
                let previous = AlertStage::from_i16(stage);
                if previous < to {
                    sqlx::query(
                        "UPDATE budget_alert_stages SET stage = $3 \
                         WHERE user_id = $1 AND month_key = $2",
                    )
                    .bind(user_id)
                    .bind(month_key)
                    .bind(to.as_i16())
                    .execute(&mut *tx)
                    .await?;
                    Some(previous)
                } else {
                    None
                }
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO budget_alert_stages (user_id, month_key, stage) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (user_id, month_key) DO NOTHING",
                )
                .bind(user_id)
                .bind(month_key)
                .bind(to.as_i16())
                .execute(&mut *tx)
                .await?;
                (result.rows_affected() > 0).then_some(AlertStage::Normal)
            }
        };
        tx.commit().await?;
        Ok(replaced)
    }

    /// Persist a write-once alert event.
    pub async fn insert_alert(pool: &PgPool, alert: &BudgetAlert) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO budget_alerts \
                (user_id, severity, month_key, month_spend, monthly_budget, \
                 utilization_ratio, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(alert.user_id)
        .bind(alert.severity.as_str())
        .bind(&alert.month_key)
        .bind(alert.month_spend)
        .bind(alert.monthly_budget)
        .bind(alert.utilization_ratio)
        .bind(alert.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
