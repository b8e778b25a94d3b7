//! Repository for the append-only `cost_records` table (PRD-42, PRD-44).

use sqlx::PgPool;

use fabula_core::pricing::CostRecord;
use fabula_core::types::{DbId, Timestamp};

use crate::models::cost_record::CostRecordRow;

/// Column list for `cost_records` SELECT queries.
const COLUMNS: &str = "\
    id, user_id, served_tier, model_class, input_tokens, output_tokens, \
    actual_cost, charged_amount, tokens_saved, cost_saved, created_at";

/// Provides query operations for cost accounting events.
pub struct CostRecordRepo;

impl CostRecordRepo {
    /// Append one accounting event. Records are never updated.
    pub async fn insert(pool: &PgPool, record: &CostRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO cost_records \
                (id, user_id, served_tier, model_class, input_tokens, \
                 output_tokens, actual_cost, charged_amount, tokens_saved, \
                 cost_saved, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.served_tier.map(|t| t.as_str()))
        .bind(&record.model_class)
        .bind(record.input_tokens)
        .bind(record.output_tokens)
        .bind(record.actual_cost)
        .bind(record.charged_amount)
        .bind(record.tokens_saved)
        .bind(record.cost_saved)
        .bind(record.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Records within `[start, end)`, optionally filtered to one user.
    /// `None` is the privileged system-wide read.
    pub async fn list_in_range(
        pool: &PgPool,
        user_id: Option<DbId>,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<CostRecordRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cost_records \
             WHERE created_at >= $1 AND created_at < $2 \
               AND ($3::BIGINT IS NULL OR user_id = $3) \
             ORDER BY created_at"
        );
        sqlx::query_as::<_, CostRecordRow>(&query)
            .bind(start)
            .bind(end)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
