//! Cost record row model (PRD-42).

use sqlx::FromRow;

use fabula_core::error::CoreError;
use fabula_core::pricing::CostRecord;
use fabula_core::tiering::MatchTier;
use fabula_core::types::{DbId, Timestamp};

/// Row of `cost_records`. `served_tier` is NULL for a plain fresh
/// generation with no cache involvement.
#[derive(Debug, Clone, FromRow)]
pub struct CostRecordRow {
    pub id: uuid::Uuid,
    pub user_id: DbId,
    pub served_tier: Option<String>,
    pub model_class: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub actual_cost: f64,
    pub charged_amount: f64,
    pub tokens_saved: i64,
    pub cost_saved: f64,
    pub created_at: Timestamp,
}

impl TryFrom<CostRecordRow> for CostRecord {
    type Error = CoreError;

    fn try_from(row: CostRecordRow) -> Result<Self, Self::Error> {
        let served_tier = match row.served_tier {
            None => None,
            Some(label) => Some(MatchTier::parse(&label).ok_or_else(|| {
                CoreError::Internal(format!("Unknown match tier '{label}'"))
            })?),
        };
        Ok(CostRecord {
            id: row.id,
            user_id: row.user_id,
            served_tier,
            model_class: row.model_class,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            actual_cost: row.actual_cost,
            charged_amount: row.charged_amount,
            tokens_saved: row.tokens_saved,
            cost_saved: row.cost_saved,
            created_at: row.created_at,
        })
    }
}
