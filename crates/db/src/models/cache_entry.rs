//! Cache entry row model (PRD-40).

use sqlx::FromRow;

use fabula_core::cache::CacheEntry;
use fabula_core::error::CoreError;
use fabula_core::request::ContentKind;
use fabula_core::tiering::PositionBucket;
use fabula_core::types::{DbId, Timestamp};

/// Row of `cache_entries`. Kind and position bucket are stored as their
/// stable lowercase labels.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRow {
    pub id: DbId,
    pub primary_fingerprint: String,
    pub family_fingerprint: String,
    pub kind: String,
    pub genre: String,
    pub position_bucket: String,
    pub foundation_id: Option<DbId>,
    pub prior_context_hash: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub model_class: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub actual_cost: f64,
    pub hit_count: i64,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
}

impl TryFrom<CacheEntryRow> for CacheEntry {
    type Error = CoreError;

    fn try_from(row: CacheEntryRow) -> Result<Self, Self::Error> {
        let kind = ContentKind::parse(&row.kind)
            .ok_or_else(|| CoreError::Internal(format!("Unknown content kind '{}'", row.kind)))?;
        let position_bucket = PositionBucket::parse(&row.position_bucket).ok_or_else(|| {
            CoreError::Internal(format!("Unknown position bucket '{}'", row.position_bucket))
        })?;
        Ok(CacheEntry {
            id: row.id,
            primary_fingerprint: row.primary_fingerprint,
            family_fingerprint: row.family_fingerprint,
            kind,
            genre: row.genre,
            position_bucket,
            foundation_id: row.foundation_id,
            prior_context_hash: row.prior_context_hash,
            content: row.content,
            content_hash: row.content_hash,
            model_class: row.model_class,
            input_tokens: row.input_tokens,
            output_tokens: row.output_tokens,
            actual_cost: row.actual_cost,
            hit_count: row.hit_count,
            created_at: row.created_at,
            last_accessed_at: row.last_accessed_at,
        })
    }
}
