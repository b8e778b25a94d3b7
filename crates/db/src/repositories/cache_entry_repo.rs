//! Repository for the `cache_entries` table (PRD-40, PRD-41).
//!
//! Each lookup backs one match tier and hits an index
//! (`primary_fingerprint` unique; `(family_fingerprint, kind)` and
//! `(kind, genre)` btree), so tier probing stays O(1)-per-tier.

use sqlx::PgPool;

use fabula_core::request::ContentKind;
use fabula_core::tiering::PositionBucket;
use fabula_core::types::DbId;

use crate::models::cache_entry::CacheEntryRow;

/// Column list for `cache_entries` SELECT queries.
const COLUMNS: &str = "\
    id, primary_fingerprint, family_fingerprint, kind, genre, \
    position_bucket, foundation_id, prior_context_hash, content, \
    content_hash, model_class, input_tokens, output_tokens, actual_cost, \
    hit_count, created_at, last_accessed_at";

/// Insert values for backfilling an entry after a fresh generation.
#[derive(Debug, Clone)]
pub struct InsertCacheEntry<'a> {
    pub primary_fingerprint: &'a str,
    pub family_fingerprint: &'a str,
    pub kind: ContentKind,
    pub genre: &'a str,
    pub position_bucket: PositionBucket,
    pub foundation_id: Option<DbId>,
    pub prior_context_hash: Option<&'a str>,
    pub content: &'a str,
    pub content_hash: &'a str,
    pub model_class: &'a str,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub actual_cost: f64,
}

/// Provides query operations for cached generation artifacts.
pub struct CacheEntryRepo;

impl CacheEntryRepo {
    /// Exact lookup by primary fingerprint.
    pub async fn find_by_primary(
        pool: &PgPool,
        primary: &str,
    ) -> Result<Option<CacheEntryRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cache_entries WHERE primary_fingerprint = $1");
        sqlx::query_as::<_, CacheEntryRow>(&query)
            .bind(primary)
            .fetch_optional(pool)
            .await
    }

    /// Family-tier candidates for one content kind, best-first.
    pub async fn find_by_family(
        pool: &PgPool,
        family: &str,
        kind: ContentKind,
    ) -> Result<Vec<CacheEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cache_entries \
             WHERE family_fingerprint = $1 AND kind = $2 \
             ORDER BY hit_count DESC, created_at DESC \
             LIMIT 50"
        );
        sqlx::query_as::<_, CacheEntryRow>(&query)
            .bind(family)
            .bind(kind.as_str())
            .fetch_all(pool)
            .await
    }

    /// Loosest-tier candidates: same kind and normalized genre, best-first.
    pub async fn find_by_kind_genre(
        pool: &PgPool,
        kind: ContentKind,
        genre: &str,
    ) -> Result<Vec<CacheEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM cache_entries \
             WHERE kind = $1 AND genre = $2 \
             ORDER BY hit_count DESC, created_at DESC \
             LIMIT 50"
        );
        sqlx::query_as::<_, CacheEntryRow>(&query)
            .bind(kind.as_str())
            .bind(genre)
            .fetch_all(pool)
            .await
    }

    /// Idempotent insert keyed on the primary fingerprint.
    ///
    /// Same content hash: no-op. Different content hash: the artifact really
    /// changed, so the row is replaced wholesale and its usage statistics
    /// reset. Never creates a duplicate primary.
    pub async fn upsert(pool: &PgPool, input: &InsertCacheEntry<'_>) -> Result<(), sqlx::Error> {
        let query = "\
            INSERT INTO cache_entries \
                (primary_fingerprint, family_fingerprint, kind, genre, \
                 position_bucket, foundation_id, prior_context_hash, content, \
                 content_hash, model_class, input_tokens, output_tokens, \
                 actual_cost, hit_count, created_at, last_accessed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 0, NOW(), NOW()) \
             ON CONFLICT (primary_fingerprint) DO UPDATE SET \
                family_fingerprint = EXCLUDED.family_fingerprint, \
                content = EXCLUDED.content, \
                content_hash = EXCLUDED.content_hash, \
                model_class = EXCLUDED.model_class, \
                input_tokens = EXCLUDED.input_tokens, \
                output_tokens = EXCLUDED.output_tokens, \
                actual_cost = EXCLUDED.actual_cost, \
                hit_count = 0, \
                created_at = NOW(), \
                last_accessed_at = NOW() \
             WHERE cache_entries.content_hash IS DISTINCT FROM EXCLUDED.content_hash";
        sqlx::query(query)
            .bind(input.primary_fingerprint)
            .bind(input.family_fingerprint)
            .bind(input.kind.as_str())
            .bind(input.genre)
            .bind(input.position_bucket.as_str())
            .bind(input.foundation_id)
            .bind(input.prior_context_hash)
            .bind(input.content)
            .bind(input.content_hash)
            .bind(input.model_class)
            .bind(input.input_tokens)
            .bind(input.output_tokens)
            .bind(input.actual_cost)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Atomically bump an entry's hit counter and last-access timestamp.
    /// A concurrently evicted entry is a no-op, not an error.
    pub async fn record_hit(pool: &PgPool, entry_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE cache_entries \
             SET hit_count = hit_count + 1, last_accessed_at = NOW() \
             WHERE id = $1",
        )
        .bind(entry_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
