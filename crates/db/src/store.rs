//! Postgres implementations of the `fabula_core::store` seam traits.
//!
//! Thin adapters over the repositories: map rows into core entities and
//! sqlx errors into [`StoreError`]. No degradation logic here -- swallowing
//! failures is the engine layer's call, not the store's.

use async_trait::async_trait;
use sqlx::PgPool;

use fabula_core::analytics::TimeRange;
use fabula_core::budget::{AlertStage, Budget, BudgetAlert};
use fabula_core::cache::{CacheEntry, NewCacheEntry};
use fabula_core::pricing::CostRecord;
use fabula_core::request::ContentKind;
use fabula_core::store::{BudgetStore, CacheStore, CostStore, StoreError};
use fabula_core::types::DbId;

use crate::repositories::cache_entry_repo::InsertCacheEntry;
use crate::repositories::{BudgetRepo, CacheEntryRepo, CostRecordRepo};

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn decode_error(e: fabula_core::error::CoreError) -> StoreError {
    StoreError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// Cache store
// ---------------------------------------------------------------------------

/// Postgres-backed cache store.
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn find_by_primary(&self, primary: &str) -> Result<Option<CacheEntry>, StoreError> {
        CacheEntryRepo::find_by_primary(&self.pool, primary)
            .await
            .map_err(store_error)?
            .map(CacheEntry::try_from)
            .transpose()
            .map_err(decode_error)
    }

    async fn find_by_family(
        &self,
        family: &str,
        kind: ContentKind,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        CacheEntryRepo::find_by_family(&self.pool, family, kind)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|row| CacheEntry::try_from(row).map_err(decode_error))
            .collect()
    }

    async fn find_by_kind_genre(
        &self,
        kind: ContentKind,
        genre: &str,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        CacheEntryRepo::find_by_kind_genre(&self.pool, kind, genre)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|row| CacheEntry::try_from(row).map_err(decode_error))
            .collect()
    }

    async fn insert(&self, entry: NewCacheEntry) -> Result<(), StoreError> {
        let input = InsertCacheEntry {
            primary_fingerprint: &entry.primary_fingerprint,
            family_fingerprint: &entry.family_fingerprint,
            kind: entry.kind,
            genre: &entry.genre,
            position_bucket: entry.position_bucket,
            foundation_id: entry.foundation_id,
            prior_context_hash: entry.prior_context_hash.as_deref(),
            content: &entry.content,
            content_hash: &entry.content_hash,
            model_class: &entry.model_class,
            input_tokens: entry.input_tokens,
            output_tokens: entry.output_tokens,
            actual_cost: entry.actual_cost,
        };
        CacheEntryRepo::upsert(&self.pool, &input)
            .await
            .map_err(store_error)
    }

    async fn record_hit(&self, entry_id: DbId) -> Result<(), StoreError> {
        CacheEntryRepo::record_hit(&self.pool, entry_id)
            .await
            .map_err(store_error)
    }
}

// ---------------------------------------------------------------------------
// Budget store
// ---------------------------------------------------------------------------

/// Postgres-backed budget store.
#[derive(Clone)]
pub struct PgBudgetStore {
    pool: PgPool,
}

impl PgBudgetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BudgetStore for PgBudgetStore {
    async fn find_budget(&self, user_id: DbId) -> Result<Option<Budget>, StoreError> {
        Ok(BudgetRepo::find_budget(&self.pool, user_id)
            .await
            .map_err(store_error)?
            .map(Budget::from))
    }

    async fn upsert_budget(&self, user_id: DbId, budget: &Budget) -> Result<(), StoreError> {
        BudgetRepo::upsert_budget(&self.pool, user_id, budget)
            .await
            .map_err(store_error)
    }

    async fn add_spend(
        &self,
        user_id: DbId,
        month_key: &str,
        amount: f64,
    ) -> Result<f64, StoreError> {
        BudgetRepo::add_spend(&self.pool, user_id, month_key, amount)
            .await
            .map_err(store_error)
    }

    async fn month_spend(&self, user_id: DbId, month_key: &str) -> Result<f64, StoreError> {
        BudgetRepo::month_spend(&self.pool, user_id, month_key)
            .await
            .map_err(store_error)
    }

    async fn alert_stage(
        &self,
        user_id: DbId,
        month_key: &str,
    ) -> Result<AlertStage, StoreError> {
        BudgetRepo::alert_stage(&self.pool, user_id, month_key)
            .await
            .map_err(store_error)
    }

    async fn advance_alert_stage(
        &self,
        user_id: DbId,
        month_key: &str,
        to: AlertStage,
    ) -> Result<Option<AlertStage>, StoreError> {
        BudgetRepo::advance_alert_stage(&self.pool, user_id, month_key, to)
            .await
            .map_err(store_error)
    }

    async fn insert_alert(&self, alert: &BudgetAlert) -> Result<(), StoreError> {
        BudgetRepo::insert_alert(&self.pool, alert)
            .await
            .map_err(store_error)
    }
}

// ---------------------------------------------------------------------------
// Cost store
// ---------------------------------------------------------------------------

/// Postgres-backed cost record store.
#[derive(Clone)]
pub struct PgCostStore {
    pool: PgPool,
}

impl PgCostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CostStore for PgCostStore {
    async fn insert_record(&self, record: &CostRecord) -> Result<(), StoreError> {
        CostRecordRepo::insert(&self.pool, record)
            .await
            .map_err(store_error)
    }

    async fn records_in_range(
        &self,
        user_id: Option<DbId>,
        range: TimeRange,
    ) -> Result<Vec<CostRecord>, StoreError> {
        CostRecordRepo::list_in_range(&self.pool, user_id, range.start, range.end)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|row| CostRecord::try_from(row).map_err(decode_error))
            .collect()
    }
}
