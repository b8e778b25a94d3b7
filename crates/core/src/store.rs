//! Persistence seam traits.
//!
//! The engine talks to storage only through these traits. Implementations
//! must provide atomicity where the contract says so (`record_hit`,
//! `add_spend`, `advance_alert_stage`); callers never do read-modify-write
//! on those counters. `fabula-db` provides the Postgres implementations,
//! `fabula-engine::memory` the in-memory reference.

use async_trait::async_trait;

use crate::analytics::TimeRange;
use crate::budget::{AlertStage, Budget, BudgetAlert};
use crate::cache::{CacheEntry, NewCacheEntry};
use crate::pricing::CostRecord;
use crate::request::ContentKind;
use crate::types::DbId;

/// A storage operation failed. The engine layer degrades on these (reads
/// become misses, writes are logged and swallowed); they never reach the
/// caller of the generation flow.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage query failed: {0}")]
    Query(String),
}

// ---------------------------------------------------------------------------
// Cache store
// ---------------------------------------------------------------------------

/// Keyed lookups over cached generation artifacts.
///
/// Each lookup backs one match tier, so all of them must be indexable keyed
/// reads, not scans. Eviction is external to this trait; an absent entry is
/// a normal result.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Exact lookup by primary fingerprint.
    async fn find_by_primary(&self, primary: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Candidates sharing a family fingerprint, filtered to a content kind.
    async fn find_by_family(
        &self,
        family: &str,
        kind: ContentKind,
    ) -> Result<Vec<CacheEntry>, StoreError>;

    /// Candidates sharing only content kind and normalized genre, for the
    /// loosest tier.
    async fn find_by_kind_genre(
        &self,
        kind: ContentKind,
        genre: &str,
    ) -> Result<Vec<CacheEntry>, StoreError>;

    /// Insert a freshly generated artifact.
    ///
    /// Idempotent on the primary fingerprint: an existing entry with the
    /// same content hash is left untouched; a different content hash
    /// replaces the artifact (a real change occurred). Never duplicates.
    async fn insert(&self, entry: NewCacheEntry) -> Result<(), StoreError>;

    /// Atomically increment an entry's hit counter and touch its
    /// last-access timestamp. Missing entries (evicted concurrently) are a
    /// no-op, not an error.
    async fn record_hit(&self, entry_id: DbId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Budget store
// ---------------------------------------------------------------------------

/// Budget configuration, month spend ledger, and alert stage persistence.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn find_budget(&self, user_id: DbId) -> Result<Option<Budget>, StoreError>;

    async fn upsert_budget(&self, user_id: DbId, budget: &Budget) -> Result<(), StoreError>;

    /// Atomically add to a user's month-to-date spend and return the new
    /// total. Two concurrent spends for the same user must both land.
    async fn add_spend(
        &self,
        user_id: DbId,
        month_key: &str,
        amount: f64,
    ) -> Result<f64, StoreError>;

    /// Month-to-date spend; 0 for a month with no ledger row.
    async fn month_spend(&self, user_id: DbId, month_key: &str) -> Result<f64, StoreError>;

    /// Current alert stage for a user-month; `Normal` when none recorded.
    async fn alert_stage(&self, user_id: DbId, month_key: &str)
        -> Result<AlertStage, StoreError>;

    /// Advance the user-month alert stage, but only forward. Returns the
    /// stage this call replaced when it moved the stage, `None` when it
    /// did not. The replaced stage must come from the same atomic step as
    /// the write: the caller derives which severities to emit from it, so
    /// a concurrently advanced stage must be reflected here, never a stale
    /// earlier read.
    async fn advance_alert_stage(
        &self,
        user_id: DbId,
        month_key: &str,
        to: AlertStage,
    ) -> Result<Option<AlertStage>, StoreError>;

    /// Persist an emitted alert for the notification/analytics layer.
    async fn insert_alert(&self, alert: &BudgetAlert) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Cost store
// ---------------------------------------------------------------------------

/// Append-only cost record persistence and range reads for analytics.
#[async_trait]
pub trait CostStore: Send + Sync {
    async fn insert_record(&self, record: &CostRecord) -> Result<(), StoreError>;

    /// Records within a window, optionally filtered to one user. `None`
    /// is the privileged system-wide read.
    async fn records_in_range(
        &self,
        user_id: Option<DbId>,
        range: TimeRange,
    ) -> Result<Vec<CostRecord>, StoreError>;
}
