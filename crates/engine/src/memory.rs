//! In-memory reference implementation of the store traits.
//!
//! Backs the engine's tests and any deployment that wants caching without a
//! database. All maps live behind one mutex, which gives `record_hit` /
//! `add_spend` / `advance_alert_stage` the same lost-update-free semantics
//! the Postgres implementation gets from atomic SQL updates. Locks are never
//! held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use fabula_core::analytics::TimeRange;
use fabula_core::budget::{AlertStage, Budget, BudgetAlert};
use fabula_core::cache::{CacheEntry, NewCacheEntry};
use fabula_core::pricing::CostRecord;
use fabula_core::request::ContentKind;
use fabula_core::store::{BudgetStore, CacheStore, CostStore, StoreError};
use fabula_core::types::DbId;

#[derive(Default)]
struct State {
    next_entry_id: DbId,
    entries: HashMap<DbId, CacheEntry>,
    id_by_primary: HashMap<String, DbId>,
    budgets: HashMap<DbId, Budget>,
    month_spend: HashMap<(DbId, String), f64>,
    alert_stages: HashMap<(DbId, String), AlertStage>,
    alerts: Vec<BudgetAlert>,
    cost_records: Vec<CostRecord>,
}

/// Mutex-guarded in-memory store implementing all three seam traits.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cache entries currently stored. Test/diagnostic helper.
    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Alerts emitted so far. Test/diagnostic helper.
    pub fn alert_count(&self) -> usize {
        self.lock().alerts.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Lock poisoning only happens if a holder panicked; the maps are
        // still structurally sound, so recover rather than cascade.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn find_by_primary(&self, primary: &str) -> Result<Option<CacheEntry>, StoreError> {
        let state = self.lock();
        Ok(state
            .id_by_primary
            .get(primary)
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn find_by_family(
        &self,
        family: &str,
        kind: ContentKind,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let state = self.lock();
        Ok(state
            .entries
            .values()
            .filter(|e| e.family_fingerprint == family && e.kind == kind)
            .cloned()
            .collect())
    }

    async fn find_by_kind_genre(
        &self,
        kind: ContentKind,
        genre: &str,
    ) -> Result<Vec<CacheEntry>, StoreError> {
        let state = self.lock();
        Ok(state
            .entries
            .values()
            .filter(|e| e.kind == kind && e.genre == genre)
            .cloned()
            .collect())
    }

    async fn insert(&self, entry: NewCacheEntry) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(existing_id) = state.id_by_primary.get(&entry.primary_fingerprint).copied() {
            let unchanged = state
                .entries
                .get(&existing_id)
                .is_some_and(|e| e.content_hash == entry.content_hash);
            if unchanged {
                return Ok(());
            }
            // Content really changed: the old artifact is replaced by a new
            // entry with fresh usage statistics.
            state.entries.remove(&existing_id);
        }

        state.next_entry_id += 1;
        let id = state.next_entry_id;
        let now = Utc::now();
        state.id_by_primary.insert(entry.primary_fingerprint.clone(), id);
        state.entries.insert(
            id,
            CacheEntry {
                id,
                primary_fingerprint: entry.primary_fingerprint,
                family_fingerprint: entry.family_fingerprint,
                kind: entry.kind,
                genre: entry.genre,
                position_bucket: entry.position_bucket,
                foundation_id: entry.foundation_id,
                prior_context_hash: entry.prior_context_hash,
                content: entry.content,
                content_hash: entry.content_hash,
                model_class: entry.model_class,
                input_tokens: entry.input_tokens,
                output_tokens: entry.output_tokens,
                actual_cost: entry.actual_cost,
                hit_count: 0,
                created_at: now,
                last_accessed_at: now,
            },
        );
        Ok(())
    }

    async fn record_hit(&self, entry_id: DbId) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(&entry_id) {
            entry.hit_count += 1;
            entry.last_accessed_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn find_budget(&self, user_id: DbId) -> Result<Option<Budget>, StoreError> {
        Ok(self.lock().budgets.get(&user_id).cloned())
    }

    async fn upsert_budget(&self, user_id: DbId, budget: &Budget) -> Result<(), StoreError> {
        self.lock().budgets.insert(user_id, budget.clone());
        Ok(())
    }

    async fn add_spend(
        &self,
        user_id: DbId,
        month_key: &str,
        amount: f64,
    ) -> Result<f64, StoreError> {
        let mut state = self.lock();
        let total = state
            .month_spend
            .entry((user_id, month_key.to_string()))
            .or_insert(0.0);
        *total += amount;
        Ok(*total)
    }

    async fn month_spend(&self, user_id: DbId, month_key: &str) -> Result<f64, StoreError> {
        Ok(self
            .lock()
            .month_spend
            .get(&(user_id, month_key.to_string()))
            .copied()
            .unwrap_or(0.0))
    }

    async fn alert_stage(
        &self,
        user_id: DbId,
        month_key: &str,
    ) -> Result<AlertStage, StoreError> {
        Ok(self
            .lock()
            .alert_stages
            .get(&(user_id, month_key.to_string()))
            .copied()
            .unwrap_or(AlertStage::Normal))
    }

    async fn advance_alert_stage(
        &self,
        user_id: DbId,
        month_key: &str,
        to: AlertStage,
    ) -> Result<Option<AlertStage>, StoreError> {
        let mut state = self.lock();
        let stage = state
            .alert_stages
            .entry((user_id, month_key.to_string()))
            .or_insert(AlertStage::Normal);
        if to > *stage {
            let previous = *stage;
            *stage = to;
            Ok(Some(previous))
        } else {
            Ok(None)
        }
    }

    async fn insert_alert(&self, alert: &BudgetAlert) -> Result<(), StoreError> {
        self.lock().alerts.push(alert.clone());
        Ok(())
    }
}

#[async_trait]
impl CostStore for MemoryStore {
    async fn insert_record(&self, record: &CostRecord) -> Result<(), StoreError> {
        self.lock().cost_records.push(record.clone());
        Ok(())
    }

    async fn records_in_range(
        &self,
        user_id: Option<DbId>,
        range: TimeRange,
    ) -> Result<Vec<CostRecord>, StoreError> {
        Ok(self
            .lock()
            .cost_records
            .iter()
            .filter(|r| user_id.map_or(true, |u| r.user_id == u))
            .filter(|r| range.contains(r.created_at))
            .cloned()
            .collect())
    }
}
