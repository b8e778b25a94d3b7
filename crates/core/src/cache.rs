//! Cached generation artifacts (PRD-40).
//!
//! A [`CacheEntry`] is immutable in its content: a changed artifact is a new
//! entry under a new content hash. Only the hit counter and last-access
//! timestamp mutate, and only through [`crate::store::CacheStore::record_hit`].
//! Eviction is external; absence of an entry is always a valid state.

use serde::{Deserialize, Serialize};

use crate::fingerprint::{normalize, Fingerprint};
use crate::hashing::sha256_hex;
use crate::pricing::TokenUsage;
use crate::request::{ContentKind, GenerationRequest};
use crate::tiering::{PositionBucket, TierPolicy};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A stored generation artifact plus the metadata the match tiers filter on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: DbId,
    /// Strict fingerprint the artifact was created under.
    pub primary_fingerprint: String,
    /// Looser family fingerprint for fallback tiers.
    pub family_fingerprint: String,
    pub kind: ContentKind,
    /// Normalized genre label (lowercased, whitespace-collapsed).
    pub genre: String,
    pub position_bucket: PositionBucket,
    pub foundation_id: Option<DbId>,
    pub prior_context_hash: Option<String>,
    /// The generated artifact. Never mutated in place.
    pub content: String,
    /// SHA-256 of `content`, used for idempotent inserts.
    pub content_hash: String,
    /// Provider model class that produced the artifact.
    pub model_class: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Provider cost at creation time, before markup.
    pub actual_cost: f64,
    /// Times this entry has been served. Monotonically non-decreasing.
    pub hit_count: i64,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
}

impl CacheEntry {
    /// Token usage recorded at creation, used as the default fresh-cost
    /// estimate when computing savings for a hit.
    pub fn token_usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Insert DTO
// ---------------------------------------------------------------------------

/// DTO for backfilling the cache after a fresh generation completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCacheEntry {
    pub primary_fingerprint: String,
    pub family_fingerprint: String,
    pub kind: ContentKind,
    pub genre: String,
    pub position_bucket: PositionBucket,
    pub foundation_id: Option<DbId>,
    pub prior_context_hash: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub model_class: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub actual_cost: f64,
}

impl NewCacheEntry {
    /// Build an insertable entry from the request that missed and the fresh
    /// generation result. The content hash is derived here so every insert
    /// path compares hashes the same way.
    pub fn from_generation(
        request: &GenerationRequest,
        fingerprint: &Fingerprint,
        policy: &TierPolicy,
        content: String,
        model_class: String,
        usage: TokenUsage,
        actual_cost: f64,
    ) -> Self {
        let content_hash = sha256_hex(content.as_bytes());
        Self {
            primary_fingerprint: fingerprint.primary.clone(),
            family_fingerprint: fingerprint.family.clone(),
            kind: request.kind,
            genre: normalize(&request.genre),
            position_bucket: policy.position_bucket(request.chapter_number),
            foundation_id: request.foundation_id,
            prior_context_hash: request.prior_context_hash.clone(),
            content,
            content_hash,
            model_class,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            actual_cost,
        }
    }
}
