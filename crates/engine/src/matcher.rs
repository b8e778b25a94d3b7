//! Tiered match engine (PRD-41).
//!
//! Searches the cache store across four decreasing-strictness tiers, short-
//! circuiting on the first hit so a looser tier is never returned when a
//! stricter one has a candidate. Store failures degrade to "no candidates"
//! with a logged warning -- caching is an optimization, never a dependency
//! whose failure blocks generation.

use fabula_core::cache::CacheEntry;
use fabula_core::fingerprint::{fingerprint, normalize};
use fabula_core::request::GenerationRequest;
use fabula_core::store::CacheStore;
use fabula_core::tiering::{MatchResult, MatchTier, TierPolicy};

/// Find the best available match for a request.
///
/// Tier order: EXACT, FOUNDATION_ADAPTED, STRUCTURE_SIMILAR, GENRE_ADAPTED.
/// Malformed requests fingerprint to the invalid sentinel and miss
/// immediately.
pub async fn match_request(
    store: &dyn CacheStore,
    request: &GenerationRequest,
    policy: &TierPolicy,
) -> MatchResult {
    let fp = fingerprint(request, policy);
    if !fp.is_valid() {
        return MatchResult::Miss;
    }

    // Tier 1: EXACT -- verbatim reuse.
    match store.find_by_primary(&fp.primary).await {
        Ok(Some(entry)) => {
            return MatchResult::Hit {
                tier: MatchTier::Exact,
                entry,
                savings_ratio: 1.0,
            };
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Primary cache lookup failed -- treating as miss");
        }
    }

    // Family candidates back tiers 2 and 3; fetched once.
    let family_candidates = match store.find_by_family(&fp.family, request.kind).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(error = %e, "Family cache lookup failed -- treating as no candidates");
            Vec::new()
        }
    };

    // Tier 2: FOUNDATION_ADAPTED -- only for requests tied to an existing
    // foundation; candidates share the foundation but carry different prior
    // context, so most of the generation is reusable as adaptation context.
    if request.kind.supports_foundation_ref() {
        if let Some(foundation_id) = request.foundation_id {
            let best = pick_best(family_candidates.iter().filter(|e| {
                e.foundation_id == Some(foundation_id)
                    && e.prior_context_hash != request.prior_context_hash
            }));
            if let Some(entry) = best {
                return MatchResult::Hit {
                    tier: MatchTier::FoundationAdapted,
                    entry: entry.clone(),
                    savings_ratio: policy.savings_ratio(MatchTier::FoundationAdapted),
                };
            }
        }
    }

    // Tier 3: STRUCTURE_SIMILAR -- same kind, genre, and position bucket,
    // foundation ignored. The family key already encodes these; the explicit
    // guards keep the tier honest if candidates arrive from a wider query.
    let genre = normalize(&request.genre);
    let bucket = policy.position_bucket(request.chapter_number);
    let best = pick_best(
        family_candidates
            .iter()
            .filter(|e| e.genre == genre && e.position_bucket == bucket),
    );
    if let Some(entry) = best {
        return MatchResult::Hit {
            tier: MatchTier::StructureSimilar,
            entry: entry.clone(),
            savings_ratio: policy.savings_ratio(MatchTier::StructureSimilar),
        };
    }

    // Tier 4: GENRE_ADAPTED -- same kind and genre only. Restricted to early
    // units of work; late chapters are too specific to borrow across works.
    if bucket.allows_genre_adaptation() {
        let candidates = match store.find_by_kind_genre(request.kind, &genre).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(error = %e, "Genre cache lookup failed -- treating as no candidates");
                Vec::new()
            }
        };
        if let Some(entry) = pick_best(candidates.iter()) {
            return MatchResult::Hit {
                tier: MatchTier::GenreAdapted,
                entry: entry.clone(),
                savings_ratio: policy.savings_ratio(MatchTier::GenreAdapted),
            };
        }
    }

    MatchResult::Miss
}

/// Tie-break within a tier: most validated by reuse first (highest hit
/// count), then the most recently created.
fn pick_best<'a>(candidates: impl Iterator<Item = &'a CacheEntry>) -> Option<&'a CacheEntry> {
    candidates.max_by(|a, b| {
        a.hit_count
            .cmp(&b.hit_count)
            .then(a.created_at.cmp(&b.created_at))
    })
}
