//! Match tiers, tier policy, and match results (PRD-41).
//!
//! The four tiers trade exactness for reuse opportunity, from verbatim reuse
//! (EXACT) down to borrowing unrelated same-genre content for early units of
//! work (GENRE_ADAPTED). Tier ordering is strict: the match engine never
//! returns a looser tier when a stricter one has a candidate.

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Default tier policy constants
// ---------------------------------------------------------------------------

/// Default savings ratio for FOUNDATION_ADAPTED: the foundation context is
/// reusable, only the delta is freshly generated.
pub const DEFAULT_FOUNDATION_ADAPTED_RATIO: f64 = 0.7;
/// Default savings ratio for STRUCTURE_SIMILAR.
pub const DEFAULT_STRUCTURE_SIMILAR_RATIO: f64 = 0.5;
/// Default savings ratio for GENRE_ADAPTED.
pub const DEFAULT_GENRE_ADAPTED_RATIO: f64 = 0.4;
/// Chapters up to this number count as "early" (safe for genre adaptation).
pub const DEFAULT_EARLY_CHAPTER_MAX: i32 = 3;
/// Chapters from this number on count as "late" (never genre-adapted).
pub const DEFAULT_LATE_CHAPTER_MIN: i32 = 10;

// ---------------------------------------------------------------------------
// Match tier
// ---------------------------------------------------------------------------

/// One of the four decreasing-strictness match strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Primary fingerprint match; the artifact is reused verbatim.
    Exact,
    /// Same foundation, different prior context; reuse as adaptation context.
    FoundationAdapted,
    /// Same kind, genre, and structural position bucket.
    StructureSimilar,
    /// Same kind and genre only; early units of work only.
    GenreAdapted,
}

impl MatchTier {
    /// All tiers in match order, strictest first.
    pub const ALL: [MatchTier; 4] = [
        Self::Exact,
        Self::FoundationAdapted,
        Self::StructureSimilar,
        Self::GenreAdapted,
    ];

    /// Stable lowercase label, used in storage columns and rollup keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::FoundationAdapted => "foundation_adapted",
            Self::StructureSimilar => "structure_similar",
            Self::GenreAdapted => "genre_adapted",
        }
    }

    /// Parse a storage label back into a tier.
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == label)
    }
}

// ---------------------------------------------------------------------------
// Position bucket
// ---------------------------------------------------------------------------

/// Coarse structural-position bucket used by the family fingerprint and the
/// STRUCTURE_SIMILAR / GENRE_ADAPTED guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionBucket {
    /// Early chapters: generic enough to reuse across works.
    Early,
    Middle,
    /// Late chapters: never reused across works, to avoid narrative drift.
    Late,
    /// Kinds without a structural position (foundations, covers, characters).
    Unpositioned,
}

impl PositionBucket {
    /// Stable lowercase label, used in fingerprints and storage columns.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Middle => "middle",
            Self::Late => "late",
            Self::Unpositioned => "unpositioned",
        }
    }

    /// Parse a storage label back into a bucket.
    pub fn parse(label: &str) -> Option<Self> {
        [Self::Early, Self::Middle, Self::Late, Self::Unpositioned]
            .into_iter()
            .find(|b| b.as_str() == label)
    }

    /// Whether requests in this bucket may be served by GENRE_ADAPTED.
    pub fn allows_genre_adaptation(self) -> bool {
        matches!(self, Self::Early | Self::Unpositioned)
    }
}

// ---------------------------------------------------------------------------
// Tier policy
// ---------------------------------------------------------------------------

/// Configurable tier heuristics: savings ratios and chapter bucket
/// boundaries. Supplied at startup; EXACT is always 1.0 and not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPolicy {
    pub foundation_adapted_ratio: f64,
    pub structure_similar_ratio: f64,
    pub genre_adapted_ratio: f64,
    /// Highest chapter number still bucketed as `Early`.
    pub early_chapter_max: i32,
    /// Lowest chapter number bucketed as `Late`.
    pub late_chapter_min: i32,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            foundation_adapted_ratio: DEFAULT_FOUNDATION_ADAPTED_RATIO,
            structure_similar_ratio: DEFAULT_STRUCTURE_SIMILAR_RATIO,
            genre_adapted_ratio: DEFAULT_GENRE_ADAPTED_RATIO,
            early_chapter_max: DEFAULT_EARLY_CHAPTER_MAX,
            late_chapter_min: DEFAULT_LATE_CHAPTER_MIN,
        }
    }
}

impl TierPolicy {
    /// Validate ratio bounds and bucket boundary ordering.
    ///
    /// Non-exact ratios must stay strictly below 1.0: a savings ratio of 1.0
    /// is reserved for EXACT matches.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, ratio) in [
            ("foundation_adapted_ratio", self.foundation_adapted_ratio),
            ("structure_similar_ratio", self.structure_similar_ratio),
            ("genre_adapted_ratio", self.genre_adapted_ratio),
        ] {
            if !(0.0..1.0).contains(&ratio) {
                return Err(CoreError::Validation(format!(
                    "{name} must be in [0, 1), got {ratio}"
                )));
            }
        }
        if self.early_chapter_max < 1 || self.late_chapter_min <= self.early_chapter_max {
            return Err(CoreError::Validation(format!(
                "Chapter buckets require 1 <= early_chapter_max < late_chapter_min, \
                 got early_chapter_max={}, late_chapter_min={}",
                self.early_chapter_max, self.late_chapter_min
            )));
        }
        Ok(())
    }

    /// Savings ratio for a tier under this policy.
    pub fn savings_ratio(&self, tier: MatchTier) -> f64 {
        match tier {
            MatchTier::Exact => 1.0,
            MatchTier::FoundationAdapted => self.foundation_adapted_ratio,
            MatchTier::StructureSimilar => self.structure_similar_ratio,
            MatchTier::GenreAdapted => self.genre_adapted_ratio,
        }
    }

    /// Bucket a request's structural position.
    pub fn position_bucket(&self, chapter_number: Option<i32>) -> PositionBucket {
        match chapter_number {
            None => PositionBucket::Unpositioned,
            Some(n) if n <= self.early_chapter_max => PositionBucket::Early,
            Some(n) if n < self.late_chapter_min => PositionBucket::Middle,
            Some(_) => PositionBucket::Late,
        }
    }
}

// ---------------------------------------------------------------------------
// Match result
// ---------------------------------------------------------------------------

/// Outcome of a tiered match lookup. Transient, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchResult {
    Hit {
        tier: MatchTier,
        entry: CacheEntry,
        /// Fraction of a fresh generation's cost assumed avoided. In [0, 1];
        /// exactly 1.0 only for [`MatchTier::Exact`].
        savings_ratio: f64,
    },
    Miss,
}

impl MatchResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    pub fn tier(&self) -> Option<MatchTier> {
        match self {
            Self::Hit { tier, .. } => Some(*tier),
            Self::Miss => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(TierPolicy::default().validate().is_ok());
    }

    #[test]
    fn exact_ratio_is_always_one() {
        assert!((TierPolicy::default().savings_ratio(MatchTier::Exact) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_exact_ratios_below_one() {
        let policy = TierPolicy::default();
        for tier in [
            MatchTier::FoundationAdapted,
            MatchTier::StructureSimilar,
            MatchTier::GenreAdapted,
        ] {
            let ratio = policy.savings_ratio(tier);
            assert!((0.0..1.0).contains(&ratio), "{tier:?} ratio {ratio}");
        }
    }

    #[test]
    fn ratio_of_one_rejected_for_non_exact() {
        let policy = TierPolicy {
            foundation_adapted_ratio: 1.0,
            ..TierPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn inverted_bucket_boundaries_rejected() {
        let policy = TierPolicy {
            early_chapter_max: 10,
            late_chapter_min: 5,
            ..TierPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn chapter_bucketing_boundaries() {
        let policy = TierPolicy::default();
        assert_eq!(policy.position_bucket(None), PositionBucket::Unpositioned);
        assert_eq!(policy.position_bucket(Some(1)), PositionBucket::Early);
        assert_eq!(
            policy.position_bucket(Some(DEFAULT_EARLY_CHAPTER_MAX)),
            PositionBucket::Early
        );
        assert_eq!(
            policy.position_bucket(Some(DEFAULT_EARLY_CHAPTER_MAX + 1)),
            PositionBucket::Middle
        );
        assert_eq!(
            policy.position_bucket(Some(DEFAULT_LATE_CHAPTER_MIN)),
            PositionBucket::Late
        );
    }

    #[test]
    fn genre_adaptation_guard_by_bucket() {
        assert!(PositionBucket::Early.allows_genre_adaptation());
        assert!(PositionBucket::Unpositioned.allows_genre_adaptation());
        assert!(!PositionBucket::Middle.allows_genre_adaptation());
        assert!(!PositionBucket::Late.allows_genre_adaptation());
    }

    #[test]
    fn tier_labels_round_trip() {
        for tier in MatchTier::ALL {
            assert_eq!(MatchTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(MatchTier::parse("nonsense"), None);
    }
}
