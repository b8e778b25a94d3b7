//! Request fingerprinting for cache key derivation (PRD-40).
//!
//! Two keys are derived from every request: a strict `primary` fingerprint
//! (exact reuse) and a looser `family` fingerprint that deliberately discards
//! volatile detail so semantically-similar requests collapse together. Both
//! are SHA-256 hex digests over normalized fields; there is no storage or
//! network access anywhere in this module.

use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex_fields;
use crate::request::GenerationRequest;
use crate::tiering::TierPolicy;

// ---------------------------------------------------------------------------
// Theme bucket parameters
// ---------------------------------------------------------------------------

/// Maximum number of theme keywords folded into the family fingerprint.
pub const MAX_THEME_KEYWORDS: usize = 5;
/// Minimum significant-word length to count as a theme keyword.
pub const MIN_KEYWORD_CHARS: usize = 4;
/// Keywords are truncated to this many characters as a cheap stem.
pub const KEYWORD_STEM_CHARS: usize = 6;

/// Common English words that carry no theme signal.
const STOP_WORDS: &[&str] = &[
    "about", "after", "against", "along", "because", "been", "before", "being", "between", "could",
    "does", "each", "every", "from", "have", "having", "into", "itself", "more", "most", "must",
    "only", "other", "over", "same", "shall", "should", "some", "such", "than", "that", "their",
    "them", "then", "there", "these", "they", "this", "through", "under", "until", "upon", "very",
    "were", "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

// ---------------------------------------------------------------------------
// Fingerprint value
// ---------------------------------------------------------------------------

/// A derived request identity. Value type: recomputed on demand, never
/// mutated, not owned by any entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Strict key: identical (post-normalization) inputs only.
    pub primary: String,
    /// Family key: genre + theme bucket + position bucket.
    pub family: String,
}

/// Reserved value produced for malformed requests. Treated by the match
/// engine as a guaranteed miss; never stored.
pub const INVALID_FINGERPRINT: &str = "invalid";

impl Fingerprint {
    /// The reserved fingerprint for requests missing genre or premise.
    pub fn invalid() -> Self {
        Self {
            primary: INVALID_FINGERPRINT.to_string(),
            family: INVALID_FINGERPRINT.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.primary != INVALID_FINGERPRINT
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize free text for hashing: trim, Unicode-lowercase, and collapse
/// every run of whitespace to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the coarse theme bucket of a premise: significant words,
/// stop-word filtered, truncated to a cheap stem, deduplicated, sorted, and
/// capped at [`MAX_THEME_KEYWORDS`]. Sorting makes the bucket independent of
/// word order in the premise.
pub fn theme_bucket(premise: &str) -> String {
    let mut keywords: Vec<String> = normalize(premise)
        .split(' ')
        .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| w.chars().take(KEYWORD_STEM_CHARS).collect())
        .collect();
    keywords.sort();
    keywords.dedup();
    keywords.truncate(MAX_THEME_KEYWORDS);
    keywords.join(" ")
}

// ---------------------------------------------------------------------------
// Fingerprint derivation
// ---------------------------------------------------------------------------

/// Derive both fingerprints for a request.
///
/// Malformed requests (blank genre or premise) produce the reserved
/// [`INVALID_FINGERPRINT`] value instead of an error, so callers can treat
/// them as an automatic cache miss. The content kind participates in both
/// digests so identical premises for different kinds never collide.
pub fn fingerprint(request: &GenerationRequest, policy: &TierPolicy) -> Fingerprint {
    if !request.is_well_formed() {
        return Fingerprint::invalid();
    }

    let kind = request.kind.as_str();
    let genre = normalize(&request.genre);
    let premise = normalize(&request.premise);
    let chapter = request
        .chapter_number
        .map(|n| n.to_string())
        .unwrap_or_default();
    let prior = request.prior_context_hash.clone().unwrap_or_default();

    let primary = sha256_hex_fields(&[kind, &genre, &premise, &chapter, &prior]);

    let bucket = policy.position_bucket(request.chapter_number);
    let family = sha256_hex_fields(&[kind, &genre, &theme_bucket(&request.premise), bucket.as_str()]);

    Fingerprint { primary, family }
}
