//! Generation request types and validation (PRD-40).
//!
//! A [`GenerationRequest`] is the semantic description of one piece of
//! content the platform wants generated. It is immutable and lives only for
//! the duration of a single cache lookup; nothing here touches storage.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Hard ceiling on premise length fed into fingerprinting, in characters.
pub const MAX_PREMISE_CHARS: usize = 8_000;

// ---------------------------------------------------------------------------
// Content kind
// ---------------------------------------------------------------------------

/// The kind of artifact a request asks for.
///
/// Closed set: tier applicability rules in the match engine are expressed as
/// explicit guards over this enum, not per-kind dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A story foundation: world, cast, and arc for a whole work.
    Foundation,
    /// A single chapter within an existing foundation.
    Chapter,
    /// A character sheet tied to a foundation.
    Character,
    /// Cover copy / blurb for a work.
    Cover,
}

impl ContentKind {
    /// Stable lowercase label, used in fingerprints and storage columns.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Chapter => "chapter",
            Self::Character => "character",
            Self::Cover => "cover",
        }
    }

    /// Parse a storage label back into a kind.
    pub fn parse(label: &str) -> Option<Self> {
        [Self::Foundation, Self::Chapter, Self::Character, Self::Cover]
            .into_iter()
            .find(|k| k.as_str() == label)
    }

    /// Whether requests of this kind can be tied to a parent foundation.
    pub fn supports_foundation_ref(self) -> bool {
        matches!(self, Self::Chapter | Self::Character)
    }

    /// Whether this kind carries a structural position (chapter number).
    pub fn is_positional(self) -> bool {
        matches!(self, Self::Chapter)
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// The semantic inputs of one generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: ContentKind,
    /// Genre / category label, e.g. "Fantasy". Matched case-insensitively.
    pub genre: String,
    /// Free-text premise or prompt for the unit of work.
    pub premise: String,
    /// Structural position within the work (chapter number, 1-based).
    pub chapter_number: Option<i32>,
    /// Parent foundation this request belongs to, if any.
    pub foundation_id: Option<DbId>,
    /// Digest of previously generated context (e.g. prior chapters).
    pub prior_context_hash: Option<String>,
}

impl GenerationRequest {
    /// Whether the request carries fields fingerprinting can work with:
    /// non-blank genre and premise, premise within [`MAX_PREMISE_CHARS`],
    /// and a 1-based chapter number when one is present.
    ///
    /// A malformed request is *not* an error -- it fingerprints to the
    /// reserved invalid value and behaves as a guaranteed cache miss.
    pub fn is_well_formed(&self) -> bool {
        if self.genre.trim().is_empty() || self.premise.trim().is_empty() {
            return false;
        }
        if self.premise.chars().count() > MAX_PREMISE_CHARS {
            return false;
        }
        self.chapter_number.map_or(true, |n| n >= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(genre: &str, premise: &str) -> GenerationRequest {
        GenerationRequest {
            kind: ContentKind::Foundation,
            genre: genre.to_string(),
            premise: premise.to_string(),
            chapter_number: None,
            foundation_id: None,
            prior_context_hash: None,
        }
    }

    #[test]
    fn well_formed_with_genre_and_premise() {
        assert!(request("Fantasy", "A thief steals time itself").is_well_formed());
    }

    #[test]
    fn blank_genre_is_malformed() {
        assert!(!request("   ", "A thief steals time itself").is_well_formed());
    }

    #[test]
    fn blank_premise_is_malformed() {
        assert!(!request("Fantasy", "").is_well_formed());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(ContentKind::Foundation.as_str(), "foundation");
        assert_eq!(ContentKind::Chapter.as_str(), "chapter");
        assert_eq!(ContentKind::Character.as_str(), "character");
        assert_eq!(ContentKind::Cover.as_str(), "cover");
    }

    #[test]
    fn kind_labels_round_trip() {
        for kind in [
            ContentKind::Foundation,
            ContentKind::Chapter,
            ContentKind::Character,
            ContentKind::Cover,
        ] {
            assert_eq!(ContentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ContentKind::parse("poem"), None);
    }

    #[test]
    fn foundation_ref_support_by_kind() {
        assert!(ContentKind::Chapter.supports_foundation_ref());
        assert!(ContentKind::Character.supports_foundation_ref());
        assert!(!ContentKind::Foundation.supports_foundation_ref());
        assert!(!ContentKind::Cover.supports_foundation_ref());
    }

    #[test]
    fn zero_chapter_number_is_malformed() {
        let mut req = request("Fantasy", "premise");
        req.chapter_number = Some(0);
        assert!(!req.is_well_formed());
        req.chapter_number = Some(1);
        assert!(req.is_well_formed());
    }

    #[test]
    fn oversized_premise_is_malformed() {
        let req = request("Fantasy", &"x".repeat(MAX_PREMISE_CHARS + 1));
        assert!(!req.is_well_formed());
        let req = request("Fantasy", &"x".repeat(MAX_PREMISE_CHARS));
        assert!(req.is_well_formed());
    }
}
