use std::cmp::Ordering;

use crate::models::{
    AddressRecord, MatchResult, MatchSource, NormalizedAddress, PoiRecord, ScoredCandidate, ScoringWeights,
};

/// Doorplate score when both sides carry a house number and they differ
pub const DOORPLATE_MISMATCH_SCORE: f64 = 0.2;

/// Combines coverage, edit-distance and doorplate signals into one decision
///
/// Scoring formula:
/// score = (
///     coverage * weights.coverage +           # shared tokens / address tokens
///     edit_similarity * weights.edit_distance + # 1 - levenshtein / max_len
///     doorplate * weights.doorplate            # 1.0 equal, 0.2 differ, 0.0 missing
/// )
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score every candidate and pick the best one at or above `min_score`
    ///
    /// The returned candidate list is ranked by total score; equal scores keep
    /// their input order, so the first-seen candidate wins a tie.
    pub fn score(
        &self,
        address: &AddressRecord,
        normalized: &NormalizedAddress,
        candidates: &[&PoiRecord],
        min_score: f64,
    ) -> MatchResult {
        let mut scored: Vec<(ScoredCandidate, &PoiRecord)> = candidates
            .iter()
            .map(|poi| (self.score_candidate(normalized, poi), *poi))
            .collect();

        // Stable sort keeps input order among equal totals
        scored.sort_by(|a, b| b.0.score.partial_cmp(&a.0.score).unwrap_or(Ordering::Equal));

        let mut result = MatchResult::unmatched(&address.order_id, &address.raw_address);

        if let Some((best, poi)) = scored.first() {
            result.score = best.score;
            if best.score >= min_score {
                result.matched_poi_id = Some(poi.id.clone());
                result.matched_poi_name = Some(poi.name.clone());
                result.latitude = Some(poi.latitude);
                result.longitude = Some(poi.longitude);
                result.source = MatchSource::Rule;
            }
        }

        result.candidates = scored.into_iter().map(|(candidate, _)| candidate).collect();
        result
    }

    fn score_candidate(&self, normalized: &NormalizedAddress, poi: &PoiRecord) -> ScoredCandidate {
        let poi_tokens: Vec<&str> = poi.tokens().collect();

        let coverage = token_coverage(&normalized.tokens, &poi_tokens);
        let edit_distance = edit_similarity(&normalized.text, poi.normalized_text());
        let doorplate = doorplate_score(normalized.house_number.as_deref(), Some(poi.house_number.as_str()));

        let total = coverage * self.weights.coverage
            + edit_distance * self.weights.edit_distance
            + doorplate * self.weights.doorplate;

        ScoredCandidate {
            poi_id: poi.id.clone(),
            poi_name: poi.name.clone(),
            score: total,
            coverage,
            edit_distance,
            doorplate,
        }
    }
}

/// Fraction of address tokens that also appear among the POI tokens
#[inline]
pub fn token_coverage<S: AsRef<str>>(address_tokens: &[S], poi_tokens: &[&str]) -> f64 {
    if address_tokens.is_empty() {
        return 0.0;
    }

    let hits = address_tokens
        .iter()
        .filter(|token| poi_tokens.contains(&token.as_ref()))
        .count();

    hits as f64 / address_tokens.len() as f64
}

/// `1 - levenshtein / max_len` over characters; 1.0 when either side is empty
#[inline]
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = strsim::levenshtein(a, b);

    1.0 - distance as f64 / max_len as f64
}

/// 1.0 for equal house numbers, 0.2 when both present but different, else 0.0
#[inline]
pub fn doorplate_score(address_house: Option<&str>, poi_house: Option<&str>) -> f64 {
    match (address_house, poi_house) {
        (Some(a), Some(p)) if !a.is_empty() && !p.is_empty() => {
            if a == p {
                1.0
            } else {
                DOORPLATE_MISMATCH_SCORE
            }
        }
        _ => 0.0,
    }
}
