use serde::{Deserialize, Serialize};

use super::domain::SourceRow;

/// Which strategy produced a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchSource {
    #[default]
    Rule,
    /// The address task failed; the record is kept so the batch stays complete
    Degraded,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Rule => "RULE",
            MatchSource::Degraded => "DEGRADED",
        }
    }
}

/// One scored candidate kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub poi_id: String,
    pub poi_name: String,
    pub score: f64,
    pub coverage: f64,
    pub edit_distance: f64,
    pub doorplate: f64,
}

/// Match decision for one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub order_id: String,
    pub raw_address: String,
    pub matched_poi_id: Option<String>,
    pub matched_poi_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub score: f64,
    pub source: MatchSource,
    pub candidates: Vec<ScoredCandidate>,
    /// Source cells of the address row; written as extra export columns
    #[serde(skip)]
    pub original_row: SourceRow,
}

impl MatchResult {
    pub fn unmatched(order_id: impl Into<String>, raw_address: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            raw_address: raw_address.into(),
            matched_poi_id: None,
            matched_poi_name: None,
            latitude: None,
            longitude: None,
            score: 0.0,
            source: MatchSource::Rule,
            candidates: Vec::new(),
            original_row: Vec::new(),
        }
    }

    pub fn degraded(order_id: impl Into<String>, raw_address: impl Into<String>) -> Self {
        Self {
            source: MatchSource::Degraded,
            ..Self::unmatched(order_id, raw_address)
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_poi_id.is_some()
    }
}
