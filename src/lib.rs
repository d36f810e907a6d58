//! Geo Matcher - batch matching of delivery addresses against geocoded POIs
//!
//! This library provides the candidate retrieval and scoring engine: an
//! inverted index over POI text, lexical and semantic retrievers, a
//! multi-factor scorer and a concurrent batch orchestrator.

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{MatchingSettings, Settings};
pub use core::{BasicNormalizer, CatalogIndex, MatchError, Matcher, Normalizer, Retriever, Scorer};
pub use models::{AddressRecord, MatchResult, MatchSource, NormalizedAddress, PoiRecord, ScoredCandidate, ScoringWeights};
