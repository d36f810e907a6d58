// Model exports
pub mod domain;
pub mod results;

pub use domain::{AddressRecord, NormalizedAddress, PoiRecord, ScoringWeights, SourceRow};
pub use results::{MatchResult, MatchSource, ScoredCandidate};
