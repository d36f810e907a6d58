// Core algorithm exports
pub mod embedding;
pub mod index;
pub mod matcher;
pub mod normalizer;
pub mod retriever;
pub mod scoring;

pub use embedding::{load_embedder, CharNgramEmbedder, Embedder, EmbeddingError};
pub use index::CatalogIndex;
pub use matcher::{MatchError, Matcher};
pub use normalizer::{BasicNormalizer, Normalizer};
pub use retriever::{LexicalRetriever, RetrievalError, Retriever, SemanticRetriever};
pub use scoring::{doorplate_score, edit_similarity, token_coverage, Scorer};
