use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;

use crate::core::embedding::{dot, Embedder, EmbeddingError};
use crate::core::index::CatalogIndex;
use crate::models::PoiRecord;

/// Errors raised while retrieving candidates for one query
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("{retriever} retriever failed: {source}")]
    Embedding {
        retriever: &'static str,
        #[source]
        source: EmbeddingError,
    },

    #[error("query embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Candidate retrieval capability
///
/// Retrievers are read-only over shared catalog state, so one instance can
/// serve many matching tasks at once.
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    fn query<'a>(
        &'a self,
        normalized_text: &str,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<&'a PoiRecord>, RetrievalError>;
}

/// Token lookup in the catalog's inverted index
#[derive(Debug, Clone)]
pub struct LexicalRetriever {
    catalog: Arc<CatalogIndex>,
}

impl LexicalRetriever {
    pub fn new(catalog: Arc<CatalogIndex>) -> Self {
        Self { catalog }
    }
}

impl Retriever for LexicalRetriever {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn query<'a>(
        &'a self,
        _normalized_text: &str,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<&'a PoiRecord>, RetrievalError> {
        Ok(self.catalog.query(tokens, limit))
    }
}

/// Vector similarity against pre-encoded POI texts
pub struct SemanticRetriever {
    catalog: Arc<CatalogIndex>,
    embedder: Arc<dyn Embedder>,
    /// One row per catalog POI, in catalog order
    matrix: Vec<Vec<f32>>,
}

impl std::fmt::Debug for SemanticRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRetriever")
            .field("embedder", &self.embedder.name())
            .field("dimension", &self.embedder.dimension())
            .field("rows", &self.matrix.len())
            .finish()
    }
}

impl SemanticRetriever {
    /// Encode every catalog POI once
    pub fn new(catalog: Arc<CatalogIndex>, embedder: Arc<dyn Embedder>) -> Result<Self, EmbeddingError> {
        let texts: Vec<&str> = catalog.pois().iter().map(PoiRecord::normalized_text).collect();
        let matrix = embedder.encode_batch(&texts)?;

        if let Some(row) = matrix.iter().find(|row| row.len() != embedder.dimension()) {
            return Err(EmbeddingError::InvalidConfig {
                reason: format!(
                    "embedder {} produced dimension {}, declared {}",
                    embedder.name(),
                    row.len(),
                    embedder.dimension()
                ),
            });
        }

        tracing::info!(
            "Encoded {} POIs with {} (dim={})",
            matrix.len(),
            embedder.name(),
            embedder.dimension()
        );

        Ok(Self {
            catalog,
            embedder,
            matrix,
        })
    }
}

impl Retriever for SemanticRetriever {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn query<'a>(
        &'a self,
        normalized_text: &str,
        _tokens: &[String],
        limit: usize,
    ) -> Result<Vec<&'a PoiRecord>, RetrievalError> {
        let query = self
            .embedder
            .encode(normalized_text)
            .map_err(|source| RetrievalError::Embedding {
                retriever: self.name(),
                source,
            })?;

        if query.len() != self.embedder.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.embedder.dimension(),
                actual: query.len(),
            });
        }

        // Only positive similarities are candidates; a zero query vector
        // should not surface arbitrary POIs
        let mut scored: Vec<(usize, f32)> = self
            .matrix
            .iter()
            .enumerate()
            .map(|(slot, row)| (slot, dot(&query, row)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let pois = self.catalog.pois();
        Ok(scored.into_iter().map(|(slot, _)| &pois[slot]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embedding::CharNgramEmbedder;

    fn catalog() -> Arc<CatalogIndex> {
        let mut pois = Vec::new();
        for (id, text) in [
            ("P1", "北京市 海淀区 中关村大街 1号"),
            ("P2", "北京市 朝阳区 望京街 10号"),
            ("P3", "上海市 浦东新区 世纪大道 100号"),
        ] {
            let mut poi = PoiRecord::new(id, text.replace(' ', ""), 39.9, 116.3);
            poi.normalized = Some(text.to_string());
            pois.push(poi);
        }
        Arc::new(CatalogIndex::build(pois))
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }

        fn dimension(&self) -> usize {
            4
        }

        fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.is_empty() {
                Ok(vec![0.0; 4])
            } else {
                Err(EmbeddingError::InferenceFailed {
                    reason: "boom".to_string(),
                })
            }
        }
    }

    #[test]
    fn test_lexical_delegates_to_index() {
        let retriever = LexicalRetriever::new(catalog());
        let tokens = vec!["海淀区".to_string()];

        let results = retriever.query("", &tokens, 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "P1");
    }

    #[test]
    fn test_lexical_empty_tokens() {
        let retriever = LexicalRetriever::new(catalog());
        assert!(retriever.query("anything", &[], 5).unwrap().is_empty());
    }

    #[test]
    fn test_semantic_ranks_by_similarity() {
        let embedder = Arc::new(CharNgramEmbedder::new(256).unwrap());
        let retriever = SemanticRetriever::new(catalog(), embedder).unwrap();

        let results = retriever.query("北京市海淀区中关村大街1号", &[], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "P1");
    }

    #[test]
    fn test_semantic_empty_query_returns_nothing() {
        let embedder = Arc::new(CharNgramEmbedder::new(256).unwrap());
        let retriever = SemanticRetriever::new(catalog(), embedder).unwrap();
        assert!(retriever.query("", &[], 5).unwrap().is_empty());
    }

    #[test]
    fn test_semantic_construction_surfaces_embedding_failure() {
        let result = SemanticRetriever::new(catalog(), Arc::new(BrokenEmbedder));
        assert!(matches!(result, Err(EmbeddingError::InferenceFailed { .. })));
    }
}
