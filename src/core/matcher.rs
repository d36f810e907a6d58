use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::JoinSet;

use crate::config::MatchingSettings;
use crate::core::{
    embedding::{load_embedder, EmbeddingError},
    index::CatalogIndex,
    normalizer::Normalizer,
    retriever::{LexicalRetriever, RetrievalError, Retriever, SemanticRetriever},
    scoring::Scorer,
};
use crate::models::{AddressRecord, MatchResult, MatchSource, PoiRecord};
use crate::services::table::{self, TableError};

/// Errors surfaced by the matching orchestrator
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("catalog not loaded: call load() before matching")]
    NotLoaded,

    #[error("semantic retrieval unavailable: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("matching worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("worker pool closed before the batch was submitted: {0}")]
    WorkerPool(#[from] AcquireError),

    #[error("export failed: {0}")]
    Export(#[from] TableError),
}

/// Catalog and retrievers, immutable once built
struct LoadedCatalog {
    catalog: Arc<CatalogIndex>,
    retrievers: Vec<Box<dyn Retriever>>,
}

/// Main matching orchestrator
///
/// # Pipeline Stages
/// 1. Normalize the address
/// 2. Query every active retriever with the same text and tokens
/// 3. Merge candidates, keeping the first occurrence of each POI id
/// 4. Score, rank and threshold
#[derive(Clone)]
pub struct Matcher {
    settings: MatchingSettings,
    scorer: Scorer,
    normalizer: Arc<dyn Normalizer>,
    loaded: Option<Arc<LoadedCatalog>>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("settings", &self.settings)
            .field("scorer", &self.scorer)
            .field("pois", &self.loaded.as_ref().map(|l| l.catalog.len()))
            .finish()
    }
}

impl Matcher {
    pub fn new(settings: MatchingSettings, normalizer: Arc<dyn Normalizer>) -> Self {
        let scorer = Scorer::new(settings.weights);
        Self {
            settings,
            scorer,
            normalizer,
            loaded: None,
        }
    }

    pub fn settings(&self) -> &MatchingSettings {
        &self.settings
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Build the catalog index and the configured retrievers
    ///
    /// Each POI is normalized once here. POIs with unusable coordinates are
    /// left out of the catalog so they can never be matched.
    pub fn load(&mut self, pois: Vec<PoiRecord>) -> Result<(), MatchError> {
        let total = pois.len();
        let mut skipped = 0usize;

        let prepared: Vec<PoiRecord> = pois
            .into_iter()
            .filter_map(|mut poi| {
                if !poi.has_valid_coordinates() {
                    tracing::warn!("Skipping POI {} with invalid coordinates", poi.id);
                    skipped += 1;
                    return None;
                }
                let normalized = self.normalizer.normalize(&poi.full_text());
                poi.normalized = Some(normalized.tokens.join(" "));
                Some(poi)
            })
            .collect();

        let catalog = Arc::new(CatalogIndex::build(prepared));

        let mut retrievers: Vec<Box<dyn Retriever>> = vec![Box::new(LexicalRetriever::new(catalog.clone()))];
        if self.settings.enable_semantic {
            let embedder = load_embedder(&self.settings.embedding_model)?;
            retrievers.push(Box::new(SemanticRetriever::new(catalog.clone(), embedder)?));
        }

        tracing::info!(
            "Catalog loaded: {} POIs indexed ({} skipped of {}), retrievers: {:?}",
            catalog.len(),
            skipped,
            total,
            retrievers.iter().map(|r| r.name()).collect::<Vec<_>>()
        );

        self.loaded = Some(Arc::new(LoadedCatalog { catalog, retrievers }));
        Ok(())
    }

    pub fn catalog(&self) -> Option<&CatalogIndex> {
        self.loaded.as_ref().map(|l| l.catalog.as_ref())
    }

    /// Match a single address against the loaded catalog
    pub fn match_one(&self, address: AddressRecord) -> Result<MatchResult, MatchError> {
        let loaded = self.loaded.as_ref().ok_or(MatchError::NotLoaded)?;
        Ok(self.match_or_degrade(loaded, address))
    }

    /// Match a batch of addresses, one output per input
    ///
    /// Results arrive in completion order when `workers > 1`; index them by
    /// `order_id` if input order matters.
    pub async fn match_all(&self, addresses: Vec<AddressRecord>) -> Result<Vec<MatchResult>, MatchError> {
        let loaded = self.loaded.clone().ok_or(MatchError::NotLoaded)?;
        let workers = self.settings.workers;
        let total = addresses.len();

        tracing::info!("Matching {} addresses with {} workers", total, workers.max(1));

        let results = if workers <= 1 {
            addresses
                .into_iter()
                .map(|address| self.match_or_degrade(&loaded, address))
                .collect()
        } else {
            let permits = Arc::new(Semaphore::new(workers));
            self.match_concurrent(loaded, addresses, permits).await?
        };

        let matched = results.iter().filter(|r| r.is_matched()).count();
        let degraded = results.iter().filter(|r| r.source == MatchSource::Degraded).count();
        tracing::info!(
            "Matching finished: {} results, {} matched, {} degraded",
            results.len(),
            matched,
            degraded
        );

        Ok(results)
    }

    async fn match_concurrent(
        &self,
        loaded: Arc<LoadedCatalog>,
        addresses: Vec<AddressRecord>,
        permits: Arc<Semaphore>,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let mut tasks = JoinSet::new();
        let mut results = Vec::with_capacity(addresses.len());

        for address in addresses {
            let permit = permits.clone().acquire_owned().await?;
            let matcher = self.clone();
            let loaded = loaded.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                matcher.match_or_degrade(&loaded, address)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }

        Ok(results)
    }

    /// Run one address, turning any failure into a degraded result
    fn match_or_degrade(&self, loaded: &LoadedCatalog, mut address: AddressRecord) -> MatchResult {
        let order_id = address.order_id.clone();
        let raw_address = address.raw_address.clone();
        let original_row = std::mem::take(&mut address.original_row);

        let mut result = match panic::catch_unwind(AssertUnwindSafe(|| self.match_address(loaded, address))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!("Matching failed for {}: {}", order_id, e);
                MatchResult::degraded(order_id, raw_address)
            }
            Err(_) => {
                tracing::error!("Matching panicked for {}", order_id);
                MatchResult::degraded(order_id, raw_address)
            }
        };

        result.original_row = original_row;
        result
    }

    fn match_address(&self, loaded: &LoadedCatalog, mut address: AddressRecord) -> Result<MatchResult, RetrievalError> {
        let normalized = self.normalizer.normalize(&address.full_text());
        address.normalized = Some(normalized.text.clone());

        let limit = self.settings.max_candidates;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut candidates: Vec<&PoiRecord> = Vec::new();

        for retriever in &loaded.retrievers {
            for poi in retriever.query(&normalized.text, &normalized.tokens, limit)? {
                if seen.insert(poi.id.as_str()) {
                    candidates.push(poi);
                }
            }
        }

        tracing::debug!(
            "Address {}: {} tokens, {} unique candidates",
            address.order_id,
            normalized.tokens.len(),
            candidates.len()
        );

        Ok(self
            .scorer
            .score(&address, &normalized, &candidates, self.settings.min_score))
    }

    /// Hand results to the tabular writer
    pub fn export(&self, results: &[MatchResult], path: &Path) -> Result<(), MatchError> {
        table::write_results(path, results)?;
        tracing::info!("Wrote {} results to {}", results.len(), path.display());
        Ok(())
    }
}
