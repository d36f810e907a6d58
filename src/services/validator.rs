use thiserror::Error;

use crate::config::Settings;
use crate::core::embedding::{load_embedder, EmbeddingError};

/// Address used to exercise the embedding model when none is given
pub const DEFAULT_SAMPLE_ADDRESS: &str = "北京市海淀区中关村大街1号";

/// Errors reported by the configuration check
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("POI file does not exist: {0}")]
    MissingPoiFile(String),

    #[error("Address file does not exist: {0}")]
    MissingAddressFile(String),

    #[error("Embedding model check failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Check that both input tables exist
pub fn validate_paths(settings: &Settings) -> Result<(), ValidationError> {
    let input = &settings.input;
    if !input.poi_file.exists() {
        return Err(ValidationError::MissingPoiFile(input.poi_file.display().to_string()));
    }
    if !input.address_file.exists() {
        return Err(ValidationError::MissingAddressFile(
            input.address_file.display().to_string(),
        ));
    }

    tracing::info!(
        "Input paths ok: poi={}, addresses={}",
        input.poi_file.display(),
        input.address_file.display()
    );
    Ok(())
}

/// Load the configured embedding model and encode one sample
///
/// Returns the embedding dimension, or `None` when vector retrieval is off.
pub fn validate_vector_model(settings: &Settings, sample: Option<&str>) -> Result<Option<usize>, ValidationError> {
    if !settings.retriever.enable_vector {
        tracing::warn!("Vector retrieval disabled (retriever.enable_vector=false), skipping model check");
        return Ok(None);
    }

    let model = &settings.retriever.vector_model;
    tracing::info!("Loading embedding model {}", model);
    let embedder = load_embedder(model)?;

    let sample = sample.unwrap_or(DEFAULT_SAMPLE_ADDRESS);
    let vector = embedder.encode(sample)?;
    tracing::info!("Embedding model ok, encoded sample {:?} to {} dims", sample, vector.len());

    Ok(Some(vector.len()))
}

/// Run every check; the vector check can be skipped
pub fn run_validation(settings: &Settings, check_vector: bool, sample: Option<&str>) -> Result<(), ValidationError> {
    validate_paths(settings)?;
    if check_vector {
        validate_vector_model(settings, sample)?;
    }
    tracing::info!("Configuration and model checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnSettings, InputSettings, RetrieverSettings, RuntimeSettings, ScoringSettings};
    use std::path::PathBuf;

    fn settings(poi_file: PathBuf, address_file: PathBuf, enable_vector: bool, model: &str) -> Settings {
        Settings {
            input: InputSettings {
                poi_file,
                poi_sheet: None,
                address_file,
                address_sheet: None,
                output_file: PathBuf::from("out.xlsx"),
            },
            columns: ColumnSettings::default(),
            retriever: RetrieverSettings {
                max_candidates: 10,
                enable_vector,
                vector_model: model.to_string(),
            },
            scoring: ScoringSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }

    #[test]
    fn test_missing_poi_file() {
        let cfg = settings("/nonexistent/poi.xlsx".into(), "/nonexistent/a.xlsx".into(), false, "char-ngram");
        assert!(matches!(validate_paths(&cfg), Err(ValidationError::MissingPoiFile(_))));
    }

    #[test]
    fn test_missing_address_file() {
        let poi = tempfile::NamedTempFile::new().unwrap();
        let cfg = settings(poi.path().to_path_buf(), "/nonexistent/a.xlsx".into(), false, "char-ngram");
        assert!(matches!(validate_paths(&cfg), Err(ValidationError::MissingAddressFile(_))));
    }

    #[test]
    fn test_vector_check_skipped_when_disabled() {
        let cfg = settings("a".into(), "b".into(), false, "does-not-exist");
        assert_eq!(validate_vector_model(&cfg, None).unwrap(), None);
    }

    #[test]
    fn test_vector_check_encodes_sample() {
        let cfg = settings("a".into(), "b".into(), true, "char-ngram");
        assert_eq!(validate_vector_model(&cfg, Some("学院路15号")).unwrap(), Some(256));
    }

    #[test]
    fn test_unknown_model_reported() {
        let cfg = settings("a".into(), "b".into(), true, "does-not-exist");
        assert!(matches!(
            validate_vector_model(&cfg, None),
            Err(ValidationError::Embedding(EmbeddingError::ModelNotFound { .. }))
        ));
    }

    #[test]
    fn test_run_validation_all_ok() {
        let poi = tempfile::NamedTempFile::new().unwrap();
        let addresses = tempfile::NamedTempFile::new().unwrap();
        let cfg = settings(poi.path().to_path_buf(), addresses.path().to_path_buf(), true, "char-ngram");
        assert!(run_validation(&cfg, true, None).is_ok());
    }
}
