use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::core::embedding::CHAR_NGRAM_MODEL;
use crate::models::ScoringWeights;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub input: InputSettings,
    #[serde(default)]
    pub columns: ColumnSettings,
    #[serde(default)]
    #[validate(nested)]
    pub retriever: RetrieverSettings,
    #[serde(default)]
    #[validate(nested)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    #[validate(nested)]
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InputSettings {
    pub poi_file: PathBuf,
    #[serde(default)]
    pub poi_sheet: Option<String>,
    pub address_file: PathBuf,
    #[serde(default)]
    pub address_sheet: Option<String>,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
}

/// Logical column name -> source header
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnSettings {
    #[serde(default)]
    pub poi: HashMap<String, String>,
    #[serde(default)]
    pub address: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RetrieverSettings {
    #[serde(default = "default_max_candidates")]
    #[validate(range(min = 1))]
    pub max_candidates: usize,
    #[serde(default)]
    pub enable_vector: bool,
    #[serde(default = "default_vector_model")]
    #[validate(length(min = 1))]
    pub vector_model: String,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            enable_vector: false,
            vector_model: default_vector_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScoringSettings {
    #[serde(default = "default_coverage_weight")]
    #[validate(range(min = 0.0))]
    pub coverage_weight: f64,
    #[serde(default = "default_edit_distance_weight")]
    #[validate(range(min = 0.0))]
    pub edit_distance_weight: f64,
    #[serde(default = "default_doorplate_weight")]
    #[validate(range(min = 0.0))]
    pub doorplate_weight: f64,
    #[serde(default = "default_min_score")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_score: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            coverage_weight: default_coverage_weight(),
            edit_distance_weight: default_edit_distance_weight(),
            doorplate_weight: default_doorplate_weight(),
            min_score: default_min_score(),
        }
    }
}

impl ScoringSettings {
    pub fn weights(&self) -> ScoringWeights {
        ScoringWeights {
            coverage: self.coverage_weight,
            edit_distance: self.edit_distance_weight,
            doorplate: self.doorplate_weight,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RuntimeSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

/// Log output format; anything other than these two is a config error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_output_file() -> PathBuf {
    PathBuf::from("output/matched_addresses.xlsx")
}

fn default_max_candidates() -> usize {
    10
}

fn default_vector_model() -> String {
    CHAR_NGRAM_MODEL.to_string()
}

fn default_coverage_weight() -> f64 {
    0.5
}

fn default_edit_distance_weight() -> f64 {
    0.3
}

fn default_doorplate_weight() -> f64 {
    0.2
}

fn default_min_score() -> f64 {
    0.75
}

fn default_workers() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// What the matching orchestrator needs from the configuration
#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub weights: ScoringWeights,
    pub min_score: f64,
    pub max_candidates: usize,
    pub enable_semantic: bool,
    pub embedding_model: String,
    pub workers: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            min_score: default_min_score(),
            max_candidates: default_max_candidates(),
            enable_semantic: false,
            embedding_model: default_vector_model(),
            workers: default_workers(),
        }
    }
}

impl Settings {
    /// Load configuration from a file layered with environment variables
    ///
    /// The file format follows its extension (toml, yaml, json). Environment
    /// variables prefixed with GEO_MATCHER override file values,
    /// e.g. GEO_MATCHER__SCORING__MIN_SCORE -> scoring.min_score
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("GEO_MATCHER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    /// Run field validation, reporting failures as configuration errors
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|errors| ConfigError::Message(format!("invalid configuration: {}", errors)))
    }

    pub fn matching(&self) -> MatchingSettings {
        MatchingSettings {
            weights: self.scoring.weights(),
            min_score: self.scoring.min_score,
            max_candidates: self.retriever.max_candidates,
            enable_semantic: self.retriever.enable_vector,
            embedding_model: self.retriever.vector_model.clone(),
            workers: self.runtime.workers,
        }
    }
}
