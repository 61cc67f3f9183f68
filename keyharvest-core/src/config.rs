//! Pipeline configuration.
//!
//! Every tunable lives in [`PipelineConfig`], loaded from TOML with a default
//! for each field. Secrets come from the environment through [`Credentials`]
//! and are never written to the config file.

use crate::error::ConfigError;
use crate::types::{CompetitionLevel, SeedKeyword};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const ENV_API_KEY: &str = "RAPIDAPI_KEY";
pub const ENV_API_HOST: &str = "RAPIDAPI_HOST";
pub const ENV_DATABASE_URL: &str = "DB_CONNECTION_STRING";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub filter: FilterConfig,
    pub scoring: ScoringConfig,
    pub selection: SelectionConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub output: OutputConfig,
    /// Inline seeds; when empty the `seed_keywords` table is used.
    pub seeds: Vec<SeedKeyword>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub location: String,
    pub language: String,
    pub endpoints: Vec<EndpointConfig>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            location: "GB".to_string(),
            language: "en".to_string(),
            endpoints: vec![
                EndpointConfig::new("keysuggest", true),
                EndpointConfig::new("globalkey", false),
                EndpointConfig::new("topkeys", true),
            ],
            request_timeout_secs: 30,
            user_agent: concat!("keyharvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// Whether the endpoint accepts the `location` parameter.
    #[serde(default = "default_true")]
    pub with_location: bool,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, with_location: bool) -> Self {
        Self {
            name: name.into(),
            with_location,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Bounded worker pool, one seed per worker.
    Concurrent,
    /// One seed at a time with a fixed pause after every request.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub mode: FetchMode,
    pub max_workers: usize,
    pub sequential_delay_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Concurrent,
            max_workers: 4,
            sequential_delay_ms: 6000,
            max_attempts: 6,
            base_delay_ms: 6000,
            max_delay_ms: 120_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl FetchConfig {
    pub fn sequential_delay(&self) -> Duration {
        Duration::from_millis(self.sequential_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_volume: u64,
    pub relaxed_min_volume: u64,
    /// Underrepresented categories that get `relaxed_min_volume`.
    pub relaxed_categories: Vec<String>,
    pub allowed_competition: Vec<CompetitionLevel>,
    pub min_trend: f64,
    pub min_words: usize,
    pub per_category_candidate_cap: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_volume: 100,
            relaxed_min_volume: 50,
            relaxed_categories: vec![
                "ai_ethics".to_string(),
                "engineering".to_string(),
                "crossover".to_string(),
            ],
            allowed_competition: vec![CompetitionLevel::Low, CompetitionLevel::Medium],
            min_trend: 0.0,
            min_words: 2,
            per_category_candidate_cap: 15,
        }
    }
}

impl FilterConfig {
    pub fn volume_threshold(&self, category: &str) -> u64 {
        if self.relaxed_categories.iter().any(|c| c == category) {
            self.relaxed_min_volume
        } else {
            self.min_volume
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub trend: f64,
    pub volume: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            trend: 0.4,
            volume: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub repetition_penalty: f64,
    /// Mean-similarity ceiling above which a candidate counts as generic.
    pub generic_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            repetition_penalty: 0.1,
            generic_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    Cluster,
    CategoryBalanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub strategy: SelectionStrategy,
    pub num_clusters: usize,
    pub categories: Vec<String>,
    pub per_category_limit: usize,
    pub total_limit: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::CategoryBalanced,
            num_clusters: 10,
            categories: ["lifestyle", "ai_ethics", "engineering", "gaming", "crossover"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            per_category_limit: 2,
            total_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub cache_ttl_hours: u64,
    pub blacklist_retention_days: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            blacklist_retention_days: 90,
        }
    }
}

impl StoreConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_ttl_hours as i64)
    }

    pub fn blacklist_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.blacklist_retention_days as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Directory holding `config.json`, `tokenizer.json` and `model.safetensors`.
    pub model_dir: PathBuf,
    pub max_sequence_length: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
            max_sequence_length: 128,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("keywords.json"),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. A missing file is an error; use
    /// [`PipelineConfig::default`] when no file was asked for.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config = Self::from_toml(&raw)?;
        info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.endpoints.is_empty() {
            return Err(ConfigError::MissingField {
                field: "source.endpoints".to_string(),
            });
        }
        if self.fetch.max_workers == 0 {
            return Err(invalid("fetch.max_workers", self.fetch.max_workers));
        }
        if self.fetch.max_attempts == 0 {
            return Err(invalid("fetch.max_attempts", self.fetch.max_attempts));
        }
        if !(0.0..=1.0).contains(&self.fetch.jitter_factor) {
            return Err(invalid("fetch.jitter_factor", self.fetch.jitter_factor));
        }
        let weights = &self.scoring.weights;
        if weights.similarity < 0.0 || weights.trend < 0.0 || weights.volume < 0.0 {
            return Err(ConfigError::ValidationFailed {
                reason: format!("scoring weights must be non-negative, got {:?}", weights),
            });
        }
        if !(0.0..=1.0).contains(&self.scoring.generic_threshold) {
            return Err(invalid(
                "scoring.generic_threshold",
                self.scoring.generic_threshold,
            ));
        }
        if self.scoring.repetition_penalty < 0.0 {
            return Err(invalid(
                "scoring.repetition_penalty",
                self.scoring.repetition_penalty,
            ));
        }
        if self.selection.num_clusters == 0 {
            return Err(invalid("selection.num_clusters", self.selection.num_clusters));
        }
        if self.selection.total_limit == 0 {
            return Err(invalid("selection.total_limit", self.selection.total_limit));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", self.embedding.batch_size));
        }
        debug!("Pipeline configuration validated");
        Ok(())
    }
}

fn invalid(field: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Secrets required to run; absence of any is fatal at startup.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_host: String,
    pub database_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_host", &self.api_host)
            .field("database_url", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            api_key: require_var(&lookup, ENV_API_KEY)?,
            api_host: require_var(&lookup, ENV_API_HOST)?,
            database_url: require_var(&lookup, ENV_DATABASE_URL)?,
        })
    }

    /// Only the store location, for commands that never call the keyword API.
    pub fn database_url_from_env() -> Result<String, ConfigError> {
        require_var(&|name: &str| std::env::var(name).ok(), ENV_DATABASE_URL)
    }
}

fn require_var<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
            var_name: name.to_string(),
        })
}
