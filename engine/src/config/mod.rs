//! Configuration management
//!
//! This module handles loading, validation, and management of the Darwin configuration.
//! Configuration is stored in TOML format at ~/.darwin/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level and archive save directory
//! - **oracle**: Endpoint style, base URL, key environment variables, backoff
//! - **models**: Meta-agent and agent model names and temperatures
//! - **search**: Generation count, debug budget, accuracy floor
//! - **evaluation**: Worker pool size and parallelism
//! - **dataset**: Question source location, split names and sampling
//! - **scorer**: Bootstrap resample count and confidence level
//! - **sandbox**: Static and runtime limits for candidate programs
//!
//! Every section has defaults, so a partial file (or an empty one) is valid.
//! API keys never live in the file; `oracle.api_key_env` names the environment
//! variable to read instead.
//!
//! # Examples
//!
//! ```no_run
//! use darwin_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Meta-agent model: {}", config.models.meta_agent);
//! println!("Archive directory: {:?}", config.core.save_dir);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the run archives (supports ~ expansion)
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

/// Wire format of the oracle endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStyle {
    /// `{base_url}/chat/completions` with a bearer token
    #[serde(rename = "openai")]
    OpenAI,
    /// `{base_url}/openai/deployments/{model}/chat/completions` with an `api-key` header
    Azure,
}

/// Oracle endpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_api_style")]
    pub api_style: ApiStyle,

    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Required for the azure style
    #[serde(default)]
    pub api_version: Option<String>,

    /// Environment variable holding the rate-limiting gateway key, if any
    #[serde(default)]
    pub proxy_key_env: Option<String>,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Retry schedule for rate-limited oracle calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model that proposes and repairs candidates
    #[serde(default = "default_meta_agent_model")]
    pub meta_agent: String,

    /// Model behind every primitive agent inside a candidate
    #[serde(default = "default_agent_model")]
    pub agent: String,

    #[serde(default = "default_meta_temperature")]
    pub meta_temperature: f64,

    #[serde(default = "default_agent_temperature")]
    pub agent_temperature: f64,
}

/// Search loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_n_generation")]
    pub n_generation: u32,

    /// Evaluation attempts per generation, including the first
    #[serde(default = "default_debug_max")]
    pub debug_max: u32,

    /// Mean accuracy below which a search evaluation is sent back for repair (0 disables)
    #[serde(default = "default_accuracy_floor")]
    pub accuracy_floor: f64,

    #[serde(default = "default_max_consecutive_abandons")]
    pub max_consecutive_abandons: u32,
}

/// Evaluation harness settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_true")]
    pub parallel: bool,
}

/// Question source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Root directory holding `<name>/<split>.jsonl` (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_dataset_name")]
    pub name: String,

    #[serde(default = "default_valid_size")]
    pub valid_size: usize,

    #[serde(default = "default_test_size")]
    pub test_size: usize,

    #[serde(default)]
    pub shuffle_seed: u64,

    #[serde(default = "default_n_repeat")]
    pub n_repeat: usize,

    #[serde(default = "default_search_split")]
    pub search_split: String,

    #[serde(default = "default_evaluation_split")]
    pub evaluation_split: String,
}

/// Bootstrap scorer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_bootstrap_samples")]
    pub bootstrap_samples: usize,

    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    /// Fixed RNG seed for reproducible intervals
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Limits applied to candidate programs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_max_repeat")]
    pub max_repeat: u32,

    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: u32,

    /// Oracle calls allowed per `forward` invocation
    #[serde(default = "default_max_oracle_calls")]
    pub max_oracle_calls: u32,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_api_style() -> ApiStyle {
    ApiStyle::OpenAI
}

fn default_oracle_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_output_tokens() -> u32 {
    4096
}

fn default_request_timeout() -> u64 {
    300
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    10
}

fn default_meta_agent_model() -> String {
    "gpt-4o".to_string()
}

fn default_agent_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_meta_temperature() -> f64 {
    0.8
}

fn default_agent_temperature() -> f64 {
    0.5
}

fn default_n_generation() -> u32 {
    30
}

fn default_debug_max() -> u32 {
    3
}

fn default_accuracy_floor() -> f64 {
    0.01
}

fn default_max_consecutive_abandons() -> u32 {
    10
}

fn default_max_workers() -> usize {
    48
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_dataset_name() -> String {
    "MedQA".to_string()
}

fn default_valid_size() -> usize {
    128
}

fn default_test_size() -> usize {
    800
}

fn default_n_repeat() -> usize {
    1
}

fn default_search_split() -> String {
    "test_hard_leftout".to_string()
}

fn default_evaluation_split() -> String {
    "test_hard".to_string()
}

fn default_bootstrap_samples() -> usize {
    100_000
}

fn default_confidence_level() -> f64 {
    0.95
}

fn default_max_agents() -> usize {
    16
}

fn default_max_steps() -> usize {
    64
}

fn default_max_repeat() -> u32 {
    16
}

fn default_max_loop_iterations() -> u32 {
    10
}

fn default_max_oracle_calls() -> u32 {
    64
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            save_dir: default_save_dir(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_style: default_api_style(),
            base_url: default_oracle_base_url(),
            api_key_env: default_api_key_env(),
            api_version: None,
            proxy_key_env: None,
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            meta_agent: default_meta_agent_model(),
            agent: default_agent_model(),
            meta_temperature: default_meta_temperature(),
            agent_temperature: default_agent_temperature(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_generation: default_n_generation(),
            debug_max: default_debug_max(),
            accuracy_floor: default_accuracy_floor(),
            max_consecutive_abandons: default_max_consecutive_abandons(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            parallel: true,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            name: default_dataset_name(),
            valid_size: default_valid_size(),
            test_size: default_test_size(),
            shuffle_seed: 0,
            n_repeat: default_n_repeat(),
            search_split: default_search_split(),
            evaluation_split: default_evaluation_split(),
        }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            bootstrap_samples: default_bootstrap_samples(),
            confidence_level: default_confidence_level(),
            seed: None,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            max_steps: default_max_steps(),
            max_repeat: default_max_repeat(),
            max_loop_iterations: default_max_loop_iterations(),
            max_oracle_calls: default_max_oracle_calls(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.darwin/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Written before processing so `~` stays unexpanded on disk
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.darwin/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".darwin").join("config.toml"))
    }

    /// Validate value ranges and expand `~` in paths
    ///
    /// Called after loading and again after command-line overrides are applied.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.oracle.api_style == ApiStyle::Azure && self.oracle.api_version.is_none() {
            return Err(EngineError::Config(
                "oracle.api_version is required when api_style = \"azure\"".to_string(),
            ));
        }
        if self.oracle.base_url.trim().is_empty() {
            return Err(EngineError::Config("oracle.base_url must not be empty".to_string()));
        }

        for (name, value) in [
            ("models.meta_temperature", self.models.meta_temperature),
            ("models.agent_temperature", self.models.agent_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }

        if self.search.debug_max == 0 {
            return Err(EngineError::Config(
                "search.debug_max must be at least 1".to_string(),
            ));
        }
        if self.search.max_consecutive_abandons == 0 {
            return Err(EngineError::Config(
                "search.max_consecutive_abandons must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.accuracy_floor) {
            return Err(EngineError::Config(
                "search.accuracy_floor must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.evaluation.max_workers == 0 {
            return Err(EngineError::Config(
                "evaluation.max_workers must be at least 1".to_string(),
            ));
        }
        if self.dataset.n_repeat == 0 {
            return Err(EngineError::Config(
                "dataset.n_repeat must be at least 1".to_string(),
            ));
        }
        if self.scorer.bootstrap_samples == 0 {
            return Err(EngineError::Config(
                "scorer.bootstrap_samples must be at least 1".to_string(),
            ));
        }
        if !(self.scorer.confidence_level > 0.0 && self.scorer.confidence_level < 1.0) {
            return Err(EngineError::Config(
                "scorer.confidence_level must be strictly between 0.0 and 1.0".to_string(),
            ));
        }
        if self.sandbox.max_oracle_calls == 0 || self.sandbox.max_steps == 0 {
            return Err(EngineError::Config(
                "sandbox limits must be at least 1".to_string(),
            ));
        }

        self.core.save_dir = expand_path(&self.core.save_dir)?;
        self.dataset.data_dir = expand_path(&self.dataset.data_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.search.n_generation, 30);
        assert_eq!(config.search.debug_max, 3);
        assert_eq!(config.evaluation.max_workers, 48);
        assert_eq!(config.dataset.valid_size, 128);
        assert_eq!(config.dataset.test_size, 800);
        assert_eq!(config.scorer.bootstrap_samples, 100_000);
        assert_eq!(config.oracle.backoff.max_retries, 10);
        assert!((config.models.meta_temperature - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [oracle]
            api_style = "azure"
            base_url = "https://example.openai.azure.com"
            api_version = "2024-06-01"

            [search]
            n_generation = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.oracle.api_style, ApiStyle::Azure);
        assert_eq!(config.search.n_generation, 5);
        assert_eq!(config.search.debug_max, 3);
        assert_eq!(config.dataset.search_split, "test_hard_leftout");
    }

    #[test]
    fn test_azure_requires_api_version() {
        let mut config = Config::default();
        config.oracle.api_style = ApiStyle::Azure;
        assert!(config.validate_and_process().is_err());

        config.oracle.api_version = Some("2024-06-01".to_string());
        assert!(config.validate_and_process().is_ok());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut config = Config::default();
        config.search.accuracy_floor = 1.5;
        assert!(config.validate_and_process().is_err());

        let mut config = Config::default();
        config.scorer.confidence_level = 1.0;
        assert!(config.validate_and_process().is_err());

        let mut config = Config::default();
        config.core.log_level = "loud".to_string();
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config, deserialized);
    }
}
