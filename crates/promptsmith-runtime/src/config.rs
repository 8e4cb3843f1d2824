//! Runtime configuration.
//!
//! Loaded from YAML; every field has a default, so an empty document is a
//! valid configuration. Durations are written the human way (`30s`, `2m`,
//! `500ms`).
//!
//! ```yaml
//! model: claude-sonnet-4-5-20250514
//! call_timeout: 45s
//! max_concurrency: 8
//! retry:
//!   max_retries: 3
//! budget:
//!   global_max_tokens: 400000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use promptsmith_core::{RepairThresholds, StepKind};

use crate::providers::CompletionConfig;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Serde adapter for `Duration` as a humantime string ("30s", "1m 30s").
pub mod duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Sampling temperature per step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTemperatures {
    pub scenarios: f32,
    pub evaluation: f32,
    pub security: f32,
    pub repair: f32,
    pub adapter: f32,
}

impl Default for StepTemperatures {
    fn default() -> Self {
        Self {
            scenarios: 0.8,
            evaluation: 0.0,
            security: 0.2,
            repair: 0.3,
            adapter: 0.3,
        }
    }
}

impl StepTemperatures {
    pub fn for_step(&self, step: StepKind) -> f32 {
        match step {
            StepKind::ScenarioSynthesis => self.scenarios,
            StepKind::Evaluation => self.evaluation,
            StepKind::SecurityScan => self.security,
            StepKind::Repair => self.repair,
            StepKind::AdapterCreation => self.adapter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub global_max_tokens: u32,
    pub per_step_max_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            global_max_tokens: 200_000,
            per_step_max_tokens: 60_000,
        }
    }
}

/// Judge cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,

    #[serde(default = "default_cache_ttl", with = "duration")]
    pub ttl: Duration,
}

fn default_true() -> bool {
    true
}

fn default_cache_entries() -> u64 {
    10_000
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_entries(),
            ttl: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Model requested from the provider
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_true")]
    pub prompt_caching: bool,

    #[serde(default)]
    pub temperatures: StepTemperatures,

    /// Deadline for one provider call, retries excluded
    #[serde(default = "default_call_timeout", with = "duration")]
    pub call_timeout: Duration,

    /// Deadline for one whole step
    #[serde(default = "default_step_timeout", with = "duration")]
    pub step_timeout: Duration,

    /// Units of work in flight within a step. 1 runs them one at a time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub repair_thresholds: RepairThresholds,

    /// Cap on merged repair suggestions when the request sets none
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

fn default_model() -> String {
    CompletionConfig::default().model
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_step_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_suggestions() -> usize {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            prompt_caching: true,
            temperatures: StepTemperatures::default(),
            call_timeout: default_call_timeout(),
            step_timeout: default_step_timeout(),
            max_concurrency: default_max_concurrency(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
            repair_thresholds: RepairThresholds::default(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        // An empty document deserializes as null; treat it as all defaults.
        let config: Option<RuntimeConfig> = serde_yaml::from_str(yaml)?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_concurrency == 0 {
            return Err(ConfigLoadError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigLoadError::Invalid(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.repair_thresholds.min_confidence) {
            return Err(ConfigLoadError::Invalid(
                "repair_thresholds.min_confidence must be within 0..=1".to_string(),
            ));
        }
        if self.call_timeout.is_zero() || self.step_timeout.is_zero() {
            return Err(ConfigLoadError::Invalid(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Completion settings for calls made by `step`.
    pub fn completion_for(&self, step: StepKind) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperatures.for_step(step),
            timeout: self.call_timeout,
            prompt_caching: self.prompt_caching,
        }
    }
}
