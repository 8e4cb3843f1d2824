//! Run request parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_request_schema;
use crate::types::{AttackCategory, ScenarioCategory, StepKind};

/// Smallest and largest scenario count the synthesis step accepts.
pub const SCENARIO_COUNT_RANGE: std::ops::RangeInclusive<usize> = 1..=50;

/// Errors that reject a request before any step runs.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Failed to read request file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Request failed schema validation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Original prompt is empty")]
    EmptyPrompt,
}

/// A configuration problem that makes one step unrunnable. The step is
/// skipped with this as its reason; the run carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("scenario count {0} is outside 1..=50")]
    ScenarioCountOutOfRange(usize),

    #[error("no scenario categories configured")]
    NoScenarioCategories,

    #[error("no target provider configured")]
    MissingTargetProvider,

    #[error("no target model configured")]
    MissingTargetModel,
}

/// Which steps a run executes. Every step is on unless switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepToggles {
    #[serde(default = "enabled")]
    pub scenarios: bool,
    #[serde(default = "enabled")]
    pub evaluation: bool,
    #[serde(default = "enabled")]
    pub security_scan: bool,
    #[serde(default = "enabled")]
    pub repair: bool,
    #[serde(default = "enabled")]
    pub adapter: bool,
}

fn enabled() -> bool {
    true
}

impl Default for StepToggles {
    fn default() -> Self {
        Self {
            scenarios: true,
            evaluation: true,
            security_scan: true,
            repair: true,
            adapter: true,
        }
    }
}

impl StepToggles {
    pub fn none() -> Self {
        Self {
            scenarios: false,
            evaluation: false,
            security_scan: false,
            repair: false,
            adapter: false,
        }
    }

    pub fn is_enabled(&self, kind: StepKind) -> bool {
        match kind {
            StepKind::ScenarioSynthesis => self.scenarios,
            StepKind::Evaluation => self.evaluation,
            StepKind::SecurityScan => self.security_scan,
            StepKind::Repair => self.repair,
            StepKind::AdapterCreation => self.adapter,
        }
    }
}

fn default_scenario_count() -> usize {
    5
}

fn default_scenario_categories() -> Vec<ScenarioCategory> {
    ScenarioCategory::ALL.to_vec()
}

fn default_focus_areas() -> Vec<String> {
    DEFAULT_FOCUS_AREAS.iter().map(|s| s.to_string()).collect()
}

/// Focus areas analysed when the request names none.
pub const DEFAULT_FOCUS_AREAS: [&str; 3] = ["clarity", "safety", "consistency"];

/// Per-run configuration carried on the run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub target_provider: Option<String>,

    #[serde(default)]
    pub target_model: Option<String>,

    #[serde(default)]
    pub per_step_enable_flags: StepToggles,

    #[serde(default = "default_scenario_count")]
    pub scenario_count: usize,

    #[serde(default = "default_scenario_categories")]
    pub scenario_categories: Vec<ScenarioCategory>,

    /// Provider names to evaluate against. Empty means the default provider.
    #[serde(default)]
    pub evaluation_providers: Vec<String>,

    #[serde(default = "default_focus_areas")]
    pub repair_focus_areas: Vec<String>,

    /// Allowlist for the standalone scan. The pipeline security step always
    /// sweeps its fixed catalog and only records this list.
    #[serde(default)]
    pub security_attack_categories: Vec<String>,

    #[serde(default)]
    pub max_suggestions: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_provider: None,
            target_model: None,
            per_step_enable_flags: StepToggles::default(),
            scenario_count: default_scenario_count(),
            scenario_categories: default_scenario_categories(),
            evaluation_providers: Vec::new(),
            repair_focus_areas: default_focus_areas(),
            security_attack_categories: Vec::new(),
            max_suggestions: None,
        }
    }
}

impl PipelineConfig {
    /// Why `kind` cannot run under this configuration, if it cannot.
    pub fn config_issue(&self, kind: StepKind) -> Option<ConfigError> {
        match kind {
            StepKind::ScenarioSynthesis => {
                if !SCENARIO_COUNT_RANGE.contains(&self.scenario_count) {
                    Some(ConfigError::ScenarioCountOutOfRange(self.scenario_count))
                } else if self.scenario_categories.is_empty() {
                    Some(ConfigError::NoScenarioCategories)
                } else {
                    None
                }
            }
            StepKind::AdapterCreation => {
                if is_blank(&self.target_provider) {
                    Some(ConfigError::MissingTargetProvider)
                } else if is_blank(&self.target_model) {
                    Some(ConfigError::MissingTargetModel)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Count used when a step has to synthesize scenarios for itself.
    pub fn clamped_scenario_count(&self) -> usize {
        self.scenario_count
            .clamp(*SCENARIO_COUNT_RANGE.start(), *SCENARIO_COUNT_RANGE.end())
    }

    /// Configured categories, or all of them when none are set.
    pub fn effective_categories(&self) -> Vec<ScenarioCategory> {
        if self.scenario_categories.is_empty() {
            default_scenario_categories()
        } else {
            self.scenario_categories.clone()
        }
    }

    /// Focus areas with blanks dropped, or the defaults when none remain.
    pub fn effective_focus_areas(&self) -> Vec<String> {
        let areas: Vec<String> = self
            .repair_focus_areas
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if areas.is_empty() {
            default_focus_areas()
        } else {
            areas
        }
    }

    /// Parsed attack allowlist. Unknown names are returned separately so the
    /// caller can report them without losing them from the record.
    pub fn attack_categories(&self) -> (Vec<AttackCategory>, Vec<String>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in &self.security_attack_categories {
            match name.parse::<AttackCategory>() {
                Ok(category) if !known.contains(&category) => known.push(category),
                Ok(_) => {}
                Err(_) => unknown.push(name.clone()),
            }
        }
        (known, unknown)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

/// A request to run the pipeline over one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub original_prompt: String,

    #[serde(flatten)]
    pub config: PipelineConfig,
}

impl RunRequest {
    pub fn new(original_prompt: impl Into<String>) -> Self {
        Self {
            original_prompt: original_prompt.into(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse a request from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RequestError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a request from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RequestError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a request file, choosing the format from the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RequestError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, RequestError> {
        validate_request_schema(&value).map_err(RequestError::SchemaViolation)?;
        let request: RunRequest = serde_json::from_value(value)?;
        request.validate()?;
        Ok(request)
    }

    /// Checks that make the whole run impossible.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.original_prompt.trim().is_empty() {
            return Err(RequestError::EmptyPrompt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_request_with_defaults() {
        let request = RunRequest::from_yaml("originalPrompt: You are a travel agent.\n").unwrap();
        assert_eq!(request.original_prompt, "You are a travel agent.");
        assert_eq!(request.config.scenario_count, 5);
        assert_eq!(request.config.scenario_categories.len(), 4);
        assert!(request.config.per_step_enable_flags.repair);
        assert_eq!(request.config.repair_focus_areas.len(), 3);
    }

    #[test]
    fn test_json_request_flags() {
        let request = RunRequest::from_json(
            r#"{
                "originalPrompt": "Answer tax questions.",
                "perStepEnableFlags": { "securityScan": false },
                "scenarioCount": 3
            }"#,
        )
        .unwrap();
        let flags = request.config.per_step_enable_flags;
        assert!(!flags.is_enabled(StepKind::SecurityScan));
        assert!(flags.is_enabled(StepKind::Evaluation));
        assert_eq!(request.config.scenario_count, 3);
    }

    #[test]
    fn test_empty_prompt_is_fatal() {
        let err = RunRequest::from_yaml("originalPrompt: '   '\n").unwrap_err();
        assert!(matches!(err, RequestError::EmptyPrompt));
    }

    #[test]
    fn test_schema_violation_reported() {
        let err = RunRequest::from_yaml("originalPrompt: x\nscenarioCount: -1\n").unwrap_err();
        assert!(matches!(err, RequestError::SchemaViolation(_)));
    }

    #[test]
    fn test_scenario_count_out_of_range_skips_synthesis() {
        let config = PipelineConfig {
            scenario_count: 80,
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.config_issue(StepKind::ScenarioSynthesis),
            Some(ConfigError::ScenarioCountOutOfRange(80))
        );
        assert_eq!(config.clamped_scenario_count(), 50);
        assert_eq!(config.config_issue(StepKind::Evaluation), None);
    }

    #[test]
    fn test_adapter_requires_target() {
        let mut config = PipelineConfig::default();
        assert_eq!(
            config.config_issue(StepKind::AdapterCreation),
            Some(ConfigError::MissingTargetProvider)
        );
        config.target_provider = Some("anthropic".to_string());
        assert_eq!(
            config.config_issue(StepKind::AdapterCreation),
            Some(ConfigError::MissingTargetModel)
        );
        config.target_model = Some("claude-3-5-haiku-20241022".to_string());
        assert_eq!(config.config_issue(StepKind::AdapterCreation), None);
    }

    #[test]
    fn test_unknown_attacks_are_separated() {
        let config = PipelineConfig {
            security_attack_categories: vec![
                "jailbreak".to_string(),
                "sql_injection".to_string(),
                "Jailbreak".to_string(),
            ],
            ..PipelineConfig::default()
        };
        let (known, unknown) = config.attack_categories();
        assert_eq!(known, vec![AttackCategory::Jailbreak]);
        assert_eq!(unknown, vec!["sql_injection".to_string()]);
    }

    #[test]
    fn test_blank_focus_areas_fall_back() {
        let config = PipelineConfig {
            repair_focus_areas: vec!["  ".to_string()],
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_focus_areas().len(), 3);
    }
}
