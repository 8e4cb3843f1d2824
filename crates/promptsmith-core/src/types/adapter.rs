use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterChange {
    pub label: String,
    pub description: String,
}

/// Qualitative commentary returned alongside a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterAnalysis {
    pub token_impact: String,
    pub performance_impact: String,
    pub safety_impact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    /// Expected change in prompt length, in percent.
    pub token_change_pct: Option<f64>,
    /// Expected change in judge score, on the 0-10 scale.
    pub quality_delta: Option<f64>,
}

/// Provider-tuned rewrite of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adapter {
    pub target_provider: String,
    pub target_model: String,
    pub original_prompt: String,
    pub adapted_prompt: String,
    pub changes: Vec<AdapterChange>,
    pub analysis: Option<AdapterAnalysis>,
    pub metrics: Option<PerformanceEstimate>,
    /// True when the adapter is the templated fallback, not a rewrite.
    pub templated: bool,
}
