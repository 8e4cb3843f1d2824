//! Data model shared by the pipeline steps.
//!
//! Everything here is plain data: the runtime produces it, the orchestrator
//! folds it into a [`PipelineRun`], and storage/presentation consume it.

mod adapter;
mod evaluation;
mod repair;
mod run;
mod scenario;
mod security;

pub use adapter::{Adapter, AdapterAnalysis, AdapterChange, PerformanceEstimate};
pub use evaluation::{
    EvaluationResult, EvaluationSummary, ResultSource, ScoreBands, PASS_THRESHOLD,
    PARTIAL_THRESHOLD,
};
pub use repair::{RepairMethod, RepairOutcome, RepairSuggestion, RepairSummary};
pub use run::{PipelineRun, PipelineStep, RunResponse, StepOutput};
pub use scenario::{
    Scenario, ScenarioCategory, ScenarioOrigin, ScenarioSet, ScenarioValidator, Turn, TurnRole,
    ValidatorKind,
};
pub use security::{
    security_score, AttackCategory, DetectionMethod, SecurityReport, Vulnerability,
    PIPELINE_ATTACKS,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ScenarioSynthesis,
    Evaluation,
    SecurityScan,
    Repair,
    AdapterCreation,
}

impl StepKind {
    /// Fixed execution order. The orchestrator never reorders steps.
    pub const ORDERED: [StepKind; 5] = [
        StepKind::ScenarioSynthesis,
        StepKind::Evaluation,
        StepKind::SecurityScan,
        StepKind::Repair,
        StepKind::AdapterCreation,
    ];

    /// Stable short name used in logs, recommendations and step records.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::ScenarioSynthesis => "scenarios",
            StepKind::Evaluation => "evaluation",
            StepKind::SecurityScan => "security_scan",
            StepKind::Repair => "repair",
            StepKind::AdapterCreation => "adapter",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether the status may appear on a step of a terminated run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

/// Certainty bucket attached to the final quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// High at 8 and above, low below 6, medium in between.
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            ConfidenceLevel::High
        } else if score < 6.0 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Medium
        }
    }
}

/// Severity shared by vulnerabilities and repair suggestions.
///
/// Ordered so that `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Accepts the canonical names plus the synonyms generators tend to emit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "minor" | "info" | "informational" => Ok(Severity::Low),
            "medium" | "moderate" | "med" => Ok(Severity::Medium),
            "high" | "major" | "severe" => Ok(Severity::High),
            "critical" | "blocker" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_is_fixed() {
        let names: Vec<_> = StepKind::ORDERED.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["scenarios", "evaluation", "security_scan", "repair", "adapter"]
        );
    }

    #[test]
    fn test_confidence_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(8.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(7.99), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(6.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(5.99), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
    }

    #[test]
    fn test_severity_ordering_and_synonyms() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!("Moderate".parse::<Severity>(), Ok(Severity::Medium));
        assert_eq!("severe".parse::<Severity>(), Ok(Severity::High));
        assert!("unknown".parse::<Severity>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
    }
}
