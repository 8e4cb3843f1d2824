use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    Adapter, ConfidenceLevel, EvaluationSummary, RepairOutcome, RunStatus, ScenarioSet,
    SecurityReport, StepKind, StepStatus,
};
use crate::request::PipelineConfig;

/// Typed step payload handed from a coordinator to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StepOutput {
    Scenarios(ScenarioSet),
    Evaluation(EvaluationSummary),
    Security(SecurityReport),
    Repair(RepairOutcome),
    Adapter(Adapter),
}

impl StepOutput {
    pub fn kind(&self) -> StepKind {
        match self {
            StepOutput::Scenarios(_) => StepKind::ScenarioSynthesis,
            StepOutput::Evaluation(_) => StepKind::Evaluation,
            StepOutput::Security(_) => StepKind::SecurityScan,
            StepOutput::Repair(_) => StepKind::Repair,
            StepOutput::Adapter(_) => StepKind::AdapterCreation,
        }
    }

    /// Prompt text this output wants folded into the run, if any.
    pub fn produced_prompt(&self) -> Option<&str> {
        match self {
            StepOutput::Repair(outcome) => outcome.repaired_prompt.as_deref(),
            StepOutput::Adapter(adapter) => Some(adapter.adapted_prompt.as_str()),
            _ => None,
        }
    }
}

/// One named stage of a run with its own status, timing and cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: Uuid,
    pub kind: StepKind,
    pub name: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub result: Option<StepOutput>,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub cost: f64,
    pub tokens: u64,
}

impl PipelineStep {
    pub fn new(kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: kind.name().to_string(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            result: None,
            error: None,
            skip_reason: None,
            cost: 0.0,
            tokens: 0,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, output: StepOutput, cost: f64, tokens: u64) {
        self.finish(StepStatus::Completed);
        self.result = Some(output);
        self.cost = cost;
        self.tokens = tokens;
    }

    /// A failed step keeps whatever cost was spent before the failure.
    pub fn fail(&mut self, error: impl Into<String>, cost: f64, tokens: u64) {
        self.finish(StepStatus::Failed);
        self.error = Some(error.into());
        self.cost = cost;
        self.tokens = tokens;
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Skipped;
        self.skip_reason = Some(reason.into());
    }

    fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as u64);
    }
}

/// State of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub original_prompt: String,
    pub current_prompt: String,
    pub steps: Vec<PipelineStep>,
    pub config: PipelineConfig,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// A fresh run with every step pending.
    pub fn new(original_prompt: impl Into<String>, config: PipelineConfig) -> Self {
        let original_prompt = original_prompt.into();
        Self {
            id: Uuid::new_v4(),
            current_prompt: original_prompt.clone(),
            original_prompt,
            steps: StepKind::ORDERED.iter().map(|k| PipelineStep::new(*k)).collect(),
            config,
            total_cost: 0.0,
            total_tokens: 0,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn step(&self, kind: StepKind) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn step_mut(&mut self, kind: StepKind) -> Option<&mut PipelineStep> {
        self.steps.iter_mut().find(|s| s.kind == kind)
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn failed_steps(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .map(|s| s.kind)
            .collect()
    }

    /// Output of a completed step.
    pub fn output(&self, kind: StepKind) -> Option<&StepOutput> {
        self.step(kind)
            .filter(|s| s.status == StepStatus::Completed)
            .and_then(|s| s.result.as_ref())
    }

    pub fn evaluation(&self) -> Option<&EvaluationSummary> {
        match self.output(StepKind::Evaluation) {
            Some(StepOutput::Evaluation(summary)) => Some(summary),
            _ => None,
        }
    }

    pub fn security(&self) -> Option<&SecurityReport> {
        match self.output(StepKind::SecurityScan) {
            Some(StepOutput::Security(report)) => Some(report),
            _ => None,
        }
    }

    pub fn repair(&self) -> Option<&RepairOutcome> {
        match self.output(StepKind::Repair) {
            Some(StepOutput::Repair(outcome)) => Some(outcome),
            _ => None,
        }
    }

    pub fn adapter(&self) -> Option<&Adapter> {
        match self.output(StepKind::AdapterCreation) {
            Some(StepOutput::Adapter(adapter)) => Some(adapter),
            _ => None,
        }
    }

    /// Close the run: status from step outcomes, any step left pending or
    /// running is marked skipped so no non-terminal status survives.
    pub fn finalize(&mut self) {
        for step in &mut self.steps {
            if !step.status.is_terminal() {
                step.skip("run terminated before the step executed");
            }
        }
        self.status = if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        self.finished_at = Some(Utc::now());
    }

    /// Close the run as failed during setup. Every step is skipped.
    pub fn abort(&mut self, reason: &str) {
        for step in &mut self.steps {
            if !step.status.is_terminal() {
                step.skip(format!("setup failed: {}", reason));
            }
        }
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// Final result handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run: PipelineRun,
    pub final_prompt: String,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub quality_score: f64,
    pub confidence_level: ConfidenceLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScenarioSet;

    fn run() -> PipelineRun {
        PipelineRun::new("You are a support bot.", PipelineConfig::default())
    }

    #[test]
    fn test_new_run_has_five_pending_steps() {
        let run = run();
        assert_eq!(run.steps.len(), 5);
        assert_eq!(run.count_with_status(StepStatus::Pending), 5);
        assert_eq!(run.current_prompt, run.original_prompt);
    }

    #[test]
    fn test_finalize_leaves_no_pending_steps() {
        let mut run = run();
        run.step_mut(StepKind::ScenarioSynthesis).unwrap().start();
        run.finalize();
        assert!(run.steps.iter().all(|s| s.status.is_terminal()));
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn test_failed_step_marks_run_with_errors() {
        let mut run = run();
        let step = run.step_mut(StepKind::Evaluation).unwrap();
        step.start();
        step.fail("judge unreachable", 0.0, 0);
        run.finalize();
        assert_eq!(run.status, RunStatus::CompletedWithErrors);
        assert_eq!(run.failed_steps(), vec![StepKind::Evaluation]);
    }

    #[test]
    fn test_output_only_visible_when_completed() {
        let mut run = run();
        let step = run.step_mut(StepKind::ScenarioSynthesis).unwrap();
        step.start();
        step.complete(
            StepOutput::Scenarios(ScenarioSet {
                scenarios: vec![],
                requested: 0,
                fallback_used: false,
            }),
            0.01,
            42,
        );
        assert!(run.output(StepKind::ScenarioSynthesis).is_some());
        assert!(run.step(StepKind::ScenarioSynthesis).unwrap().duration_ms.is_some());
        assert!(run.output(StepKind::Evaluation).is_none());
    }

    #[test]
    fn test_abort_marks_failed() {
        let mut run = run();
        run.abort("empty prompt");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.count_with_status(StepStatus::Skipped), 5);
    }

    #[test]
    fn test_step_output_serializes_tagged() {
        let output = StepOutput::Scenarios(ScenarioSet {
            scenarios: vec![],
            requested: 3,
            fallback_used: true,
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "scenarios");
        assert_eq!(json["data"]["requested"], 3);
    }
}
