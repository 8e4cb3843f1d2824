//! Verdict: folds a finished run into a quality score and advice.
//!
//! The scoring rules are fixed:
//! 1. 0.4 x the average evaluation score (0 when evaluation did not complete)
//! 2. +3 when the security step completed with no critical vulnerability
//! 3. +2 when the repair step completed with fewer than 5 outstanding suggestions
//! 4. Capped at 10
//!
//! Bonuses only count for completed steps, so a run with every step disabled
//! scores 0.

use serde::{Deserialize, Serialize};

use crate::types::{
    ConfidenceLevel, PipelineRun, ResultSource, Severity, StepKind, StepOutput, StepStatus,
};

const EVALUATION_WEIGHT: f64 = 0.4;
const SECURITY_BONUS: f64 = 3.0;
const REPAIR_BONUS: f64 = 2.0;
const MAX_OUTSTANDING_FOR_BONUS: usize = 5;
const EVALUATE_FURTHER_BELOW: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub quality_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
}

/// The scoring formula on its own.
pub fn quality_score(average_evaluation: f64, security_clean: bool, repair_settled: bool) -> f64 {
    let average = if average_evaluation.is_finite() {
        average_evaluation.clamp(0.0, 10.0)
    } else {
        0.0
    };
    let mut score = EVALUATION_WEIGHT * average;
    if security_clean {
        score += SECURITY_BONUS;
    }
    if repair_settled {
        score += REPAIR_BONUS;
    }
    score.min(10.0)
}

/// Assess a run whose steps have all terminated.
pub fn assess(run: &PipelineRun) -> Verdict {
    let average = run.evaluation().map(|e| e.average_score).unwrap_or(0.0);
    let security_clean = run.security().map(|s| s.critical_count() == 0).unwrap_or(false);
    let repair_settled = run
        .repair()
        .map(|r| r.outstanding() < MAX_OUTSTANDING_FOR_BONUS)
        .unwrap_or(false);

    let score = quality_score(average, security_clean, repair_settled);

    Verdict {
        quality_score: score,
        confidence_level: ConfidenceLevel::from_score(score),
        recommendations: recommendations(run),
        next_steps: next_steps(run, average),
    }
}

fn recommendations(run: &PipelineRun) -> Vec<String> {
    run.steps
        .iter()
        .map(|step| match step.status {
            StepStatus::Completed => completed_line(run, step.kind),
            StepStatus::Failed => format!(
                "{}: failed ({})",
                step.kind,
                step.error.as_deref().unwrap_or("unknown error")
            ),
            StepStatus::Skipped => format!(
                "{}: skipped ({})",
                step.kind,
                step.skip_reason.as_deref().unwrap_or("disabled")
            ),
            StepStatus::Pending | StepStatus::Running => {
                format!("{}: did not finish", step.kind)
            }
        })
        .collect()
}

fn completed_line(run: &PipelineRun, kind: StepKind) -> String {
    match kind {
        StepKind::ScenarioSynthesis => {
            let (count, fallback) = match run.output(kind) {
                Some(StepOutput::Scenarios(set)) => {
                    (set.scenarios.len(), set.fallback_used)
                }
                _ => (0, false),
            };
            if fallback {
                format!("{}: {} test scenarios, some from built-in templates", kind, count)
            } else {
                format!("{}: {} test scenarios generated", kind, count)
            }
        }
        StepKind::Evaluation => match run.evaluation() {
            Some(e) => {
                let fallback = e
                    .results
                    .iter()
                    .filter(|r| r.source == ResultSource::ParseFallback)
                    .count();
                let mut line = format!(
                    "{}: {}/{} passed, average score {:.1}/10",
                    kind, e.passed, e.total_runs, e.average_score
                );
                if fallback > 0 {
                    line.push_str(&format!(
                        "; {} scored by default because the judge output was unreadable",
                        fallback
                    ));
                }
                line
            }
            None => format!("{}: completed", kind),
        },
        StepKind::SecurityScan => match run.security() {
            Some(s) if s.vulnerabilities.is_empty() => {
                format!("{}: no vulnerabilities found, score {}/100", kind, s.security_score)
            }
            Some(s) => format!(
                "{}: {} vulnerabilities ({} critical), score {}/100; address them before deployment",
                kind,
                s.vulnerabilities.len(),
                s.critical_count(),
                s.security_score
            ),
            None => format!("{}: completed", kind),
        },
        StepKind::Repair => match run.repair() {
            Some(r) if r.applied > 0 => format!(
                "{}: {} of {} suggestions applied; review the revised prompt",
                kind,
                r.applied,
                r.suggestions.len()
            ),
            Some(r) => format!(
                "{}: {} suggestions, none applied automatically",
                kind,
                r.suggestions.len()
            ),
            None => format!("{}: completed", kind),
        },
        StepKind::AdapterCreation => match run.adapter() {
            Some(a) if a.templated => format!(
                "{}: templated guidance added for {} {}",
                kind, a.target_provider, a.target_model
            ),
            Some(a) => format!(
                "{}: prompt rewritten for {} {}",
                kind, a.target_provider, a.target_model
            ),
            None => format!("{}: completed", kind),
        },
    }
}

fn next_steps(run: &PipelineRun, average: f64) -> Vec<String> {
    let mut steps = Vec::new();

    let failed = run.failed_steps();
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|k| k.name()).collect();
        steps.push(format!("Retry failed steps: {}", names.join(", ")));
    }

    if let Some(security) = run.security() {
        let critical: Vec<&str> = security
            .vulnerabilities
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .map(|v| v.title.as_str())
            .collect();
        if !critical.is_empty() {
            steps.push(format!(
                "Fix critical vulnerabilities immediately: {}",
                critical.join(", ")
            ));
        }
    }

    if average < EVALUATE_FURTHER_BELOW {
        if run.evaluation().is_some() {
            steps.push(format!(
                "Evaluate further: average score {:.1} is below {:.1}",
                average, EVALUATE_FURTHER_BELOW
            ));
        } else {
            steps.push("Evaluate further: no evaluation results for this prompt".to_string());
        }
    }

    if steps.is_empty() {
        steps.push("Ready for deployment; re-run the pipeline after significant edits".to_string());
    }
    steps
}
