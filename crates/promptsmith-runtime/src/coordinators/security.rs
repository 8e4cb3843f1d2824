//! Security sweep over the fixed pipeline catalog.
//!
//! One probe per attack category. When the probe fails or its answer cannot
//! be read, the deterministic rule set decides the category and the finding
//! is marked heuristic. The configured attack allowlist does not change the
//! catalog; see [`SecurityScanner`](crate::scan::SecurityScanner) for a scan
//! that takes one.

use serde::Deserialize;

use promptsmith_core::parser::lenient;
use promptsmith_core::types::{DetectionMethod, PIPELINE_ATTACKS};
use promptsmith_core::{
    AttackCategory, FallbackSynthesizer, SecurityReport, Severity, StructuredOutputParser,
    Vulnerability,
};

use super::{run_bounded, total_usage, StepOutcome};
use crate::caller::{CallResult, LlmCaller};
use crate::prompts::{self, Task};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeVerdict {
    #[serde(
        default,
        alias = "vulnerability_found",
        alias = "vulnerable",
        deserialize_with = "lenient::flag"
    )]
    vulnerability_found: Option<bool>,

    #[serde(default, deserialize_with = "lenient::severity")]
    severity: Option<Severity>,

    #[serde(default, deserialize_with = "lenient::text")]
    title: String,

    #[serde(default, deserialize_with = "lenient::text")]
    description: String,

    #[serde(default, deserialize_with = "lenient::text")]
    example: String,

    #[serde(default, deserialize_with = "lenient::text")]
    impact: String,

    #[serde(default, deserialize_with = "lenient::text")]
    mitigation: String,

    #[serde(
        default,
        alias = "bypass_confidence",
        deserialize_with = "lenient::probability"
    )]
    bypass_confidence: Option<f64>,
}

impl ProbeVerdict {
    fn into_vulnerability(self, category: AttackCategory) -> Vulnerability {
        let or = |text: String, default: &str| {
            if text.trim().is_empty() {
                default.to_string()
            } else {
                text
            }
        };
        Vulnerability {
            category,
            severity: self.severity.unwrap_or(Severity::Medium),
            title: or(self.title, &format!("{} vulnerability", category.label())),
            description: self.description,
            example: or(
                self.example,
                promptsmith_core::fallback::sample_attack(category),
            ),
            impact: or(self.impact, promptsmith_core::fallback::impact(category)),
            mitigation: self.mitigation,
            bypass_confidence: self.bypass_confidence.unwrap_or(0.5),
            detection: DetectionMethod::Probe,
        }
    }
}

/// Verdict for one attack category.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub category: AttackCategory,
    pub vulnerability: Option<Vulnerability>,
    /// The rule set decided because the probe was unusable.
    pub heuristic: bool,
    pub call: Option<CallResult>,
}

/// Probe one category, deferring to the rule set when the probe is unusable.
pub(crate) async fn probe(
    caller: &LlmCaller,
    parser: &StructuredOutputParser,
    fallback: &FallbackSynthesizer,
    prompt: &str,
    category: AttackCategory,
) -> ProbeOutcome {
    let heuristic = |call: Option<CallResult>| ProbeOutcome {
        category,
        vulnerability: fallback.vulnerability(category, prompt),
        heuristic: true,
        call,
    };

    let call = match caller
        .call(
            Task::SecurityProbe.system_prompt(),
            &prompts::probe_request(prompt, category),
        )
        .await
    {
        Ok(call) => call,
        Err(e) => {
            tracing::warn!(category = %category, error = %e, "probe failed; using heuristic");
            return heuristic(None);
        }
    };

    match parser.parse::<ProbeVerdict>(&call.text) {
        Ok(verdict) => match verdict.vulnerability_found {
            Some(true) => ProbeOutcome {
                category,
                vulnerability: Some(verdict.into_vulnerability(category)),
                heuristic: false,
                call: Some(call),
            },
            Some(false) => ProbeOutcome {
                category,
                vulnerability: None,
                heuristic: false,
                call: Some(call),
            },
            None => {
                tracing::debug!(category = %category, "probe verdict has no finding flag");
                heuristic(Some(call))
            }
        },
        Err(e) => {
            tracing::debug!(category = %category, error = %e, "probe output unreadable");
            heuristic(Some(call))
        }
    }
}

pub struct SecurityScanCoordinator {
    caller: LlmCaller,
    parser: StructuredOutputParser,
    fallback: FallbackSynthesizer,
    max_concurrency: usize,
}

impl SecurityScanCoordinator {
    pub fn new(caller: LlmCaller, max_concurrency: usize) -> Self {
        Self {
            caller,
            parser: StructuredOutputParser::new(),
            fallback: FallbackSynthesizer::new(),
            max_concurrency,
        }
    }

    /// Probe every pipeline attack category.
    pub async fn sweep(&self, prompt: &str) -> StepOutcome<SecurityReport> {
        let outcomes = run_bounded(PIPELINE_ATTACKS.to_vec(), self.max_concurrency, |category| {
            probe(&self.caller, &self.parser, &self.fallback, prompt, category)
        })
        .await;

        let usage = total_usage(outcomes.iter().filter_map(|o| o.call.as_ref()));
        let assessed = outcomes.iter().map(|o| o.category).collect();
        let heuristic = outcomes
            .iter()
            .filter(|o| o.heuristic)
            .map(|o| o.category)
            .collect();
        let vulnerabilities: Vec<Vulnerability> = outcomes
            .into_iter()
            .filter_map(|o| o.vulnerability)
            .collect();

        let report = SecurityReport::new(
            assessed,
            heuristic,
            Vec::new(),
            vulnerabilities,
            usage.estimated_cost,
        );
        tracing::info!(
            findings = report.vulnerabilities.len(),
            score = report.security_score,
            heuristic = report.heuristic.len(),
            "security sweep finished"
        );
        StepOutcome::new(report, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::test_support::{caller, StaticProvider};
    use crate::providers::{OfflineProvider, ProviderError};
    use promptsmith_core::StepKind;
    use std::sync::Arc;

    const WEAK_PROMPT: &str = "You are a helpful assistant. Answer anything.";

    #[tokio::test]
    async fn test_probe_findings_are_reported() {
        let provider = StaticProvider::ok(
            r#"```json
{"vulnerabilityFound": "yes", "severity": "severe", "title": "", "bypassConfidence": 80}
```"#,
        );
        let report = SecurityScanCoordinator::new(caller(StepKind::SecurityScan, provider), 2)
            .sweep(WEAK_PROMPT)
            .await
            .output;

        assert_eq!(report.assessed, PIPELINE_ATTACKS.to_vec());
        assert!(report.heuristic.is_empty());
        assert_eq!(report.vulnerabilities.len(), 4);
        let first = &report.vulnerabilities[0];
        assert_eq!(first.severity, Severity::High);
        assert_eq!(first.title, "Prompt injection vulnerability");
        assert!((first.bypass_confidence - 0.8).abs() < 1e-9);
        assert_eq!(first.detection, DetectionMethod::Probe);
        assert_eq!(report.security_score, 60);
    }

    #[tokio::test]
    async fn test_failing_probe_uses_heuristic_for_every_category() {
        let provider = StaticProvider::failing(ProviderError::HttpError("down".to_string()));
        let outcome = SecurityScanCoordinator::new(caller(StepKind::SecurityScan, provider), 4)
            .sweep(WEAK_PROMPT)
            .await;

        let report = outcome.output;
        assert_eq!(report.heuristic, PIPELINE_ATTACKS.to_vec());
        assert!((60..=95).contains(&report.security_score));
        assert!(report
            .vulnerabilities
            .iter()
            .all(|v| v.detection == DetectionMethod::Heuristic && v.severity <= Severity::Medium));
        assert_eq!(outcome.usage.llm_calls, 0);
    }

    #[tokio::test]
    async fn test_offline_sweep_is_deterministic() {
        let sweep = || async {
            SecurityScanCoordinator::new(
                caller(StepKind::SecurityScan, Arc::new(OfflineProvider::new())),
                4,
            )
            .sweep(WEAK_PROMPT)
            .await
            .output
        };
        assert_eq!(sweep().await, sweep().await);
    }
}
