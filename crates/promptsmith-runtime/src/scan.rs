//! Standalone security scan.
//!
//! Unlike the pipeline sweep, the caller picks the attack categories (the
//! full catalog is available) and sets a cost ceiling. Probes run one at a
//! time; once the accumulated cost reaches the ceiling no further probes
//! are issued and the remaining categories are reported as unscanned.

use promptsmith_core::{
    AttackCategory, FallbackSynthesizer, SecurityReport, StructuredOutputParser,
};

use crate::caller::LlmCaller;
use crate::coordinators::{self, StepOutcome};
use crate::resilience::LlmUsage;

pub struct SecurityScanner {
    caller: LlmCaller,
    parser: StructuredOutputParser,
    fallback: FallbackSynthesizer,
    /// USD; `None` scans every category
    cost_ceiling: Option<f64>,
}

impl SecurityScanner {
    pub fn new(caller: LlmCaller) -> Self {
        Self {
            caller,
            parser: StructuredOutputParser::new(),
            fallback: FallbackSynthesizer::new(),
            cost_ceiling: None,
        }
    }

    pub fn with_cost_ceiling(mut self, ceiling: f64) -> Self {
        self.cost_ceiling = Some(ceiling);
        self
    }

    /// Probe `attacks` in order. An empty list scans the full catalog.
    pub async fn scan(&self, prompt: &str, attacks: &[AttackCategory]) -> StepOutcome<SecurityReport> {
        let attacks: Vec<AttackCategory> = if attacks.is_empty() {
            AttackCategory::ALL.to_vec()
        } else {
            let mut unique = Vec::new();
            for category in attacks {
                if !unique.contains(category) {
                    unique.push(*category);
                }
            }
            unique
        };

        let mut usage = LlmUsage::default();
        let mut assessed = Vec::new();
        let mut heuristic = Vec::new();
        let mut vulnerabilities = Vec::new();
        let mut unscanned = Vec::new();

        for category in attacks {
            if self
                .cost_ceiling
                .is_some_and(|ceiling| usage.estimated_cost >= ceiling)
            {
                unscanned.push(category);
                continue;
            }

            let outcome =
                coordinators::security::probe(&self.caller, &self.parser, &self.fallback, prompt, category)
                    .await;
            if let Some(call) = &outcome.call {
                usage.add(&call.usage, &call.model);
            }
            assessed.push(category);
            if outcome.heuristic {
                heuristic.push(category);
            }
            vulnerabilities.extend(outcome.vulnerability);
        }

        if !unscanned.is_empty() {
            tracing::warn!(
                unscanned = unscanned.len(),
                cost = usage.estimated_cost,
                "cost ceiling reached; scan incomplete"
            );
        }

        let report = SecurityReport::new(
            assessed,
            heuristic,
            unscanned,
            vulnerabilities,
            usage.estimated_cost,
        );
        StepOutcome::new(report, usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::test_support::{caller, StaticProvider};
    use crate::providers::OfflineProvider;
    use promptsmith_core::StepKind;
    use std::sync::Arc;

    const PROMPT: &str = "You are a helpful assistant.";

    #[tokio::test]
    async fn test_empty_list_scans_full_catalog() {
        let report = SecurityScanner::new(caller(
            StepKind::SecurityScan,
            Arc::new(OfflineProvider::new()),
        ))
        .scan(PROMPT, &[])
        .await
        .output;

        assert_eq!(report.assessed, AttackCategory::ALL.to_vec());
        assert!(report.unscanned.is_empty());
    }

    #[tokio::test]
    async fn test_cost_ceiling_stops_probing() {
        let provider = StaticProvider::ok(r#"{"vulnerabilityFound": false}"#);
        let scanner = SecurityScanner::new(caller(StepKind::SecurityScan, provider.clone()))
            .with_cost_ceiling(0.0001);

        let outcome = scanner
            .scan(
                PROMPT,
                &[
                    AttackCategory::Jailbreak,
                    AttackCategory::PiiLeakage,
                    AttackCategory::SystemPromptLeak,
                ],
            )
            .await;

        let report = outcome.output;
        assert_eq!(report.assessed, vec![AttackCategory::Jailbreak]);
        assert_eq!(
            report.unscanned,
            vec![AttackCategory::PiiLeakage, AttackCategory::SystemPromptLeak]
        );
        assert_eq!(provider.calls(), 1);
        assert!(report.total_cost >= 0.0001);
    }

    #[tokio::test]
    async fn test_duplicates_are_scanned_once() {
        let provider = StaticProvider::ok(r#"{"vulnerabilityFound": false}"#);
        let report = SecurityScanner::new(caller(StepKind::SecurityScan, provider.clone()))
            .scan(PROMPT, &[AttackCategory::Jailbreak, AttackCategory::Jailbreak])
            .await
            .output;

        assert_eq!(report.assessed.len(), 1);
        assert_eq!(report.security_score, 95);
        assert_eq!(provider.calls(), 1);
    }
}
