//! Repair: targeted suggestions per focus area, folded into a new prompt.
//!
//! Suggestions are merged across areas, ranked, capped and filtered by the
//! acceptance thresholds. Accepted suggestions go to a rewrite call; when no
//! provider is available or the rewrite is unusable, their spans are
//! substituted directly, most severe first.

use serde::Deserialize;

use promptsmith_core::parser::lenient;
use promptsmith_core::types::{RepairMethod, RepairSummary};
use promptsmith_core::{
    apply_substitutions, rank, FallbackSynthesizer, RepairOutcome, RepairSuggestion,
    RepairThresholds, Severity, StructuredOutputParser,
};

use super::{run_bounded, total_usage, StepError, StepOutcome};
use crate::caller::{CallResult, LlmCaller};
use crate::prompts::{self, Task};
use crate::providers::ProviderError;
use crate::validation::SuggestionValidator;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposedSuggestion {
    #[serde(default, alias = "focus_area", alias = "area", deserialize_with = "lenient::text")]
    focus_area: String,

    #[serde(default, deserialize_with = "lenient::severity")]
    severity: Option<Severity>,

    #[serde(default, alias = "original_text", alias = "original", deserialize_with = "lenient::text")]
    original_text: String,

    #[serde(default, alias = "suggested_text", alias = "suggestion", deserialize_with = "lenient::text")]
    suggested_text: String,

    #[serde(default, deserialize_with = "lenient::text")]
    reasoning: String,

    #[serde(default, deserialize_with = "lenient::probability")]
    confidence: Option<f64>,

    #[serde(default, deserialize_with = "lenient::text")]
    impact: String,
}

impl ProposedSuggestion {
    fn into_suggestion(self, area: &str) -> Option<RepairSuggestion> {
        if self.suggested_text.trim().is_empty() {
            return None;
        }
        Some(RepairSuggestion {
            focus_area: if self.focus_area.trim().is_empty() {
                area.to_string()
            } else {
                self.focus_area
            },
            severity: self.severity.unwrap_or(Severity::Low),
            original_text: self.original_text,
            suggested_text: self.suggested_text,
            reasoning: self.reasoning,
            confidence: self.confidence.unwrap_or(0.5),
            impact: self.impact,
        })
    }
}

/// Suggestions for one focus area and how they were obtained.
struct AreaAnalysis {
    suggestions: Vec<RepairSuggestion>,
    call: Option<CallResult>,
    error: Option<ProviderError>,
}

pub struct RepairCoordinator {
    caller: LlmCaller,
    parser: StructuredOutputParser,
    fallback: FallbackSynthesizer,
    thresholds: RepairThresholds,
    max_concurrency: usize,
}

impl RepairCoordinator {
    pub fn new(caller: LlmCaller, thresholds: RepairThresholds, max_concurrency: usize) -> Self {
        Self {
            caller,
            parser: StructuredOutputParser::new(),
            fallback: FallbackSynthesizer::new(),
            thresholds,
            max_concurrency,
        }
    }

    /// Analyze `prompt` for each focus area and fold accepted suggestions
    /// into it. Fails only when every analysis call failed at the provider.
    pub async fn repair(
        &self,
        prompt: &str,
        focus_areas: &[String],
        max_suggestions: usize,
    ) -> Result<StepOutcome<RepairOutcome>, StepError> {
        let analyses = run_bounded(focus_areas.to_vec(), self.max_concurrency, |area| async move {
            self.analyze(prompt, &area).await
        })
        .await;

        let failures: Vec<&ProviderError> =
            analyses.iter().filter_map(|a| a.error.as_ref()).collect();
        if !analyses.is_empty() && failures.len() == analyses.len() {
            if let Some(last) = failures.last() {
                return Err(StepError::AllCallsFailed {
                    attempted: analyses.len(),
                    last: (*last).clone(),
                });
            }
        }

        let mut usage = total_usage(analyses.iter().filter_map(|a| a.call.as_ref()));
        let merged: Vec<RepairSuggestion> = analyses
            .into_iter()
            .flat_map(|a| a.suggestions)
            .collect();
        let suggestions = rank(merged, max_suggestions);
        let summary = RepairSummary::from_suggestions(&suggestions);
        let accepted: Vec<&RepairSuggestion> = suggestions
            .iter()
            .filter(|s| self.thresholds.accepts(s))
            .collect();

        tracing::info!(
            total = suggestions.len(),
            accepted = accepted.len(),
            "repair suggestions ranked"
        );

        let (method, applied, repaired) = if accepted.is_empty() {
            (RepairMethod::None, 0, None)
        } else {
            match self.rewrite(prompt, &accepted).await {
                Some((text, call)) => {
                    usage.add(&call.usage, &call.model);
                    (RepairMethod::Rewrite, accepted.len(), Some(text))
                }
                None => {
                    let anchored = SuggestionValidator::new(prompt).anchor_all(&accepted);
                    let refs: Vec<&RepairSuggestion> = anchored.iter().collect();
                    let (text, applied) = apply_substitutions(prompt, &refs);
                    let method = if applied > 0 {
                        RepairMethod::Substitution
                    } else {
                        RepairMethod::None
                    };
                    (method, applied, Some(text))
                }
            }
        };

        let accepted = accepted.len();
        let repaired_prompt = repaired.filter(|text| text != prompt);
        Ok(StepOutcome::new(
            RepairOutcome {
                suggestions,
                summary,
                accepted,
                applied,
                method,
                repaired_prompt,
            },
            usage,
        ))
    }

    async fn analyze(&self, prompt: &str, area: &str) -> AreaAnalysis {
        let call = match self
            .caller
            .call(
                Task::RepairAnalysis.system_prompt(),
                &prompts::analysis_request(prompt, area),
            )
            .await
        {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(focus_area = area, error = %e, "repair analysis failed; advisory fallback");
                // No provider at all is a fallback path, not a failure.
                let error = (!e.is_unavailable()).then_some(e);
                return AreaAnalysis {
                    suggestions: self.fallback.suggestions(area),
                    call: None,
                    error,
                };
            }
        };

        let parsed: Vec<RepairSuggestion> = match self
            .parser
            .parse_array::<ProposedSuggestion>(&call.text, "suggestions")
        {
            Ok(items) => items
                .into_iter()
                .filter_map(|item| item.into_suggestion(area))
                .collect(),
            Err(e) => {
                tracing::debug!(focus_area = area, error = %e, "repair output unreadable");
                Vec::new()
            }
        };

        AreaAnalysis {
            suggestions: if parsed.is_empty() {
                self.fallback.suggestions(area)
            } else {
                parsed
            },
            call: Some(call),
            error: None,
        }
    }

    /// Rewritten prompt, or `None` when no usable rewrite came back.
    async fn rewrite(
        &self,
        prompt: &str,
        accepted: &[&RepairSuggestion],
    ) -> Option<(String, CallResult)> {
        if !self.caller.is_available() {
            tracing::info!("no provider available for rewrite; substituting spans");
            return None;
        }

        let call = match self
            .caller
            .call(
                Task::RepairRewrite.system_prompt(),
                &prompts::rewrite_request(prompt, accepted),
            )
            .await
        {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(error = %e, "rewrite failed; substituting spans");
                return None;
            }
        };

        match self.parser.extract_text(&call.text) {
            Some(text) if !looks_structured(&text) && text.trim() != prompt.trim() => {
                Some((text, call))
            }
            _ => {
                tracing::debug!("rewrite returned nothing new; substituting spans");
                None
            }
        }
    }
}

/// A rewrite that came back as JSON is a record, not a prompt.
fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim_start();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::test_support::{caller, StaticProvider};
    use crate::providers::OfflineProvider;
    use promptsmith_core::StepKind;
    use std::sync::Arc;

    fn areas(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn coordinator(provider: Arc<dyn crate::providers::LlmProvider>) -> RepairCoordinator {
        RepairCoordinator::new(
            caller(StepKind::Repair, provider),
            RepairThresholds::default(),
            2,
        )
    }

    #[tokio::test]
    async fn test_low_confidence_leaves_prompt_unchanged() {
        let provider = StaticProvider::ok(
            r#"{"suggestions": [{"severity": "high", "originalText": "Be nice.", "suggestedText": "Be kind.", "confidence": 0.4}]}"#,
        );
        let outcome = coordinator(provider.clone())
            .repair("You are a bot. Be nice.", &areas(&["clarity", "safety"]), 10)
            .await
            .unwrap()
            .output;

        assert_eq!(outcome.accepted, 0);
        assert_eq!(outcome.method, RepairMethod::None);
        assert!(outcome.repaired_prompt.is_none());
        assert_eq!(outcome.summary.total, 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_offline_rewrite_applies_accepted() {
        let prompt = "Help customers with orders. Never share account numbers.";
        let outcome = coordinator(Arc::new(OfflineProvider::new()))
            .repair(prompt, &areas(&["clarity"]), 10)
            .await
            .unwrap();

        let repair = outcome.output;
        assert_eq!(repair.accepted, 1);
        assert_eq!(repair.method, RepairMethod::Rewrite);
        let repaired = repair.repaired_prompt.unwrap();
        assert!(repaired.starts_with("You are a focused assistant."));
        assert_eq!(outcome.usage.llm_calls, 2);
    }

    #[tokio::test]
    async fn test_all_calls_failing_fails_the_step() {
        let provider = StaticProvider::failing(ProviderError::AuthError);
        let err = coordinator(provider)
            .repair("You are a bot.", &areas(&["clarity", "safety"]), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, StepError::AllCallsFailed { attempted: 2, .. }));
    }

    #[tokio::test]
    async fn test_unavailable_provider_yields_advisory_only() {
        let provider = StaticProvider::failing(ProviderError::Unavailable("open".to_string()));
        let outcome = coordinator(provider)
            .repair("You are a bot.", &areas(&["clarity"]), 10)
            .await
            .unwrap()
            .output;

        assert_eq!(outcome.suggestions.len(), 1);
        assert_eq!(outcome.suggestions[0].confidence, 0.5);
        assert_eq!(outcome.accepted, 0);
        assert!(outcome.repaired_prompt.is_none());
    }

    #[tokio::test]
    async fn test_substitution_when_rewrite_is_unusable() {
        // The rewrite call gets the same JSON reply, which is not a prompt.
        let provider = StaticProvider::ok(
            r#"{"suggestions": [{"severity": "medium", "originalText": "Be  nice.", "suggestedText": "Be kind and precise.", "confidence": 0.9}]}"#,
        );
        let outcome = coordinator(provider)
            .repair("You are a bot. Be nice.", &areas(&["tone"]), 10)
            .await
            .unwrap()
            .output;

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.method, RepairMethod::Substitution);
        assert_eq!(outcome.applied, 1);
        assert_eq!(
            outcome.repaired_prompt.as_deref(),
            Some("You are a bot. Be kind and precise.")
        );
    }
}
