//! Scenario synthesis.
//!
//! One generation call per category, each asked for its share of the
//! requested count. A category whose call fails or yields nothing usable is
//! filled from the fallback synthesizer, the list is topped up to the
//! requested count, and a diversity pass picks the final set. Synthesis
//! never fails: when the deadline passes, the whole set is fallback and the
//! usage of calls that finished before it is still reported.

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use promptsmith_core::parser::lenient;
use promptsmith_core::types::{ScenarioOrigin, ScenarioValidator, Turn, TurnRole, ValidatorKind};
use promptsmith_core::{
    diversify, FallbackSynthesizer, Scenario, ScenarioCategory, ScenarioSet,
    StructuredOutputParser,
};

use super::{run_bounded, total_usage, StepOutcome};
use crate::caller::{CallResult, LlmCaller};
use crate::prompts::{self, Task};

#[derive(Debug, Deserialize)]
struct GeneratedScenario {
    #[serde(
        default,
        alias = "prompt",
        alias = "userInput",
        alias = "user_input",
        alias = "message"
    )]
    input: Option<String>,

    #[serde(default)]
    turns: Vec<GeneratedTurn>,

    #[serde(default, deserialize_with = "lenient::string_list")]
    tags: Vec<String>,

    #[serde(default, deserialize_with = "lenient::flag")]
    adversarial: Option<bool>,

    #[serde(default)]
    validators: Vec<GeneratedValidator>,
}

#[derive(Debug, Deserialize)]
struct GeneratedTurn {
    #[serde(default)]
    role: Option<String>,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedValidator {
    #[serde(default, rename = "type", alias = "kind")]
    kind: String,

    #[serde(default, deserialize_with = "lenient::text")]
    expected: String,

    #[serde(default, deserialize_with = "lenient::text")]
    description: String,
}

impl GeneratedScenario {
    fn into_scenario(self, category: ScenarioCategory, index: usize) -> Scenario {
        let turns = if self.turns.is_empty() {
            self.input.map(Turn::user).into_iter().collect()
        } else {
            self.turns
                .into_iter()
                .map(|t| Turn {
                    role: match t.role.as_deref().map(str::trim) {
                        Some("assistant") => TurnRole::Assistant,
                        _ => TurnRole::User,
                    },
                    content: t.content,
                })
                .collect()
        };

        let mut tags = self.tags;
        if tags.is_empty() {
            tags.push(category.to_string());
        }

        Scenario {
            id: format!("gen-{}-{}", category, index + 1),
            category,
            turns,
            validators: self
                .validators
                .into_iter()
                .map(|v| ScenarioValidator {
                    kind: ValidatorKind::from_label(&v.kind),
                    expected: v.expected,
                    description: v.description,
                })
                .collect(),
            adversarial: self
                .adversarial
                .unwrap_or(category == ScenarioCategory::Adversarial),
            tags,
            origin: ScenarioOrigin::Generated,
        }
    }
}

/// Scenarios and the call behind them, for one category.
struct CategoryBatch {
    scenarios: Vec<Scenario>,
    call: Option<CallResult>,
}

pub struct ScenarioSynthesis {
    caller: LlmCaller,
    parser: StructuredOutputParser,
    fallback: FallbackSynthesizer,
    max_concurrency: usize,
    deadline: Duration,
}

impl ScenarioSynthesis {
    pub fn new(caller: LlmCaller, max_concurrency: usize, deadline: Duration) -> Self {
        Self {
            caller,
            parser: StructuredOutputParser::new(),
            fallback: FallbackSynthesizer::new(),
            max_concurrency,
            deadline,
        }
    }

    /// At least `count` scenarios across `categories` (all four when empty).
    pub async fn synthesize(
        &self,
        prompt: &str,
        categories: &[ScenarioCategory],
        count: usize,
    ) -> StepOutcome<ScenarioSet> {
        let categories: Vec<ScenarioCategory> = if categories.is_empty() {
            ScenarioCategory::ALL.to_vec()
        } else {
            categories.to_vec()
        };
        let count = count.max(1);
        let spent_before = self.caller.spent();

        match tokio::time::timeout(self.deadline, self.generate(prompt, &categories, count)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    deadline = ?self.deadline,
                    "scenario synthesis timed out; using fallback set"
                );
                let scenarios = diversify(
                    self.fallback.scenarios(prompt, &categories, count),
                    count,
                );
                StepOutcome::new(
                    ScenarioSet {
                        scenarios,
                        requested: count,
                        fallback_used: true,
                    },
                    self.caller.spent().since(&spent_before),
                )
            }
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        categories: &[ScenarioCategory],
        count: usize,
    ) -> StepOutcome<ScenarioSet> {
        let per_category = count.div_ceil(categories.len()).max(1);

        let batches = run_bounded(categories.to_vec(), self.max_concurrency, |category| {
            self.for_category(prompt, category, per_category)
        })
        .await;

        let usage = total_usage(batches.iter().filter_map(|b| b.call.as_ref()));
        let mut combined: Vec<Scenario> = batches.into_iter().flat_map(|b| b.scenarios).collect();

        if combined.len() < count {
            let mut seen: HashSet<String> = combined.iter().map(|s| s.id.clone()).collect();
            let needed = count + combined.len();
            for scenario in self.fallback.scenarios(prompt, categories, needed) {
                if combined.len() >= count {
                    break;
                }
                if seen.insert(scenario.id.clone()) {
                    combined.push(scenario);
                }
            }
            tracing::debug!(total = combined.len(), count, "topped up scenarios from fallback");
        }

        let scenarios = diversify(combined, count);
        let fallback_used = scenarios
            .iter()
            .any(|s| s.origin == ScenarioOrigin::Fallback);

        StepOutcome::new(
            ScenarioSet {
                scenarios,
                requested: count,
                fallback_used,
            },
            usage,
        )
    }

    async fn for_category(
        &self,
        prompt: &str,
        category: ScenarioCategory,
        count: usize,
    ) -> CategoryBatch {
        let request = prompts::scenario_request(prompt, category, count);
        let call = match self
            .caller
            .call(Task::ScenarioGeneration.system_prompt(), &request)
            .await
        {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "scenario generation failed; using fallback");
                return CategoryBatch {
                    scenarios: self.fallback.scenarios_for_category(prompt, category, count),
                    call: None,
                };
            }
        };

        let scenarios: Vec<Scenario> = match self
            .parser
            .parse_array::<GeneratedScenario>(&call.text, "scenarios")
        {
            Ok(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| item.into_scenario(category, i))
                .filter(Scenario::is_usable)
                .collect(),
            Err(e) => {
                tracing::debug!(category = %category, error = %e, "scenario output unreadable");
                Vec::new()
            }
        };

        let scenarios = if scenarios.is_empty() {
            tracing::info!(category = %category, "no usable scenarios generated; using fallback");
            self.fallback.scenarios_for_category(prompt, category, count)
        } else {
            scenarios
        };

        CategoryBatch {
            scenarios,
            call: Some(call),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::test_support::{caller, StallingProvider, StaticProvider};
    use crate::providers::{OfflineProvider, ProviderError};
    use promptsmith_core::StepKind;
    use std::sync::Arc;

    fn synthesis(provider: Arc<dyn crate::providers::LlmProvider>) -> ScenarioSynthesis {
        ScenarioSynthesis::new(
            caller(StepKind::ScenarioSynthesis, provider),
            4,
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_generated_scenarios_fill_request() {
        let outcome = synthesis(Arc::new(OfflineProvider::new()))
            .synthesize("You are a travel agent.", &[], 8)
            .await;

        let set = outcome.output;
        assert_eq!(set.scenarios.len(), 8);
        assert!(!set.fallback_used);
        assert_eq!(outcome.usage.llm_calls, 4);
        let categories: HashSet<_> = set.scenarios.iter().map(|s| s.category).collect();
        assert_eq!(categories.len(), 4);
    }

    #[tokio::test]
    async fn test_failing_provider_falls_back_per_category() {
        let provider = StaticProvider::failing(ProviderError::HttpError("down".to_string()));
        let outcome = synthesis(provider)
            .synthesize(
                "You are a tutor.",
                &[ScenarioCategory::Constraint, ScenarioCategory::EdgeCase],
                5,
            )
            .await;

        let set = outcome.output;
        assert!(set.scenarios.len() >= 5);
        assert!(set.fallback_used);
        assert!(set
            .scenarios
            .iter()
            .all(|s| s.origin == ScenarioOrigin::Fallback));
        assert_eq!(outcome.usage.llm_calls, 0);
    }

    #[tokio::test]
    async fn test_deadline_keeps_usage_of_finished_calls() {
        let provider = StallingProvider::new(2, "no scenarios here");
        let synthesis = ScenarioSynthesis::new(
            caller(StepKind::ScenarioSynthesis, provider.clone()),
            1,
            Duration::from_millis(300),
        );

        let outcome = synthesis.synthesize("You are a tutor.", &[], 4).await;

        assert!(outcome.output.fallback_used);
        assert!(outcome.output.scenarios.len() >= 4);
        assert_eq!(provider.calls(), 3);
        assert_eq!(outcome.usage.llm_calls, 2);
        assert_eq!(outcome.usage.total_tokens, 300);
    }

    #[tokio::test]
    async fn test_unusable_items_are_dropped() {
        let provider = StaticProvider::ok(
            r#"{"scenarios": [{"input": "   "}, {"turns": [{"role": "user", "content": "Plan a trip"}], "adversarial": "no"}]}"#,
        );
        let outcome = synthesis(provider)
            .synthesize("You are a travel agent.", &[ScenarioCategory::UserIntent], 1)
            .await;

        let set = outcome.output;
        assert_eq!(set.scenarios.len(), 1);
        assert_eq!(set.scenarios[0].first_user_turn(), Some("Plan a trip"));
        assert_eq!(set.scenarios[0].origin, ScenarioOrigin::Generated);
        assert!(!set.scenarios[0].adversarial);
    }

    #[tokio::test]
    async fn test_short_generation_is_topped_up() {
        let provider = StaticProvider::ok(r#"[{"input": "Book a flight to Oslo"}]"#);
        let outcome = synthesis(provider)
            .synthesize("You are a travel agent.", &[ScenarioCategory::UserIntent], 6)
            .await;

        let set = outcome.output;
        assert_eq!(set.scenarios.len(), 6);
        assert!(set.fallback_used);
        assert!(set
            .scenarios
            .iter()
            .any(|s| s.origin == ScenarioOrigin::Generated));
    }
}
