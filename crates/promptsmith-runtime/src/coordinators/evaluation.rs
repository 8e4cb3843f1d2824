//! Evaluation: one judge call per (scenario, judge).
//!
//! A judge answer that cannot be read gets the fallback's optimistic score
//! and is marked `parse_fallback`. That score is a placeholder, not a
//! measurement. A failed call is recorded as a zero-score failure and the
//! remaining units still run.

use serde::Deserialize;
use std::sync::Arc;

use promptsmith_core::parser::lenient;
use promptsmith_core::types::ResultSource;
use promptsmith_core::{
    EvaluationResult, EvaluationSummary, FallbackSynthesizer, Scenario, ScenarioCategory,
    StructuredOutputParser,
};

use super::{run_bounded, total_usage, ScenarioSynthesis, StepOutcome};
use crate::cache::{CacheKey, CachedVerdict, JudgeCache};
use crate::caller::{CallResult, LlmCaller};
use crate::prompts::{self, Task};

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    #[serde(
        default,
        alias = "simulatedResponse",
        alias = "simulated_response",
        deserialize_with = "lenient::text"
    )]
    response: String,

    #[serde(default, alias = "rating", deserialize_with = "lenient::score")]
    score: Option<f64>,

    #[serde(default, alias = "explanation", deserialize_with = "lenient::text")]
    reasoning: String,
}

struct Unit<'a> {
    scenario: &'a Scenario,
    input: &'a str,
    judge: &'a LlmCaller,
}

pub struct EvaluationCoordinator {
    judges: Vec<LlmCaller>,
    synthesis: ScenarioSynthesis,
    cache: Option<Arc<JudgeCache>>,
    parser: StructuredOutputParser,
    fallback: FallbackSynthesizer,
    max_concurrency: usize,
}

impl EvaluationCoordinator {
    /// `judges` must not be empty; the orchestrator always passes at least
    /// the default provider.
    pub fn new(
        judges: Vec<LlmCaller>,
        synthesis: ScenarioSynthesis,
        cache: Option<Arc<JudgeCache>>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            judges,
            synthesis,
            cache,
            parser: StructuredOutputParser::new(),
            fallback: FallbackSynthesizer::new(),
            max_concurrency,
        }
    }

    /// Evaluate `prompt` against `scenarios`. With no scenarios, a set of
    /// `count` is synthesized first so at least one scenario is evaluated.
    pub async fn evaluate(
        &self,
        prompt: &str,
        scenarios: Option<&[Scenario]>,
        categories: &[ScenarioCategory],
        count: usize,
    ) -> StepOutcome<EvaluationSummary> {
        match scenarios.filter(|s| s.iter().any(Scenario::is_usable)) {
            Some(scenarios) => self.judge_all(prompt, scenarios, false).await,
            None => {
                tracing::info!(count, "no scenarios reached evaluation; synthesizing");
                let generated = self.synthesis.synthesize(prompt, categories, count).await;
                let mut outcome = self
                    .judge_all(prompt, &generated.output.scenarios, true)
                    .await;
                outcome.usage.merge(&generated.usage);
                outcome
            }
        }
    }

    async fn judge_all(
        &self,
        prompt: &str,
        scenarios: &[Scenario],
        generated: bool,
    ) -> StepOutcome<EvaluationSummary> {
        let mut units = Vec::new();
        for scenario in scenarios {
            let Some(input) = scenario.first_user_turn() else {
                tracing::warn!(scenario = %scenario.id, "scenario has no user turn; not evaluated");
                continue;
            };
            for judge in &self.judges {
                units.push(Unit {
                    scenario,
                    input,
                    judge,
                });
            }
        }

        let outcomes = run_bounded(units, self.max_concurrency, |unit| {
            self.judge_one(prompt, unit)
        })
        .await;

        let usage = total_usage(outcomes.iter().filter_map(|(_, call)| call.as_ref()));
        let results: Vec<EvaluationResult> = outcomes.into_iter().map(|(r, _)| r).collect();
        let scenario_ids = scenarios.iter().map(|s| s.id.clone()).collect();

        let summary = EvaluationSummary::from_results(results, scenario_ids, generated);
        tracing::info!(
            runs = summary.total_runs,
            pass_rate = summary.pass_rate,
            average = summary.average_score,
            "evaluation finished"
        );
        StepOutcome::new(summary, usage)
    }

    async fn judge_one(&self, prompt: &str, unit: Unit<'_>) -> (EvaluationResult, Option<CallResult>) {
        let Unit {
            scenario,
            input,
            judge,
        } = unit;
        let provider = judge.provider_name().to_string();
        let key = CacheKey::new(&provider, judge.model(), prompt, input);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                tracing::trace!(scenario = %scenario.id, provider = %provider, "judge cache hit");
                let result = EvaluationResult::scored(
                    &scenario.id,
                    &provider,
                    hit.response,
                    hit.score,
                    hit.reasoning,
                    ResultSource::Cached,
                );
                return (result, None);
            }
        }

        let call = match judge
            .call(Task::Judge.system_prompt(), &prompts::judge_request(prompt, input))
            .await
        {
            Ok(call) => call,
            Err(e) => {
                return (
                    EvaluationResult::errored(&scenario.id, &provider, format!("judge call failed: {}", e)),
                    None,
                )
            }
        };

        let verdict = self
            .parser
            .parse::<JudgeVerdict>(&call.text)
            .ok()
            .and_then(|v| v.score.map(|score| (v.response, score, v.reasoning)));

        let mut result = match verdict {
            Some((response, score, reasoning)) => {
                if let Some(cache) = &self.cache {
                    cache
                        .insert(
                            key,
                            CachedVerdict {
                                response: response.clone(),
                                score,
                                reasoning: reasoning.clone(),
                            },
                        )
                        .await;
                }
                EvaluationResult::scored(
                    &scenario.id,
                    &provider,
                    response,
                    score,
                    reasoning,
                    ResultSource::Judge,
                )
            }
            None => {
                tracing::debug!(scenario = %scenario.id, "judge output unreadable; optimistic default");
                EvaluationResult::scored(
                    &scenario.id,
                    &provider,
                    call.text.trim(),
                    self.fallback.optimistic_score(&scenario.id),
                    "Judge output could not be parsed; optimistic default score",
                    ResultSource::ParseFallback,
                )
            }
        };

        result.cost = call.cost;
        result.tokens = call.usage.total();
        result.latency_ms = call.latency.as_millis() as u64;
        (result, Some(call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::test_support::{caller, StaticProvider};
    use crate::providers::{LlmProvider, OfflineProvider, ProviderError};
    use promptsmith_core::types::{ScenarioOrigin, Turn};
    use promptsmith_core::StepKind;
    use std::time::Duration;

    fn scenario(id: &str, input: &str) -> Scenario {
        Scenario {
            id: id.to_string(),
            category: ScenarioCategory::UserIntent,
            turns: vec![Turn::user(input)],
            validators: vec![],
            adversarial: false,
            tags: vec![],
            origin: ScenarioOrigin::Generated,
        }
    }

    fn coordinator(
        judges: Vec<Arc<dyn LlmProvider>>,
        cache: Option<Arc<JudgeCache>>,
    ) -> EvaluationCoordinator {
        let synthesis = ScenarioSynthesis::new(
            caller(StepKind::ScenarioSynthesis, Arc::new(OfflineProvider::new())),
            2,
            Duration::from_secs(10),
        );
        EvaluationCoordinator::new(
            judges
                .into_iter()
                .map(|p| caller(StepKind::Evaluation, p))
                .collect(),
            synthesis,
            cache,
            4,
        )
    }

    #[tokio::test]
    async fn test_one_result_per_scenario_and_judge() {
        let a = StaticProvider::ok(r#"{"response": "ok", "score": "8/10", "reasoning": "fine"}"#);
        let b = StaticProvider::ok(r#"{"response": "meh", "score": 5, "reasoning": "thin"}"#);
        let scenarios = vec![scenario("s1", "hello"), scenario("s2", "help me")];

        let outcome = coordinator(vec![a as Arc<dyn LlmProvider>, b], None)
            .evaluate("You are a bot.", Some(&scenarios), &[], 5)
            .await;

        let summary = outcome.output;
        assert_eq!(summary.total_runs, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.bands.partial, 2);
        assert!((summary.average_score - 6.5).abs() < 1e-9);
        assert!(!summary.generated_scenarios);
        assert_eq!(outcome.usage.llm_calls, 4);
        assert!(summary.results.iter().all(|r| r.source == ResultSource::Judge));
    }

    #[tokio::test]
    async fn test_unreadable_judge_gets_optimistic_default() {
        let judge = StaticProvider::ok("I think it went well overall.");
        let scenarios = vec![scenario("s1", "hello")];

        let summary = coordinator(vec![judge as Arc<dyn LlmProvider>], None)
            .evaluate("You are a bot.", Some(&scenarios), &[], 5)
            .await
            .output;

        let result = &summary.results[0];
        assert_eq!(result.source, ResultSource::ParseFallback);
        assert!((7.5..=9.0).contains(&result.score));
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_failed_call_is_zero_score_and_loop_continues() {
        let judge = StaticProvider::failing(ProviderError::ApiError {
            status: 400,
            message: "bad".to_string(),
        });
        let scenarios = vec![scenario("s1", "hello"), scenario("s2", "bye")];

        let summary = coordinator(vec![judge.clone() as Arc<dyn LlmProvider>], None)
            .evaluate("You are a bot.", Some(&scenarios), &[], 5)
            .await
            .output;

        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.passed, 0);
        assert!(summary.results.iter().all(|r| r.source == ResultSource::Error && r.score == 0.0));
        assert_eq!(judge.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_scenarios_are_synthesized() {
        let summary = coordinator(vec![Arc::new(OfflineProvider::new()) as Arc<dyn LlmProvider>], None)
            .evaluate("You are a travel agent.", None, &[], 3)
            .await
            .output;

        assert!(summary.generated_scenarios);
        assert!(summary.total_runs >= 1);
        assert_eq!(summary.scenario_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_calls() {
        let judge = StaticProvider::ok(r#"{"response": "ok", "score": 9, "reasoning": "good"}"#);
        let cache = Arc::new(JudgeCache::default());
        let coordinator = coordinator(vec![judge.clone() as Arc<dyn LlmProvider>], Some(cache));
        let scenarios = vec![scenario("s1", "hello")];

        coordinator.evaluate("p", Some(&scenarios), &[], 1).await;
        let second = coordinator.evaluate("p", Some(&scenarios), &[], 1).await;

        assert_eq!(judge.calls(), 1);
        assert_eq!(second.output.results[0].source, ResultSource::Cached);
        assert_eq!(second.output.results[0].score, 9.0);
        assert_eq!(second.usage.llm_calls, 0);
    }
}
