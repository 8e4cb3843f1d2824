//! Provider-specific adaptation of the current prompt.

use serde::Deserialize;

use promptsmith_core::parser::lenient;
use promptsmith_core::types::{AdapterAnalysis, AdapterChange, PerformanceEstimate};
use promptsmith_core::{Adapter, FallbackSynthesizer, StructuredOutputParser};

use super::{total_usage, StepError, StepOutcome};
use crate::caller::LlmCaller;
use crate::prompts::{self, Task};
use crate::resilience::LlmUsage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdaptationReply {
    #[serde(default, alias = "adapted_prompt", alias = "prompt", deserialize_with = "lenient::text")]
    adapted_prompt: String,

    #[serde(default)]
    changes: Vec<ReplyChange>,

    #[serde(default)]
    analysis: Option<ReplyAnalysis>,

    #[serde(default)]
    metrics: Option<ReplyMetrics>,
}

/// Changes arrive as labeled objects or as bare strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplyChange {
    Labeled {
        #[serde(alias = "type", alias = "category")]
        label: String,
        #[serde(default, deserialize_with = "lenient::text")]
        description: String,
    },
    Plain(String),
}

impl From<ReplyChange> for AdapterChange {
    fn from(change: ReplyChange) -> Self {
        match change {
            ReplyChange::Labeled { label, description } => AdapterChange { label, description },
            ReplyChange::Plain(description) => AdapterChange {
                label: "change".to_string(),
                description,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyAnalysis {
    #[serde(default, alias = "token_impact", deserialize_with = "lenient::text")]
    token_impact: String,
    #[serde(default, alias = "performance_impact", deserialize_with = "lenient::text")]
    performance_impact: String,
    #[serde(default, alias = "safety_impact", deserialize_with = "lenient::text")]
    safety_impact: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyMetrics {
    #[serde(default, alias = "token_change_pct", deserialize_with = "lenient::score")]
    token_change_pct: Option<f64>,
    #[serde(default, alias = "quality_delta", deserialize_with = "lenient::score")]
    quality_delta: Option<f64>,
}

pub struct AdapterCoordinator {
    caller: LlmCaller,
    parser: StructuredOutputParser,
    fallback: FallbackSynthesizer,
}

impl AdapterCoordinator {
    pub fn new(caller: LlmCaller) -> Self {
        Self {
            caller,
            parser: StructuredOutputParser::new(),
            fallback: FallbackSynthesizer::new(),
        }
    }

    /// Rewrite `prompt` for `provider`/`model`. The templated adapter stands
    /// in when no provider is available or the reply cannot be read; any
    /// other provider error fails the step.
    pub async fn adapt(
        &self,
        prompt: &str,
        provider: &str,
        model: &str,
    ) -> Result<StepOutcome<Adapter>, StepError> {
        let templated = || {
            StepOutcome::new(
                self.fallback.adapter(prompt, provider, model),
                LlmUsage::default(),
            )
        };

        if !self.caller.is_available() {
            tracing::info!(provider, model, "no provider available; templated adapter");
            return Ok(templated());
        }

        let call = match self
            .caller
            .call(
                Task::Adaptation.system_prompt(),
                &prompts::adapter_request(prompt, provider, model),
            )
            .await
        {
            Ok(call) => call,
            Err(e) if e.is_unavailable() => {
                tracing::info!(error = %e, "adapter call refused; templated adapter");
                return Ok(templated());
            }
            Err(e) => return Err(StepError::Provider(e)),
        };
        let usage = total_usage([&call]);

        let reply = match self.parser.parse::<AdaptationReply>(&call.text) {
            Ok(reply) if !reply.adapted_prompt.trim().is_empty() => reply,
            Ok(_) => {
                tracing::debug!("adapter reply has no prompt; templated adapter");
                return Ok(templated().with_usage(usage));
            }
            Err(e) => {
                tracing::debug!(error = %e, "adapter reply unreadable; templated adapter");
                return Ok(templated().with_usage(usage));
            }
        };

        let adapter = Adapter {
            target_provider: provider.to_string(),
            target_model: model.to_string(),
            original_prompt: prompt.to_string(),
            adapted_prompt: reply.adapted_prompt.trim().to_string(),
            changes: reply.changes.into_iter().map(AdapterChange::from).collect(),
            analysis: reply.analysis.map(|a| AdapterAnalysis {
                token_impact: a.token_impact,
                performance_impact: a.performance_impact,
                safety_impact: a.safety_impact,
            }),
            metrics: reply.metrics.map(|m| PerformanceEstimate {
                token_change_pct: m.token_change_pct,
                quality_delta: m.quality_delta,
            }),
            templated: false,
        };
        Ok(StepOutcome::new(adapter, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::test_support::{caller, StaticProvider};
    use crate::providers::{OfflineProvider, ProviderError};
    use promptsmith_core::StepKind;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_offline_adaptation() {
        let adapter = AdapterCoordinator::new(caller(
            StepKind::AdapterCreation,
            Arc::new(OfflineProvider::new()),
        ))
        .adapt("You are a tutor.", "anthropic", "claude-sonnet-4-5")
        .await
        .unwrap()
        .output;

        assert!(!adapter.templated);
        assert!(adapter.adapted_prompt.starts_with("<instructions>"));
        assert_eq!(adapter.changes[0].label, "xml_sections");
        assert!(adapter.analysis.is_some());
        assert!(adapter.metrics.unwrap().token_change_pct.is_some());
    }

    #[tokio::test]
    async fn test_plain_string_changes() {
        let provider = StaticProvider::ok(
            r#"{"adaptedPrompt": "SYSTEM: be brief", "changes": ["shorter", {"type": "format", "description": "caps"}]}"#,
        );
        let adapter = AdapterCoordinator::new(caller(StepKind::AdapterCreation, provider))
            .adapt("Be brief.", "openai", "gpt-4o")
            .await
            .unwrap()
            .output;

        assert_eq!(adapter.adapted_prompt, "SYSTEM: be brief");
        assert_eq!(adapter.changes.len(), 2);
        assert_eq!(adapter.changes[0].label, "change");
        assert_eq!(adapter.changes[1].label, "format");
        assert!(adapter.analysis.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_reply_is_templated() {
        let provider = StaticProvider::ok("Sure! Here is a better prompt, trust me.");
        let outcome = AdapterCoordinator::new(caller(StepKind::AdapterCreation, provider))
            .adapt("Be brief.", "openai", "gpt-4o")
            .await
            .unwrap();

        assert!(outcome.output.templated);
        assert_eq!(outcome.usage.llm_calls, 1);
    }

    #[tokio::test]
    async fn test_provider_error_fails_step() {
        let provider = StaticProvider::failing(ProviderError::ApiError {
            status: 500,
            message: "boom".to_string(),
        });
        let result = AdapterCoordinator::new(caller(StepKind::AdapterCreation, provider))
            .adapt("Be brief.", "openai", "gpt-4o")
            .await;

        assert!(matches!(result, Err(StepError::Provider(_))));
    }
}
