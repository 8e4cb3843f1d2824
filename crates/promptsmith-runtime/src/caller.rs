//! Gate in front of every provider call.
//!
//! A call is refused without reaching the provider when the step's circuit
//! is open or the run's token budget cannot cover it. Otherwise it runs under
//! the per-call deadline with retries, and the outcome feeds the breaker and
//! the budget.
//!
//! Every call that completes is also added to the caller's usage ledger at
//! the moment it returns, so spend survives a step that is cancelled later.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use promptsmith_core::StepKind;

use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError, TokenUsage};
use crate::resilience::{cost_of, BudgetTracker, CircuitBreaker, LlmUsage, RetryPolicy};

/// Text and accounting of one successful call.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub text: String,
    pub usage: TokenUsage,
    /// Model that answered, as reported by the provider
    pub model: String,
    /// Estimated USD cost
    pub cost: f64,
    pub latency: Duration,
}

/// Calls one provider on behalf of one step of one run.
#[derive(Clone)]
pub struct LlmCaller {
    step: StepKind,
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    call_timeout: Duration,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker<StepKind>>,
    budget: Arc<BudgetTracker>,
    ledger: Arc<Mutex<LlmUsage>>,
}

impl LlmCaller {
    pub fn new(
        step: StepKind,
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        retry: RetryPolicy,
        breaker: Arc<CircuitBreaker<StepKind>>,
        budget: Arc<BudgetTracker>,
    ) -> Self {
        Self {
            step,
            call_timeout: completion.timeout,
            provider,
            completion,
            retry,
            breaker,
            budget,
            ledger: Arc::default(),
        }
    }

    /// Record completed calls into `ledger`, shared with whoever else holds it.
    pub fn with_ledger(mut self, ledger: Arc<Mutex<LlmUsage>>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Same gate and ledger, different provider. Used for multi-provider
    /// evaluation.
    pub fn with_provider(&self, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            ..self.clone()
        }
    }

    pub fn step(&self) -> StepKind {
        self.step
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    /// Snapshot of every completed call recorded in this caller's ledger.
    pub fn spent(&self) -> LlmUsage {
        self.ledger.lock().clone()
    }

    /// False when a call would be refused before reaching the provider.
    pub fn is_available(&self) -> bool {
        !self.breaker.is_open(self.step) && self.budget.remaining(self.step) > 0
    }

    /// One system + user exchange.
    pub async fn call(&self, system: &str, user: &str) -> Result<CallResult, ProviderError> {
        if self.breaker.is_open(self.step) {
            tracing::debug!(step = %self.step, "circuit open, call refused");
            return Err(ProviderError::Unavailable(format!(
                "circuit open for step {}",
                self.step
            )));
        }

        let estimated = self
            .provider
            .estimate_tokens(system)
            .saturating_add(self.provider.estimate_tokens(user))
            .saturating_add(self.completion.max_tokens);
        let Some(reservation) = self.budget.reserve(self.step, estimated) else {
            let remaining = self.budget.remaining(self.step);
            tracing::warn!(step = %self.step, estimated, remaining, "token budget exhausted");
            return Err(ProviderError::BudgetExceeded {
                requested: estimated,
                remaining,
            });
        };

        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let started = Instant::now();
        let result = self
            .retry
            .run(|| {
                let messages = messages.clone();
                async move {
                    match tokio::time::timeout(
                        self.call_timeout,
                        self.provider.complete(messages, &self.completion),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
                    }
                }
            })
            .await;

        match result {
            Ok(response) => {
                self.breaker.record_success(self.step);
                reservation.settle(response.usage.total());
                self.ledger.lock().add(&response.usage, &response.model);
                let cost = cost_of(&response.usage, &response.model);
                Ok(CallResult {
                    text: response.content,
                    usage: response.usage,
                    model: response.model,
                    cost,
                    latency: started.elapsed(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    step = %self.step,
                    provider = self.provider.name(),
                    error = %e,
                    "provider call failed"
                );
                self.breaker.record_failure(self.step);
                Err(e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::resilience::CircuitBreakerConfig;

    #[tokio::test]
    async fn test_successful_call_is_accounted() {
        let provider = StaticProvider::ok("hello");
        let caller = caller(StepKind::Repair, provider.clone());

        let result = caller.call("system", "user").await.unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.usage.total(), 150);
        assert!(result.cost > 0.0);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_open_circuit_refuses_without_calling() {
        let provider = StaticProvider::failing(ProviderError::HttpError("reset".to_string()));
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }));
        let caller = LlmCaller::new(
            StepKind::SecurityScan,
            provider.clone(),
            CompletionConfig::default(),
            RetryPolicy::none(),
            breaker,
            Arc::new(BudgetTracker::default()),
        );

        assert!(caller.call("s", "u").await.is_err());
        assert!(caller.call("s", "u").await.is_err());
        assert!(!caller.is_available());

        let refused = caller.call("s", "u").await.unwrap_err();
        assert!(refused.is_unavailable());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_budget_refuses() {
        let provider = StaticProvider::ok("{}");
        let caller = LlmCaller::new(
            StepKind::Evaluation,
            provider.clone(),
            CompletionConfig::default(),
            RetryPolicy::none(),
            Arc::new(CircuitBreaker::default()),
            Arc::new(BudgetTracker::new(1000, 1000)),
        );

        let err = caller.call("s", "u").await.unwrap_err();
        assert!(matches!(err, ProviderError::BudgetExceeded { .. }));
        assert_eq!(provider.calls(), 0);
    }

    /// Answers after a short delay so calls overlap.
    struct SlowProvider(Arc<StaticProvider>);

    #[async_trait::async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<crate::providers::CompletionResponse, ProviderError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.complete(messages, config).await
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_overlapping_calls_cannot_overshoot_step_ceiling() {
        let inner = StaticProvider::ok("{}");
        let budget = Arc::new(BudgetTracker::new(10_000, 1000));
        let caller = LlmCaller::new(
            StepKind::SecurityScan,
            Arc::new(SlowProvider(inner.clone())),
            CompletionConfig {
                max_tokens: 300,
                ..CompletionConfig::default()
            },
            RetryPolicy::none(),
            Arc::new(CircuitBreaker::default()),
            budget.clone(),
        );

        let results =
            futures::future::join_all((0..5).map(|_| caller.call("s", "u"))).await;

        let admitted = results.iter().filter(|r| r.is_ok()).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(ProviderError::BudgetExceeded { .. })))
            .count();
        assert_eq!((admitted, refused), (3, 2));
        assert_eq!(inner.calls(), 3);
        assert_eq!(budget.global_used(), 450);
    }

    #[tokio::test]
    async fn test_ledger_is_shared_across_providers() {
        let first = StaticProvider::ok("a");
        let second = StaticProvider::ok("b");
        let caller = caller(StepKind::Evaluation, first);
        let other = caller.with_provider(second);

        caller.call("s", "u").await.unwrap();
        other.call("s", "u").await.unwrap();

        assert_eq!(caller.spent().llm_calls, 2);
        assert_eq!(other.spent().total_tokens, 300);
    }

    #[tokio::test]
    async fn test_failed_call_adds_nothing_to_ledger() {
        let ledger = Arc::new(Mutex::new(LlmUsage::default()));
        let caller = caller(
            StepKind::Repair,
            StaticProvider::failing(ProviderError::HttpError("reset".to_string())),
        )
        .with_ledger(ledger.clone());

        assert!(caller.call("s", "u").await.is_err());
        assert_eq!(*ledger.lock(), LlmUsage::default());
    }
}
