//! Pipeline orchestrator.
//!
//! Runs the five steps in a fixed order over one prompt:
//! scenario synthesis, evaluation, security scan, repair, adapter.
//!
//! - A disabled or misconfigured step is skipped with a reason.
//! - A failed step is recorded and the run carries on.
//! - Prompt text produced by repair or the adapter is folded forward.
//! - Cost and tokens are summed once per step, from the step's usage. A step
//!   that fails or times out is charged for the calls it completed.
//!
//! The circuit breaker lives on the orchestrator and persists across runs.
//! The token budget belongs to a single run.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use promptsmith_core::{
    assess, PipelineConfig, PipelineRun, RequestError, RunRequest, RunResponse, StepKind,
    StepOutput,
};

use crate::cache::JudgeCache;
use crate::caller::LlmCaller;
use crate::config::RuntimeConfig;
use crate::coordinators::{
    AdapterCoordinator, EvaluationCoordinator, RepairCoordinator, ScenarioSynthesis,
    SecurityScanCoordinator, StepError, StepOutcome,
};
use crate::providers::LlmProvider;
use crate::resilience::{BudgetTracker, CircuitBreaker, LlmUsage};
use crate::store::{RunStore, StoreError};

/// Errors that stop a run before any step executes.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("No stored run with id {0}")]
    PriorRunNotFound(Uuid),

    #[error("No run store configured")]
    StoreNotConfigured,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// State of one run in flight. Only the orchestrator mutates it.
struct RunContext {
    run: PipelineRun,
    budget: Arc<BudgetTracker>,
}

/// Callers built for one step of one run. They share a usage ledger that
/// outlives the step's future.
struct StepCallers<'a> {
    kind: StepKind,
    budget: &'a Arc<BudgetTracker>,
    ledger: Arc<Mutex<LlmUsage>>,
}

pub struct PipelineOrchestrator {
    /// Provider for every step unless evaluation names others
    provider: Arc<dyn LlmProvider>,

    /// Providers addressable from `evaluationProviders`
    named_providers: BTreeMap<String, Arc<dyn LlmProvider>>,

    config: RuntimeConfig,

    breaker: Arc<CircuitBreaker<StepKind>>,

    cache: Option<Arc<JudgeCache>>,

    store: Option<Arc<dyn RunStore>>,
}

impl PipelineOrchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: RuntimeConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(JudgeCache::new(config.cache.max_entries, config.cache.ttl)));

        Self {
            provider,
            named_providers: BTreeMap::new(),
            config,
            breaker,
            cache,
            store: None,
        }
    }

    /// Register a provider under `name` for multi-provider evaluation.
    pub fn with_named_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        self.named_providers.insert(name.into(), provider);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute the pipeline for one request.
    ///
    /// A request that fails validation is recorded as a failed run (when a
    /// store is configured) and returned as an error. Everything after that
    /// point is captured on the run instead.
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, PipelineError> {
        if let Err(e) = request.validate() {
            let mut run = PipelineRun::new(request.original_prompt, request.config);
            tracing::warn!(run_id = %run.id, error = %e, "request rejected");
            run.abort(&e.to_string());
            self.persist(&run, &run.current_prompt).await;
            return Err(PipelineError::InvalidRequest(e));
        }

        let mut ctx = RunContext {
            run: PipelineRun::new(request.original_prompt, request.config),
            budget: Arc::new(BudgetTracker::new(
                self.config.budget.global_max_tokens,
                self.config.budget.per_step_max_tokens,
            )),
        };
        tracing::info!(run_id = %ctx.run.id, "pipeline run started");

        for kind in StepKind::ORDERED {
            self.run_step(&mut ctx, kind).await;
        }

        let RunContext { mut run, budget } = ctx;
        run.finalize();
        let verdict = assess(&run);

        tracing::info!(
            run_id = %run.id,
            status = ?run.status,
            quality = verdict.quality_score,
            cost = run.total_cost,
            tokens = run.total_tokens,
            budget_used = budget.global_used(),
            "pipeline run finished"
        );

        let final_prompt = run.current_prompt.clone();
        self.persist(&run, &final_prompt).await;

        Ok(RunResponse {
            run,
            final_prompt,
            recommendations: verdict.recommendations,
            next_steps: verdict.next_steps,
            quality_score: verdict.quality_score,
            confidence_level: verdict.confidence_level,
        })
    }

    /// Run the pipeline again on the final prompt of a stored run.
    pub async fn run_from_stored(
        &self,
        prior_run_id: Uuid,
        config: PipelineConfig,
    ) -> Result<RunResponse, PipelineError> {
        let store = self.store.as_ref().ok_or(PipelineError::StoreNotConfigured)?;
        let prompt = store
            .fetch_prompt(prior_run_id)
            .await?
            .ok_or(PipelineError::PriorRunNotFound(prior_run_id))?;

        tracing::info!(prior_run_id = %prior_run_id, "refining stored prompt");
        self.run(RunRequest::new(prompt).with_config(config)).await
    }

    async fn run_step(&self, ctx: &mut RunContext, kind: StepKind) {
        let skip_reason = if !ctx.run.config.per_step_enable_flags.is_enabled(kind) {
            Some("disabled in configuration".to_string())
        } else {
            ctx.run.config.config_issue(kind).map(|e| e.to_string())
        };

        let Some(step) = ctx.run.step_mut(kind) else {
            return;
        };
        if let Some(reason) = skip_reason {
            tracing::info!(step = %kind, reason = %reason, "step skipped");
            step.skip(reason);
            return;
        }
        step.start();
        tracing::info!(step = %kind, "step started");

        let callers = StepCallers {
            kind,
            budget: &ctx.budget,
            ledger: Arc::default(),
        };
        let result = self.execute(&ctx.run, &callers).await;
        let spent = callers.ledger.lock().clone();

        let run = &mut ctx.run;
        match result {
            Ok(outcome) => {
                let cost = outcome.usage.estimated_cost;
                let tokens = outcome.usage.total_tokens;
                run.total_cost += cost;
                run.total_tokens += tokens;
                if let Some(prompt) = outcome.output.produced_prompt() {
                    run.current_prompt = prompt.to_string();
                }
                if let Some(step) = run.step_mut(kind) {
                    step.complete(outcome.output, cost, tokens);
                }
                tracing::info!(step = %kind, cost, tokens, "step completed");
            }
            Err(e) => {
                run.total_cost += spent.estimated_cost;
                run.total_tokens += spent.total_tokens;
                tracing::warn!(
                    step = %kind,
                    error = %e,
                    cost = spent.estimated_cost,
                    tokens = spent.total_tokens,
                    "step failed"
                );
                if let Some(step) = run.step_mut(kind) {
                    step.fail(e.to_string(), spent.estimated_cost, spent.total_tokens);
                }
            }
        }
    }

    async fn execute(
        &self,
        run: &PipelineRun,
        callers: &StepCallers<'_>,
    ) -> Result<StepOutcome<StepOutput>, StepError> {
        let config = &run.config;
        let prompt = run.current_prompt.as_str();

        match callers.kind {
            // Synthesis owns its deadline and never fails.
            StepKind::ScenarioSynthesis => Ok(self
                .synthesis(callers)
                .synthesize(prompt, &config.scenario_categories, config.scenario_count)
                .await
                .map(StepOutput::Scenarios)),

            StepKind::Evaluation => {
                let scenarios = match run.output(StepKind::ScenarioSynthesis) {
                    Some(StepOutput::Scenarios(set)) => Some(set.scenarios.as_slice()),
                    _ => None,
                };
                let base = self.caller(callers);
                let coordinator = EvaluationCoordinator::new(
                    self.judges(&base, &config.evaluation_providers),
                    self.synthesis(callers),
                    self.cache.clone(),
                    self.config.max_concurrency,
                );
                self.within(coordinator.evaluate(
                    prompt,
                    scenarios,
                    &config.effective_categories(),
                    config.clamped_scenario_count(),
                ))
                .await
                .map(|outcome| outcome.map(StepOutput::Evaluation))
            }

            StepKind::SecurityScan => {
                let (allowed, unknown) = config.attack_categories();
                if !unknown.is_empty() {
                    tracing::warn!(unknown = ?unknown, "unrecognised attack categories in allowlist");
                }
                tracing::debug!(allowlist = ?allowed, "pipeline sweep ignores the allowlist");
                let coordinator =
                    SecurityScanCoordinator::new(self.caller(callers), self.config.max_concurrency);
                self.within(coordinator.sweep(prompt))
                    .await
                    .map(|outcome| outcome.map(StepOutput::Security))
            }

            StepKind::Repair => {
                let coordinator = RepairCoordinator::new(
                    self.caller(callers),
                    self.config.repair_thresholds,
                    self.config.max_concurrency,
                );
                let max = config.max_suggestions.unwrap_or(self.config.max_suggestions);
                self.within(coordinator.repair(prompt, &config.effective_focus_areas(), max))
                    .await?
                    .map(|outcome| outcome.map(StepOutput::Repair))
            }

            StepKind::AdapterCreation => {
                let provider = config.target_provider.as_deref().unwrap_or_default();
                let model = config.target_model.as_deref().unwrap_or_default();
                let coordinator = AdapterCoordinator::new(self.caller(callers));
                self.within(coordinator.adapt(prompt, provider, model))
                    .await?
                    .map(|outcome| outcome.map(StepOutput::Adapter))
            }
        }
    }

    /// Bound a step by `step_timeout`.
    async fn within<T>(&self, step: impl Future<Output = T>) -> Result<T, StepError> {
        let limit = self.config.step_timeout;
        tokio::time::timeout(limit, step)
            .await
            .map_err(|_| StepError::Timeout(limit))
    }

    fn caller(&self, callers: &StepCallers<'_>) -> LlmCaller {
        LlmCaller::new(
            callers.kind,
            self.provider.clone(),
            self.config.completion_for(callers.kind),
            self.config.retry.clone(),
            self.breaker.clone(),
            callers.budget.clone(),
        )
        .with_ledger(callers.ledger.clone())
    }

    /// Scenario generation on behalf of the step. Evaluation synthesizing its
    /// own set is gated and budgeted as evaluation.
    fn synthesis(&self, callers: &StepCallers<'_>) -> ScenarioSynthesis {
        let caller = LlmCaller::new(
            callers.kind,
            self.provider.clone(),
            self.config.completion_for(StepKind::ScenarioSynthesis),
            self.config.retry.clone(),
            self.breaker.clone(),
            callers.budget.clone(),
        )
        .with_ledger(callers.ledger.clone());
        let deadline = if callers.kind == StepKind::ScenarioSynthesis {
            self.config.step_timeout
        } else {
            self.config.step_timeout / 2
        };
        ScenarioSynthesis::new(caller, self.config.max_concurrency, deadline)
    }

    /// One judge per resolved provider name; the default provider when none
    /// resolve.
    fn judges(&self, base: &LlmCaller, names: &[String]) -> Vec<LlmCaller> {
        let mut judges: Vec<LlmCaller> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for name in names {
            if seen.contains(&name.as_str()) {
                continue;
            }
            seen.push(name);
            match self.named_providers.get(name) {
                Some(provider) => judges.push(base.with_provider(provider.clone())),
                None => tracing::warn!(provider = %name, "unknown evaluation provider; skipped"),
            }
        }
        if judges.is_empty() {
            judges.push(base.clone());
        }
        judges
    }

    async fn persist(&self, run: &PipelineRun, final_prompt: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.store_run(run, final_prompt).await {
                tracing::error!(run_id = %run.id, error = %e, "failed to store run");
            }
        }
    }
}
