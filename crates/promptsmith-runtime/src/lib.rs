//! # promptsmith-runtime
//!
//! Async LLM runtime for the prompt-improvement pipeline.
//!
//! `promptsmith-core` holds the data model and every deterministic rule.
//! This crate adds the parts that talk to text-generation services:
//! - providers and credentials ([`providers`])
//! - the call gate with circuit breaker, token budget, retry and deadline
//!   ([`caller`], [`resilience`])
//! - one coordinator per pipeline step ([`coordinators`])
//! - the [`PipelineOrchestrator`] that sequences them
//! - the standalone [`SecurityScanner`]
//! - judge caching and run storage
//!
//! Without the `anthropic` feature only the deterministic
//! [`OfflineProvider`] is compiled in, which makes every operation usable
//! without credentials.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use promptsmith_core::RunRequest;
//! use promptsmith_runtime::{OfflineProvider, PipelineOrchestrator, RuntimeConfig};
//!
//! let orchestrator =
//!     PipelineOrchestrator::new(Arc::new(OfflineProvider::new()), RuntimeConfig::default());
//! let response = orchestrator.run(RunRequest::from_file("request.yaml")?).await?;
//! println!("{} ({:?})", response.quality_score, response.confidence_level);
//! ```

pub mod cache;
pub mod caller;
pub mod config;
pub mod coordinators;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod scan;
pub mod store;
pub mod validation;

pub use cache::JudgeCache;
pub use caller::{CallResult, LlmCaller};
pub use config::{ConfigLoadError, RuntimeConfig};
pub use coordinators::{StepError, StepOutcome};
pub use orchestrator::{PipelineError, PipelineOrchestrator};
pub use providers::{LlmProvider, OfflineProvider, ProviderError, ProviderRegistry};
pub use resilience::{BudgetTracker, CircuitBreaker, LlmUsage, RetryPolicy};
pub use scan::SecurityScanner;
pub use store::{InMemoryRunStore, RunStore, StoreError};
pub use validation::SuggestionValidator;

#[cfg(feature = "anthropic")]
pub use providers::AnthropicProvider;
