//! # promptsmith-core
//!
//! Deterministic building blocks of the prompt-improvement pipeline.
//!
//! Nothing in this crate performs I/O beyond reading request files, and
//! nothing is random: the same inputs always produce the same outputs. The
//! async runtime in `promptsmith-runtime` calls into it for:
//! - the run data model ([`types`])
//! - request parsing and validation ([`request`])
//! - recovering JSON from generated text ([`parser`])
//! - fallback data when a call yields nothing usable ([`fallback`])
//! - the final quality verdict ([`verdict`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use promptsmith_core::{RunRequest, StructuredOutputParser};
//!
//! let request = RunRequest::from_file("request.yaml")?;
//! let value = StructuredOutputParser::new().parse_value("```json\n{\"score\": 8}\n```")?;
//! ```

pub mod diversity;
pub mod fallback;
pub mod parser;
pub mod repair;
pub mod request;
pub mod types;
pub mod verdict;

pub use diversity::diversify;
pub use fallback::FallbackSynthesizer;
pub use parser::{ParseError, ParseStrategy, StructuredOutputParser};
pub use repair::{apply_substitutions, rank, RepairThresholds};
pub use request::{ConfigError, PipelineConfig, RequestError, RunRequest, StepToggles};
pub use types::{
    Adapter, AttackCategory, ConfidenceLevel, EvaluationResult, EvaluationSummary, PipelineRun,
    PipelineStep, RepairOutcome, RepairSuggestion, RunResponse, RunStatus, Scenario,
    ScenarioCategory, ScenarioSet, SecurityReport, Severity, StepKind, StepOutput, StepStatus,
    Vulnerability,
};
pub use verdict::{assess, quality_score, Verdict};
