use serde::{Deserialize, Serialize};

/// A judge score at or above this value is a pass.
pub const PASS_THRESHOLD: f64 = 7.0;

/// Scores in `[PARTIAL_THRESHOLD, PASS_THRESHOLD)` count as partial.
pub const PARTIAL_THRESHOLD: f64 = 4.0;

/// How an evaluation result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Parsed from a judge call.
    Judge,
    /// Reused from the judge cache; no call was made.
    Cached,
    /// Judge output could not be parsed. The score is an optimistic default,
    /// not a measurement.
    ParseFallback,
    /// The judge call itself failed; recorded as a zero score.
    Error,
}

/// One result per (scenario, provider) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scenario_id: String,
    pub provider: String,
    pub response: String,
    pub score: f64,
    pub passed: bool,
    pub reasoning: String,
    pub cost: f64,
    pub tokens: u32,
    pub latency_ms: u64,
    pub source: ResultSource,
}

impl EvaluationResult {
    /// Build a result, clamping the score and deriving `passed`.
    pub fn scored(
        scenario_id: impl Into<String>,
        provider: impl Into<String>,
        response: impl Into<String>,
        score: f64,
        reasoning: impl Into<String>,
        source: ResultSource,
    ) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 10.0)
        } else {
            0.0
        };
        Self {
            scenario_id: scenario_id.into(),
            provider: provider.into(),
            response: response.into(),
            score,
            passed: score >= PASS_THRESHOLD,
            reasoning: reasoning.into(),
            cost: 0.0,
            tokens: 0,
            latency_ms: 0,
            source,
        }
    }

    /// A failed judge call: zero score, not passed.
    pub fn errored(
        scenario_id: impl Into<String>,
        provider: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::scored(scenario_id, provider, "", 0.0, error, ResultSource::Error)
    }
}

/// Score-band histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBands {
    pub pass: usize,
    pub partial: usize,
    pub fail: usize,
}

/// Aggregated output of the evaluation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_runs: usize,
    pub passed: usize,
    pub pass_rate: f64,
    pub average_score: f64,
    pub bands: ScoreBands,
    pub average_latency_ms: f64,
    pub total_cost: f64,
    pub total_tokens: u64,
    /// Scenarios evaluated, echoed so the report is self-contained.
    pub scenario_ids: Vec<String>,
    /// True when the step had to generate its own scenarios.
    pub generated_scenarios: bool,
    pub results: Vec<EvaluationResult>,
}

impl EvaluationSummary {
    pub fn from_results(
        results: Vec<EvaluationResult>,
        scenario_ids: Vec<String>,
        generated_scenarios: bool,
    ) -> Self {
        let total_runs = results.len();
        let passed = results.iter().filter(|r| r.passed).count();

        let mut bands = ScoreBands::default();
        for r in &results {
            if r.score >= PASS_THRESHOLD {
                bands.pass += 1;
            } else if r.score >= PARTIAL_THRESHOLD {
                bands.partial += 1;
            } else {
                bands.fail += 1;
            }
        }

        let (pass_rate, average_score, average_latency_ms) = if total_runs == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let n = total_runs as f64;
            (
                passed as f64 / n,
                results.iter().map(|r| r.score).sum::<f64>() / n,
                results.iter().map(|r| r.latency_ms as f64).sum::<f64>() / n,
            )
        };

        Self {
            total_runs,
            passed,
            pass_rate,
            average_score,
            bands,
            average_latency_ms,
            total_cost: results.iter().map(|r| r.cost).sum(),
            total_tokens: results.iter().map(|r| r.tokens as u64).sum(),
            scenario_ids,
            generated_scenarios,
            results,
        }
    }
}
