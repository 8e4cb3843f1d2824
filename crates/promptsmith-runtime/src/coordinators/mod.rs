//! Step coordinators.
//!
//! One coordinator per pipeline step. Each turns the current prompt into a
//! typed step payload, calling providers through an
//! [`LlmCaller`](crate::caller::LlmCaller) and answering unusable output with
//! fallback data. Coordinators never touch the run; they hand back a
//! [`StepOutcome`] and the orchestrator folds it in.
//!
//! Units of work inside a step (scenario categories, judge calls, attack
//! probes, focus areas) run through [`run_bounded`]. Usage is summed once,
//! after the join, in unit order.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::caller::CallResult;
use crate::providers::ProviderError;
use crate::resilience::LlmUsage;

mod adapter;
mod evaluation;
mod repair;
mod scenarios;
pub(crate) mod security;

pub use adapter::AdapterCoordinator;
pub use evaluation::EvaluationCoordinator;
pub use repair::RepairCoordinator;
pub use scenarios::ScenarioSynthesis;
pub use security::{ProbeOutcome, SecurityScanCoordinator};

/// Payload of a finished step plus what it cost.
#[derive(Debug, Clone)]
pub struct StepOutcome<T> {
    pub output: T,
    pub usage: LlmUsage,
}

impl<T> StepOutcome<T> {
    pub fn new(output: T, usage: LlmUsage) -> Self {
        Self { output, usage }
    }

    pub fn with_usage(mut self, usage: LlmUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepOutcome<U> {
        StepOutcome {
            output: f(self.output),
            usage: self.usage,
        }
    }
}

/// Step-level failures. Each fails its step; the run carries on.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("all {attempted} calls failed; last error: {last}")]
    AllCallsFailed {
        attempted: usize,
        last: ProviderError,
    },

    #[error("step timed out after {0:?}")]
    Timeout(Duration),
}

/// Run `f` over `items` with at most `limit` in flight. Results come back in
/// input order regardless of completion order.
pub async fn run_bounded<I, T, F, Fut>(items: Vec<I>, limit: usize, f: F) -> Vec<T>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    let mut indexed: Vec<(usize, T)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let unit = f(item);
            async move { (index, unit.await) }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

/// Sum the usage of completed calls.
pub(crate) fn total_usage<'a>(calls: impl IntoIterator<Item = &'a CallResult>) -> LlmUsage {
    let mut usage = LlmUsage::default();
    for call in calls {
        usage.add(&call.usage, &call.model);
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_bounded_keeps_input_order() {
        let delays = vec![30u64, 5, 20, 1, 10];
        let results = run_bounded(delays.clone(), 3, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            ms
        })
        .await;
        assert_eq!(results, delays);
    }

    #[tokio::test]
    async fn test_run_bounded_zero_limit_still_runs() {
        let results = run_bounded(vec![1, 2, 3], 0, |n| async move { n * 2 }).await;
        assert_eq!(results, vec![2, 4, 6]);
    }
}
