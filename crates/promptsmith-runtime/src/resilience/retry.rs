//! Retry with exponential backoff for transient provider errors.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::providers::ProviderError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_min_delay", with = "crate::config::duration")]
    pub min_delay: Duration,

    #[serde(default = "default_max_delay", with = "crate::config::duration")]
    pub max_delay: Duration,
}

fn default_max_retries() -> usize {
    2
}

fn default_min_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// No retries; every error surfaces on the first attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retries run out.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        op.retry(self.backoff())
            .sleep(tokio::time::sleep)
            .when(|e: &ProviderError| e.is_retryable())
            .notify(|e: &ProviderError, delay: Duration| {
                tracing::debug!(error = %e, delay = ?delay, "retrying provider call");
            })
            .await
    }
}
