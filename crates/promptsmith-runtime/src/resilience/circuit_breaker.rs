//! Circuit breaker to stop calling a provider that keeps failing.
//!
//! An open circuit means "no provider available": the step takes its
//! fallback path instead of waiting on calls that will fail. Circuits belong
//! to the orchestrator and persist across its runs.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open circuit waits before letting a test call through
    #[serde(default = "default_recovery_timeout", with = "crate::config::duration")]
    pub recovery_timeout: Duration,

    /// Successes in half-open state needed to close
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_success_threshold() -> u32 {
    2
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

/// One independent circuit per key.
pub struct CircuitBreaker<K> {
    states: RwLock<HashMap<K, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl<K> CircuitBreaker<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True while calls for `key` should be skipped. An open circuit whose
    /// recovery timeout has passed moves to half-open and lets calls through.
    pub fn is_open(&self, key: K) -> bool {
        let states = self.states.read();
        match states.get(&key) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(key);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, key: K) {
        let mut states = self.states.write();
        match states.get(&key).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(key, CircuitState::Closed { failures: 0 });
                    tracing::info!(key = ?key, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        key,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(key, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, key: K) {
        let mut states = self.states.write();
        let failures = match states.get(&key).cloned() {
            None => 1,
            Some(CircuitState::Closed { failures }) => failures + 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    key,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(key = ?key, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                key,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(key = ?key, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(key, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, key: K) {
        let mut states = self.states.write();
        if matches!(states.get(&key), Some(CircuitState::Open { .. })) {
            states.insert(key, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(key = ?key, "Circuit half-open for recovery test");
        }
    }

    pub fn state(&self, key: K) -> CircuitState {
        self.states
            .read()
            .get(&key)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }
}

impl<K> Default for CircuitBreaker<K>
where
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsmith_core::StepKind;

    fn breaker(recovery: Duration) -> CircuitBreaker<StepKind> {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: recovery,
            success_threshold: 2,
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(Duration::from_secs(60));
        let step = StepKind::Evaluation;

        cb.record_failure(step);
        cb.record_failure(step);
        assert!(!cb.is_open(step));

        cb.record_failure(step);
        assert!(cb.is_open(step));
        assert!(!cb.is_open(StepKind::Repair));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(Duration::from_secs(60));
        let step = StepKind::SecurityScan;

        cb.record_failure(step);
        cb.record_failure(step);
        cb.record_success(step);
        cb.record_failure(step);
        assert_eq!(cb.state(step), CircuitState::Closed { failures: 1 });
    }

    #[test]
    fn test_recovery_through_half_open() {
        let cb = breaker(Duration::ZERO);
        let step = StepKind::Repair;

        for _ in 0..3 {
            cb.record_failure(step);
        }
        assert!(!cb.is_open(step));
        assert_eq!(cb.state(step), CircuitState::HalfOpen { successes: 0 });

        cb.record_success(step);
        assert_eq!(cb.state(step), CircuitState::HalfOpen { successes: 1 });
        cb.record_success(step);
        assert_eq!(cb.state(step), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(Duration::ZERO);
        let step = StepKind::AdapterCreation;

        for _ in 0..3 {
            cb.record_failure(step);
        }
        cb.is_open(step);
        cb.record_failure(step);
        assert!(matches!(cb.state(step), CircuitState::Open { .. }));
    }
}
