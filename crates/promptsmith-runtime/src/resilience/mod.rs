//! Resilience around provider calls.
//!
//! - Circuit breaker per step, shared across runs
//! - Token budgets per run
//! - Retry with backoff for transient errors

mod budget;
mod circuit_breaker;
mod retry;

pub use budget::{cost_of, BudgetTracker, LlmUsage, Reservation, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
