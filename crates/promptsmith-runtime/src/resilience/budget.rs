//! Token budgets and cost accounting.
//!
//! A [`BudgetTracker`] lives for one run and caps tokens per step and for
//! the whole run. [`LlmUsage`] is the cost ledger the coordinators hand back
//! to the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use promptsmith_core::StepKind;

use crate::providers::TokenUsage;

/// Token budget for one scope.
pub struct TokenBudget {
    pub max_tokens: u32,
    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    /// Claim `tokens` if they fit. Check and claim are one atomic step.
    pub fn try_reserve(&self, tokens: u32) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(tokens).filter(|next| *next <= self.max_tokens)
            })
            .is_ok()
    }

    /// Replace a claim of `reserved` tokens with the `actual` count.
    pub fn settle(&self, reserved: u32, actual: u32) {
        if actual >= reserved {
            self.used.fetch_add(actual - reserved, Ordering::SeqCst);
        } else {
            self.used.fetch_sub(reserved - actual, Ordering::SeqCst);
        }
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Accumulated usage and estimated cost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub llm_calls: u32,
    /// Estimated cost in USD
    pub estimated_cost: f64,
    pub cache_hits: u32,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl LlmUsage {
    /// Add one provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens as u64;
        self.completion_tokens += usage.completion_tokens as u64;
        self.total_tokens += usage.total() as u64;
        self.llm_calls += 1;
        self.cache_creation_tokens += usage.cache_creation_tokens as u64;
        self.cache_read_tokens += usage.cache_read_tokens as u64;

        if usage.cache_read_tokens > 0 {
            self.cache_hits += 1;
        }

        self.estimated_cost += cost_of(usage, model);
    }

    /// Fold another ledger into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.llm_calls += other.llm_calls;
        self.estimated_cost += other.estimated_cost;
        self.cache_hits += other.cache_hits;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }

    /// Usage added since `earlier`, a previous snapshot of this ledger.
    pub fn since(&self, earlier: &LlmUsage) -> LlmUsage {
        LlmUsage {
            total_tokens: self.total_tokens.saturating_sub(earlier.total_tokens),
            prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            completion_tokens: self
                .completion_tokens
                .saturating_sub(earlier.completion_tokens),
            llm_calls: self.llm_calls.saturating_sub(earlier.llm_calls),
            estimated_cost: (self.estimated_cost - earlier.estimated_cost).max(0.0),
            cache_hits: self.cache_hits.saturating_sub(earlier.cache_hits),
            cache_creation_tokens: self
                .cache_creation_tokens
                .saturating_sub(earlier.cache_creation_tokens),
            cache_read_tokens: self
                .cache_read_tokens
                .saturating_sub(earlier.cache_read_tokens),
        }
    }
}

/// Estimated USD cost of one response.
pub fn cost_of(usage: &TokenUsage, model: &str) -> f64 {
    // Per million tokens: input, output, cache write, cache read
    let (input_rate, output_rate, cache_write_rate, cache_read_rate) = match model {
        m if m == crate::providers::OFFLINE_MODEL => (0.0, 0.0, 0.0, 0.0),
        m if m.contains("sonnet-4-5") => (3.0, 15.0, 3.75, 0.3),
        m if m.contains("opus-4-5") => (5.0, 25.0, 6.25, 0.5),
        m if m.contains("haiku-4-5") => (1.0, 5.0, 1.25, 0.1),
        m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.0, 0.0),
        m if m.contains("gpt-4o") => (2.5, 10.0, 0.0, 0.0),
        _ => (3.0, 15.0, 3.75, 0.3),
    };

    let per_million = |tokens: u32, rate: f64| tokens as f64 / 1_000_000.0 * rate;
    per_million(usage.prompt_tokens, input_rate)
        + per_million(usage.completion_tokens, output_rate)
        + per_million(usage.cache_creation_tokens, cache_write_rate)
        + per_million(usage.cache_read_tokens, cache_read_rate)
}

/// Per-run token ceilings, one per step plus a global one.
pub struct BudgetTracker {
    step_budgets: HashMap<StepKind, TokenBudget>,
    global_budget: TokenBudget,
}

impl BudgetTracker {
    pub fn new(global_max: u32, per_step_max: u32) -> Self {
        let step_budgets = StepKind::ORDERED
            .iter()
            .map(|kind| (*kind, TokenBudget::new(per_step_max)))
            .collect();

        Self {
            step_budgets,
            global_budget: TokenBudget::new(global_max),
        }
    }

    /// Claim `estimated_tokens` from both the step and the global ceiling.
    /// `None` when either cannot cover it; nothing stays claimed then.
    pub fn reserve(&self, step: StepKind, estimated_tokens: u32) -> Option<Reservation<'_>> {
        let step_budget = self.step_budgets.get(&step);
        if let Some(budget) = step_budget {
            if !budget.try_reserve(estimated_tokens) {
                return None;
            }
        }
        if !self.global_budget.try_reserve(estimated_tokens) {
            if let Some(budget) = step_budget {
                budget.settle(estimated_tokens, 0);
            }
            return None;
        }

        Some(Reservation {
            tracker: self,
            step,
            tokens: estimated_tokens,
            settled: false,
        })
    }

    /// Tokens still available to `step`: the tighter of its own and the
    /// global ceiling.
    pub fn remaining(&self, step: StepKind) -> u32 {
        let step_remaining = self
            .step_budgets
            .get(&step)
            .map(|b| b.remaining())
            .unwrap_or(u32::MAX);
        step_remaining.min(self.global_budget.remaining())
    }

    pub fn global_used(&self) -> u32 {
        self.global_budget.used()
    }

    fn settle(&self, step: StepKind, reserved: u32, actual: u32) {
        if let Some(budget) = self.step_budgets.get(&step) {
            budget.settle(reserved, actual);
        }
        self.global_budget.settle(reserved, actual);
    }
}

/// Tokens claimed for one call in flight.
///
/// Settle it with the tokens the call actually used. Dropped unsettled
/// (failed or cancelled call), the claim is released.
pub struct Reservation<'a> {
    tracker: &'a BudgetTracker,
    step: StepKind,
    tokens: u32,
    settled: bool,
}

impl Reservation<'_> {
    pub fn settle(mut self, actual: u32) {
        self.tracker.settle(self.step, self.tokens, actual);
        self.settled = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.settle(self.step, self.tokens, 0);
        }
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new(200_000, 60_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_budget() {
        let budget = TokenBudget::new(1000);
        assert!(budget.try_reserve(600));
        assert_eq!(budget.remaining(), 400);
        assert!(!budget.try_reserve(500));
        assert_eq!(budget.used(), 600);

        budget.settle(600, 250);
        assert_eq!(budget.remaining(), 750);
        budget.settle(0, 100);
        assert_eq!(budget.used(), 350);
    }

    #[test]
    fn test_step_and_global_ceilings() {
        let tracker = BudgetTracker::new(1000, 600);

        tracker.reserve(StepKind::Evaluation, 500).unwrap().settle(500);
        assert!(tracker.reserve(StepKind::Evaluation, 200).is_none());
        assert_eq!(tracker.remaining(StepKind::Repair), 500);

        tracker.reserve(StepKind::Repair, 450).unwrap().settle(450);
        assert!(tracker.reserve(StepKind::SecurityScan, 100).is_none());
        assert_eq!(tracker.global_used(), 950);
    }

    #[test]
    fn test_refused_global_claim_releases_step_claim() {
        let tracker = BudgetTracker::new(300, 600);
        tracker.reserve(StepKind::Repair, 250).unwrap().settle(250);

        assert!(tracker.reserve(StepKind::Evaluation, 100).is_none());
        assert_eq!(tracker.remaining(StepKind::Evaluation), 50);
        assert!(tracker.reserve(StepKind::Evaluation, 50).is_some());
    }

    #[test]
    fn test_unsettled_reservation_is_released() {
        let tracker = BudgetTracker::new(1000, 1000);
        {
            let _held = tracker.reserve(StepKind::SecurityScan, 800).unwrap();
            assert_eq!(tracker.remaining(StepKind::SecurityScan), 200);
        }
        assert_eq!(tracker.global_used(), 0);
    }

    #[test]
    fn test_concurrent_claims_never_exceed_ceiling() {
        let tracker = std::sync::Arc::new(BudgetTracker::new(10_000, 1000));
        let granted: u32 = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| match tracker.reserve(StepKind::Evaluation, 30) {
                            Some(claim) => {
                                claim.settle(30);
                                true
                            }
                            None => false,
                        })
                        .count() as u32
                })
            })
            .map(|handle| handle.join().unwrap())
            .sum();

        assert_eq!(granted, 33);
        assert_eq!(tracker.global_used(), 990);
    }

    #[test]
    fn test_usage_and_merge() {
        let usage = TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 500,
            ..TokenUsage::default()
        };
        let mut a = LlmUsage::default();
        a.add(&usage, "claude-sonnet-4-5-20250514");
        assert_eq!(a.total_tokens, 1500);
        assert!((a.estimated_cost - 0.0105).abs() < 1e-9);

        let mut b = LlmUsage::default();
        b.add(&usage, crate::providers::OFFLINE_MODEL);
        assert_eq!(b.estimated_cost, 0.0);

        let before = a.clone();
        a.merge(&b);
        assert_eq!(a.llm_calls, 2);
        assert_eq!(a.total_tokens, 3000);

        let added = a.since(&before);
        assert_eq!(added.llm_calls, 1);
        assert_eq!(added.total_tokens, 1500);
        assert_eq!(added.estimated_cost, 0.0);
    }
}
