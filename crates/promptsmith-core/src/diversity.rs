//! Greedy diversity ordering for scenario sets.

use std::collections::HashSet;

use crate::types::Scenario;

/// Words of the first user turn used as the intent key.
const INTENT_WORDS: usize = 4;

fn features(scenario: &Scenario) -> Vec<String> {
    let mut out = vec![format!("category:{}", scenario.category)];
    out.extend(
        scenario
            .tags
            .iter()
            .map(|t| format!("tag:{}", t.trim().to_lowercase())),
    );
    if let Some(turn) = scenario.first_user_turn() {
        let key: Vec<String> = turn
            .split_whitespace()
            .take(INTENT_WORDS)
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric())
                    .collect::<String>()
                    .to_lowercase()
            })
            .collect();
        out.push(format!("intent:{}", key.join(" ")));
    }
    out
}

/// Reorder so scenarios that add unseen categories, tags or intents come
/// first, then keep the first `limit`. Ties keep input order.
pub fn diversify(scenarios: Vec<Scenario>, limit: usize) -> Vec<Scenario> {
    let mut remaining: Vec<(Scenario, Vec<String>)> = scenarios
        .into_iter()
        .map(|s| {
            let f = features(&s);
            (s, f)
        })
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut picked = Vec::with_capacity(limit.min(remaining.len()));

    while picked.len() < limit && !remaining.is_empty() {
        let mut best = 0;
        let mut best_novelty = 0;
        for (i, (_, f)) in remaining.iter().enumerate() {
            let novelty = f.iter().filter(|x| !seen.contains(*x)).count();
            if novelty > best_novelty {
                best = i;
                best_novelty = novelty;
            }
        }
        let (scenario, f) = remaining.remove(best);
        seen.extend(f);
        picked.push(scenario);
    }

    picked
}
