//! Suggestion filtering and direct substitution.

use serde::{Deserialize, Serialize};

use crate::types::{RepairSuggestion, Severity};

/// Acceptance bar for folding a suggestion into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepairThresholds {
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_min_severity() -> Severity {
    Severity::Medium
}

fn default_min_confidence() -> f64 {
    0.6
}

impl Default for RepairThresholds {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl RepairThresholds {
    pub fn accepts(&self, suggestion: &RepairSuggestion) -> bool {
        suggestion.severity >= self.min_severity && suggestion.confidence >= self.min_confidence
    }
}

/// Most severe first, then most confident, then capped at `max`.
pub fn rank(mut suggestions: Vec<RepairSuggestion>, max: usize) -> Vec<RepairSuggestion> {
    suggestions.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
    suggestions.truncate(max);
    suggestions
}

/// Replace each suggestion's original span with its suggested span, most
/// severe first, first occurrence only. Suggestions with an empty or absent
/// original span are skipped. Returns the new prompt and how many applied.
pub fn apply_substitutions(prompt: &str, suggestions: &[&RepairSuggestion]) -> (String, usize) {
    let mut ordered: Vec<&RepairSuggestion> = suggestions.to_vec();
    ordered.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut current = prompt.to_string();
    let mut applied = 0;
    for suggestion in ordered {
        let original = suggestion.original_text.as_str();
        if original.trim().is_empty() || original == suggestion.suggested_text {
            continue;
        }
        if let Some(pos) = current.find(original) {
            current.replace_range(pos..pos + original.len(), &suggestion.suggested_text);
            applied += 1;
        } else {
            tracing::debug!(focus_area = %suggestion.focus_area, "original span not found; skipped");
        }
    }
    (current, applied)
}
