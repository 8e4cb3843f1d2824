use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairSuggestion {
    pub focus_area: String,
    pub severity: Severity,
    /// Span of the current prompt to replace. Empty for pure additions.
    pub original_text: String,
    pub suggested_text: String,
    pub reasoning: String,
    pub confidence: f64,
    pub impact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub mean_confidence: f64,
}

impl RepairSummary {
    pub fn from_suggestions(suggestions: &[RepairSuggestion]) -> Self {
        let mut by_severity = BTreeMap::new();
        for s in suggestions {
            *by_severity.entry(s.severity).or_insert(0) += 1;
        }
        let mean_confidence = if suggestions.is_empty() {
            0.0
        } else {
            suggestions.iter().map(|s| s.confidence).sum::<f64>() / suggestions.len() as f64
        };
        Self {
            total: suggestions.len(),
            by_severity,
            mean_confidence,
        }
    }
}

/// How accepted suggestions were folded into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMethod {
    /// A rewrite call produced the new prompt.
    Rewrite,
    /// Spans were substituted directly.
    Substitution,
    /// Nothing was applied.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub suggestions: Vec<RepairSuggestion>,
    pub summary: RepairSummary,
    pub accepted: usize,
    pub applied: usize,
    pub method: RepairMethod,
    /// The improved prompt, present only when it differs from the input.
    pub repaired_prompt: Option<String>,
}

impl RepairOutcome {
    /// Suggestions that were produced but not folded into the prompt.
    pub fn outstanding(&self) -> usize {
        self.suggestions.len().saturating_sub(self.applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(severity: Severity, confidence: f64) -> RepairSuggestion {
        RepairSuggestion {
            focus_area: "clarity".to_string(),
            severity,
            original_text: String::new(),
            suggested_text: "x".to_string(),
            reasoning: String::new(),
            confidence,
            impact: String::new(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = RepairSummary::from_suggestions(&[
            suggestion(Severity::High, 0.8),
            suggestion(Severity::High, 0.6),
            suggestion(Severity::Low, 0.4),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_severity[&Severity::High], 2);
        assert_eq!(summary.by_severity[&Severity::Low], 1);
        assert!((summary.mean_confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_outstanding() {
        let outcome = RepairOutcome {
            suggestions: vec![suggestion(Severity::High, 0.9); 6],
            summary: RepairSummary::default(),
            accepted: 6,
            applied: 2,
            method: RepairMethod::Substitution,
            repaired_prompt: None,
        };
        assert_eq!(outcome.outstanding(), 4);
    }
}
