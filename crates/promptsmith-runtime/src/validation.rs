//! Anchoring of repair suggestions to the prompt they edit.
//!
//! Generated suggestions quote the span they want replaced, but the quote
//! often differs from the prompt in whitespace (line breaks folded, double
//! spaces collapsed). A suggestion is eligible for substitution only if its
//! quote can be located; when it is, `original_text` is rewritten to the
//! exact slice of the prompt so substitution replaces what is really there.

use regex::Regex;
use thiserror::Error;

use promptsmith_core::RepairSuggestion;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpanError {
    #[error("suggestion quotes no span")]
    EmptySpan,

    #[error("span not found in prompt: '{0}'")]
    NotFound(String),

    #[error("span pattern failed to compile: {0}")]
    Pattern(String),
}

/// Locates suggestion spans in one prompt.
pub struct SuggestionValidator<'a> {
    prompt: &'a str,
}

impl<'a> SuggestionValidator<'a> {
    pub fn new(prompt: &'a str) -> Self {
        Self { prompt }
    }

    /// Byte range of `quote` in the prompt, matching runs of whitespace
    /// loosely.
    pub fn locate(&self, quote: &str) -> Result<std::ops::Range<usize>, SpanError> {
        let words: Vec<&str> = quote.split_whitespace().collect();
        if words.is_empty() {
            return Err(SpanError::EmptySpan);
        }

        if let Some(start) = self.prompt.find(quote) {
            return Ok(start..start + quote.len());
        }

        let pattern = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join(r"\s+");
        let re = Regex::new(&pattern).map_err(|e| SpanError::Pattern(e.to_string()))?;
        re.find(self.prompt)
            .map(|m| m.range())
            .ok_or_else(|| SpanError::NotFound(truncate(quote, 60)))
    }

    /// Anchor a suggestion, returning it with `original_text` set to the
    /// exact prompt slice.
    pub fn anchor(&self, suggestion: &RepairSuggestion) -> Result<RepairSuggestion, SpanError> {
        let range = self.locate(&suggestion.original_text)?;
        Ok(RepairSuggestion {
            original_text: self.prompt[range].to_string(),
            ..suggestion.clone()
        })
    }

    /// Anchored copies of every suggestion that can be located. Pure
    /// additions and unlocatable spans are dropped.
    pub fn anchor_all(&self, suggestions: &[&RepairSuggestion]) -> Vec<RepairSuggestion> {
        suggestions
            .iter()
            .filter_map(|s| match self.anchor(s) {
                Ok(anchored) => Some(anchored),
                Err(e) => {
                    tracing::debug!(focus_area = %s.focus_area, error = %e, "suggestion not anchored");
                    None
                }
            })
            .collect()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
