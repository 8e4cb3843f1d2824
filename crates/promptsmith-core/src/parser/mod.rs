//! Structured-output parsing.
//!
//! Turns free-form generated text into typed records. Each [`ParseStrategy`]
//! is tried in order; the first that yields JSON wins. A [`ParseError`] is a
//! recoverable condition: callers answer it with fallback data and never
//! surface it as a step failure.

pub mod lenient;
mod strategies;

pub use strategies::{balanced_spans, fenced_blocks, repair_json, FencedBlock, ParseStrategy};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("output is empty")]
    Empty,

    #[error("no JSON found ({0})")]
    NoJson(&'static str),

    #[error("invalid JSON ({strategy}): {message}")]
    InvalidJson {
        strategy: &'static str,
        message: String,
    },

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("JSON does not match the expected shape: {0}")]
    Shape(String),

    #[error("no strategy recovered JSON; last error: {0}")]
    Exhausted(Box<ParseError>),
}

/// Parser over an ordered strategy list.
#[derive(Debug, Clone)]
pub struct StructuredOutputParser {
    strategies: Vec<ParseStrategy>,
}

impl Default for StructuredOutputParser {
    fn default() -> Self {
        Self {
            strategies: ParseStrategy::ORDERED.to_vec(),
        }
    }
}

impl StructuredOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser restricted to the given strategies, in the given order.
    pub fn with_strategies(strategies: Vec<ParseStrategy>) -> Self {
        Self { strategies }
    }

    /// Extract the first JSON value any strategy can recover.
    pub fn parse_value(&self, text: &str) -> Result<Value, ParseError> {
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut last = ParseError::NoJson("no strategies");
        for strategy in &self.strategies {
            match strategy.apply(text) {
                Ok(value) => {
                    tracing::trace!(strategy = strategy.name(), "structured output recovered");
                    return Ok(value);
                }
                Err(e) => last = e,
            }
        }
        Err(ParseError::Exhausted(Box::new(last)))
    }

    /// Parse into a typed record.
    pub fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, ParseError> {
        let value = self.parse_value(text)?;
        serde_json::from_value(value).map_err(|e| ParseError::Shape(e.to_string()))
    }

    /// Parse a list of records: either a top-level array or the array under
    /// `field`. Elements that do not fit `T` are dropped, so the result may
    /// be shorter than the array and callers must handle an empty list.
    pub fn parse_array<T: DeserializeOwned>(
        &self,
        text: &str,
        field: &str,
    ) -> Result<Vec<T>, ParseError> {
        let items = match self.parse_value(text)? {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove(field) {
                Some(Value::Array(items)) => items,
                Some(_) => return Err(ParseError::Shape(format!("'{}' is not an array", field))),
                None => return Err(ParseError::MissingField(field.to_string())),
            },
            _ => return Err(ParseError::Shape("expected an array or object".to_string())),
        };

        let total = items.len();
        let parsed: Vec<T> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if parsed.len() < total {
            tracing::debug!(
                field,
                dropped = total - parsed.len(),
                "dropped array elements that did not decode"
            );
        }
        Ok(parsed)
    }

    /// Plain text payload: the first fenced block if there is one, else the
    /// trimmed text. Used where the output is a prompt, not a record.
    pub fn extract_text(&self, text: &str) -> Option<String> {
        let body = fenced_blocks(text, true)
            .into_iter()
            .next()
            .map(|b| b.code)
            .unwrap_or_else(|| text.to_string());
        let body = body.trim();
        (!body.is_empty()).then(|| body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Suggestion {
        area: String,
        confidence: f64,
    }

    #[test]
    fn test_recovers_fenced_suggestions_with_trailing_comma() {
        let text = "Here are my suggestions:\n```json\n{\n  \"suggestions\": [\n    {\"area\": \"clarity\", \"confidence\": 0.8},\n    {\"area\": \"safety\", \"confidence\": 0.7},\n  ]\n}\n```\nLet me know!";
        let parsed: Vec<Suggestion> = StructuredOutputParser::new()
            .parse_array(text, "suggestions")
            .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].area, "safety");
    }

    #[test]
    fn test_top_level_array_accepted() {
        let parsed: Vec<Suggestion> = StructuredOutputParser::new()
            .parse_array(r#"[{"area": "tone", "confidence": 0.9}]"#, "suggestions")
            .unwrap();
        assert_eq!(parsed[0].area, "tone");
    }

    #[test]
    fn test_nested_arrays_are_not_scanned() {
        let text = r#"{"result": {"suggestions": []}}"#;
        let err = StructuredOutputParser::new()
            .parse_array::<Suggestion>(text, "suggestions")
            .unwrap_err();
        assert_eq!(err, ParseError::MissingField("suggestions".to_string()));
    }

    #[test]
    fn test_bad_elements_dropped() {
        let text = r#"{"suggestions": [{"area": "x", "confidence": 0.5}, {"area": 3}]}"#;
        let parsed: Vec<Suggestion> = StructuredOutputParser::new()
            .parse_array(text, "suggestions")
            .unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_empty_and_prose_fail() {
        let parser = StructuredOutputParser::new();
        assert_eq!(parser.parse_value("  \n"), Err(ParseError::Empty));
        assert!(matches!(
            parser.parse_value("I'd rather not."),
            Err(ParseError::Exhausted(_))
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = StructuredOutputParser::new()
            .parse::<Suggestion>(r#"{"area": "x"}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::Shape(_)));
    }

    #[test]
    fn test_restricted_strategies() {
        let parser = StructuredOutputParser::with_strategies(vec![ParseStrategy::Direct]);
        assert!(parser.parse_value("```json\n{}\n```").is_err());
    }

    #[test]
    fn test_extract_text_prefers_fence() {
        let parser = StructuredOutputParser::new();
        assert_eq!(
            parser.extract_text("Revised prompt:\n```\nYou are concise.\n```").as_deref(),
            Some("You are concise.")
        );
        assert_eq!(parser.extract_text("  plain  ").as_deref(), Some("plain"));
        assert_eq!(parser.extract_text("   "), None);
    }

    proptest! {
        #[test]
        fn prop_well_formed_json_round_trips(
            area in "[a-z ]{0,20}",
            confidence in 0u32..100,
            prose in "[A-Za-z ,.]{0,40}",
        ) {
            let value = json!({"area": area, "percent": confidence});
            let text = format!("{}\n{}", prose, value);
            let parsed = StructuredOutputParser::new().parse_value(&text).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
