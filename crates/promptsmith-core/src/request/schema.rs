//! JSON Schema validation for run requests.
//!
//! Requests are checked structurally against `schema/run_request.schema.json`
//! before they are deserialized, so a typo in a field name is reported instead
//! of silently falling back to a default.

use std::sync::OnceLock;
use thiserror::Error;

const RUN_REQUEST_SCHEMA_JSON: &str = include_str!("../../schema/run_request.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(RUN_REQUEST_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a request value. Returns every violation, with its location.
pub fn validate_request_schema(request: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(request)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_request_passes() {
        assert!(validate_request_schema(&json!({ "originalPrompt": "Be helpful." })).is_ok());
    }

    #[test]
    fn test_missing_prompt_fails() {
        let errors = validate_request_schema(&json!({ "scenarioCount": 5 })).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_unknown_field_fails() {
        let value = json!({ "originalPrompt": "x", "scenarioCont": 5 });
        assert!(validate_request_schema(&value).is_err());
    }

    #[test]
    fn test_unknown_category_fails() {
        let value = json!({ "originalPrompt": "x", "scenarioCategories": ["happy_path"] });
        assert!(validate_request_schema(&value).is_err());
    }

    #[test]
    fn test_full_request_passes() {
        let value = json!({
            "originalPrompt": "You are a billing assistant.",
            "targetProvider": "anthropic",
            "targetModel": "claude-sonnet-4-20250514",
            "perStepEnableFlags": {
                "scenarios": true,
                "evaluation": true,
                "securityScan": false,
                "repair": true,
                "adapter": true
            },
            "scenarioCount": 8,
            "scenarioCategories": ["user_intent", "adversarial"],
            "evaluationProviders": ["offline"],
            "repairFocusAreas": ["clarity"],
            "securityAttackCategories": ["jailbreak"],
            "maxSuggestions": 5
        });
        assert!(validate_request_schema(&value).is_ok());
    }
}
