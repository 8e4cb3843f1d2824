use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of behavior a scenario probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCategory {
    UserIntent,
    Constraint,
    Adversarial,
    EdgeCase,
}

impl ScenarioCategory {
    pub const ALL: [ScenarioCategory; 4] = [
        ScenarioCategory::UserIntent,
        ScenarioCategory::Constraint,
        ScenarioCategory::Adversarial,
        ScenarioCategory::EdgeCase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioCategory::UserIntent => "user_intent",
            ScenarioCategory::Constraint => "constraint",
            ScenarioCategory::Adversarial => "adversarial",
            ScenarioCategory::EdgeCase => "edge_case",
        }
    }
}

impl fmt::Display for ScenarioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "user_intent" | "intent" => Ok(ScenarioCategory::UserIntent),
            "constraint" | "constraints" => Ok(ScenarioCategory::Constraint),
            "adversarial" => Ok(ScenarioCategory::Adversarial),
            "edge_case" | "edge" => Ok(ScenarioCategory::EdgeCase),
            other => Err(format!("unknown scenario category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One conversational input turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }
}

/// What a validator asserts about a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Contains,
    NotContains,
    Refusal,
    Tone,
    Format,
    #[serde(other)]
    Custom,
}

impl ValidatorKind {
    /// Maps free-form generator labels onto a known kind.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "contains" | "must_contain" | "includes" => ValidatorKind::Contains,
            "not_contains" | "must_not_contain" | "excludes" => ValidatorKind::NotContains,
            "refusal" | "refuses" | "must_refuse" => ValidatorKind::Refusal,
            "tone" | "sentiment" => ValidatorKind::Tone,
            "format" | "structure" | "schema" => ValidatorKind::Format,
            _ => ValidatorKind::Custom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioValidator {
    pub kind: ValidatorKind,
    pub expected: String,
    pub description: String,
}

/// Where a scenario came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioOrigin {
    Generated,
    Fallback,
}

/// A synthetic test case. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub category: ScenarioCategory,
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub validators: Vec<ScenarioValidator>,
    pub adversarial: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub origin: ScenarioOrigin,
}

impl Scenario {
    /// The text sent to the judge: the first user turn.
    pub fn first_user_turn(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
            .filter(|c| !c.trim().is_empty())
    }

    /// A scenario without a non-empty user turn cannot be evaluated.
    pub fn is_usable(&self) -> bool {
        self.first_user_turn().is_some()
    }
}

/// Output of the scenario synthesis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub scenarios: Vec<Scenario>,
    pub requested: usize,
    /// True when any scenario came from the fallback synthesizer.
    pub fallback_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(turns: Vec<Turn>) -> Scenario {
        Scenario {
            id: "s1".to_string(),
            category: ScenarioCategory::UserIntent,
            turns,
            validators: vec![],
            adversarial: false,
            tags: vec![],
            origin: ScenarioOrigin::Generated,
        }
    }

    #[test]
    fn test_first_user_turn_skips_assistant() {
        let s = scenario(vec![
            Turn {
                role: TurnRole::Assistant,
                content: "Hi, how can I help?".to_string(),
            },
            Turn::user("Where is my order?"),
        ]);
        assert_eq!(s.first_user_turn(), Some("Where is my order?"));
    }

    #[test]
    fn test_blank_turn_is_unusable() {
        let s = scenario(vec![Turn::user("   ")]);
        assert!(!s.is_usable());
    }

    #[test]
    fn test_category_parsing_is_lenient() {
        assert_eq!(
            "edge-case".parse::<ScenarioCategory>(),
            Ok(ScenarioCategory::EdgeCase)
        );
        assert_eq!(
            "User Intent".parse::<ScenarioCategory>(),
            Ok(ScenarioCategory::UserIntent)
        );
    }

    #[test]
    fn test_validator_labels() {
        assert_eq!(ValidatorKind::from_label("must-refuse"), ValidatorKind::Refusal);
        assert_eq!(ValidatorKind::from_label("whatever"), ValidatorKind::Custom);
    }
}
