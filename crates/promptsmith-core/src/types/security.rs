use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Severity;

/// Attack families a prompt can be probed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackCategory {
    PromptInjection,
    DataExfiltration,
    RoleConfusion,
    Jailbreak,
    SystemPromptLeak,
    PiiLeakage,
}

/// The catalog swept by the pipeline security step. The configured
/// allowlist does not change it; only the standalone scan honors one.
pub const PIPELINE_ATTACKS: [AttackCategory; 4] = [
    AttackCategory::PromptInjection,
    AttackCategory::DataExfiltration,
    AttackCategory::RoleConfusion,
    AttackCategory::Jailbreak,
];

impl AttackCategory {
    pub const ALL: [AttackCategory; 6] = [
        AttackCategory::PromptInjection,
        AttackCategory::DataExfiltration,
        AttackCategory::RoleConfusion,
        AttackCategory::Jailbreak,
        AttackCategory::SystemPromptLeak,
        AttackCategory::PiiLeakage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackCategory::PromptInjection => "prompt_injection",
            AttackCategory::DataExfiltration => "data_exfiltration",
            AttackCategory::RoleConfusion => "role_confusion",
            AttackCategory::Jailbreak => "jailbreak",
            AttackCategory::SystemPromptLeak => "system_prompt_leak",
            AttackCategory::PiiLeakage => "pii_leakage",
        }
    }

    /// Human-readable label used in probe prompts and titles.
    pub fn label(&self) -> &'static str {
        match self {
            AttackCategory::PromptInjection => "Prompt injection",
            AttackCategory::DataExfiltration => "Data exfiltration",
            AttackCategory::RoleConfusion => "Role confusion",
            AttackCategory::Jailbreak => "Jailbreak",
            AttackCategory::SystemPromptLeak => "System prompt leak",
            AttackCategory::PiiLeakage => "PII leakage",
        }
    }
}

impl fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        AttackCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown attack category '{}'", s.trim()))
    }
}

/// How a vulnerability was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Reported by an external probe call.
    Probe,
    /// Derived from the deterministic rule set after the probe was unusable.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub category: AttackCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub example: String,
    pub impact: String,
    pub mitigation: String,
    /// Likelihood (0-1) that the attack bypasses the prompt's defenses.
    pub bypass_confidence: f64,
    pub detection: DetectionMethod,
}

/// Output of a security sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Categories that were actually assessed, in sweep order.
    pub assessed: Vec<AttackCategory>,
    /// Categories assessed by the heuristic because the probe was unusable.
    pub heuristic: Vec<AttackCategory>,
    /// Categories never assessed (standalone scan hit its cost ceiling).
    pub unscanned: Vec<AttackCategory>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub security_score: u32,
    pub total_cost: f64,
}

impl SecurityReport {
    pub fn new(
        assessed: Vec<AttackCategory>,
        heuristic: Vec<AttackCategory>,
        unscanned: Vec<AttackCategory>,
        vulnerabilities: Vec<Vulnerability>,
        total_cost: f64,
    ) -> Self {
        let security_score = security_score(vulnerabilities.len());
        Self {
            assessed,
            heuristic,
            unscanned,
            vulnerabilities,
            security_score,
            total_cost,
        }
    }

    pub fn critical_count(&self) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count()
    }
}

/// 95 with no findings, minus 10 per finding, floored at 60.
pub fn security_score(vulnerability_count: usize) -> u32 {
    if vulnerability_count == 0 {
        return 95;
    }
    let penalty = 10u32.saturating_mul(vulnerability_count.min(u32::MAX as usize) as u32);
    95u32.saturating_sub(penalty).max(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_score_formula() {
        assert_eq!(security_score(0), 95);
        assert_eq!(security_score(1), 85);
        assert_eq!(security_score(3), 65);
        assert_eq!(security_score(4), 60);
        assert_eq!(security_score(1000), 60);
    }

    #[test]
    fn test_attack_parsing() {
        assert_eq!(
            "prompt-injection".parse::<AttackCategory>(),
            Ok(AttackCategory::PromptInjection)
        );
        assert_eq!(
            "PII leakage".parse::<AttackCategory>(),
            Ok(AttackCategory::PiiLeakage)
        );
        assert!("sql injection".parse::<AttackCategory>().is_err());
    }

    #[test]
    fn test_pipeline_catalog_is_four() {
        assert_eq!(PIPELINE_ATTACKS.len(), 4);
        assert!(!PIPELINE_ATTACKS.contains(&AttackCategory::PiiLeakage));
    }
}
