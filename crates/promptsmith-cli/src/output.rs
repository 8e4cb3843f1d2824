//! Output formatting

use serde::Serialize;

use promptsmith_core::{RunResponse, SecurityReport, StepStatus};

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Summary,
    Json,
    Yaml,
}

/// Serialize `data` in a machine format. `None` for the summary format.
pub fn render<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<Option<String>> {
    Ok(match format {
        OutputFormat::Summary => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(data)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(data)?),
    })
}

pub fn run_summary(response: &RunResponse) -> String {
    let run = &response.run;
    let mut out = format!(
        "Run {} {:?}\nQuality {:.1}/10 ({:?} confidence), cost ${:.4}, {} tokens\n\nSteps:\n",
        run.id,
        run.status,
        response.quality_score,
        response.confidence_level,
        run.total_cost,
        run.total_tokens
    );
    for step in &run.steps {
        let marker = match step.status {
            StepStatus::Completed => "ok",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "skipped",
            StepStatus::Pending | StepStatus::Running => "?",
        };
        out.push_str(&format!("  {:<14} {}\n", step.name, marker));
    }

    out.push_str("\nRecommendations:\n");
    for line in &response.recommendations {
        out.push_str(&format!("  - {}\n", line));
    }
    if !response.next_steps.is_empty() {
        out.push_str("\nNext steps:\n");
        for line in &response.next_steps {
            out.push_str(&format!("  - {}\n", line));
        }
    }
    out.push_str("\nFinal prompt:\n");
    out.push_str(&response.final_prompt);
    out.push('\n');
    out
}

pub fn scan_summary(report: &SecurityReport) -> String {
    let mut out = format!(
        "Security score {}/100, {} finding(s), cost ${:.4}\n",
        report.security_score,
        report.vulnerabilities.len(),
        report.total_cost
    );
    for v in &report.vulnerabilities {
        out.push_str(&format!(
            "  [{:?}] {} ({}): {}\n",
            v.severity,
            v.title,
            v.category.as_str(),
            v.mitigation
        ));
    }
    if !report.heuristic.is_empty() {
        let names: Vec<&str> = report.heuristic.iter().map(|c| c.as_str()).collect();
        out.push_str(&format!("Assessed by rule set: {}\n", names.join(", ")));
    }
    if !report.unscanned.is_empty() {
        let names: Vec<&str> = report.unscanned.iter().map(|c| c.as_str()).collect();
        out.push_str(&format!("Not scanned (cost ceiling): {}\n", names.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptsmith_core::{AttackCategory, PipelineConfig, PipelineRun};

    #[test]
    fn test_summary_lists_every_step() {
        let mut run = PipelineRun::new("You are a bot.", PipelineConfig::default());
        run.finalize();
        let response = RunResponse {
            final_prompt: run.current_prompt.clone(),
            run,
            recommendations: vec!["scenarios: skipped".to_string()],
            next_steps: vec![],
            quality_score: 0.0,
            confidence_level: promptsmith_core::ConfidenceLevel::Low,
        };

        let text = run_summary(&response);
        for name in ["scenarios", "evaluation", "security_scan", "repair", "adapter"] {
            assert!(text.contains(name));
        }
        assert!(!text.contains("Next steps"));
        assert!(text.ends_with("You are a bot.\n"));
    }

    #[test]
    fn test_scan_summary_reports_unscanned() {
        let report = SecurityReport::new(
            vec![AttackCategory::Jailbreak],
            vec![],
            vec![AttackCategory::PiiLeakage],
            vec![],
            0.02,
        );
        let text = scan_summary(&report);
        assert!(text.starts_with("Security score 95/100"));
        assert!(text.contains("Not scanned (cost ceiling): pii_leakage"));
    }

    #[test]
    fn test_summary_format_renders_nothing() {
        assert!(render(&1, OutputFormat::Summary).unwrap().is_none());
        assert_eq!(render(&1, OutputFormat::Json).unwrap().as_deref(), Some("1"));
    }
}
