//! promptsmith CLI
//!
//! Thin driver over the pipeline:
//! - `run` executes the full pipeline for a request file
//! - `scan` runs the standalone security scan over a prompt file
//! - `validate` checks a request file without running anything
//!
//! The offline provider is used unless `--provider` names another one
//! compiled into this build.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptsmith_core::{AttackCategory, RunRequest, StepKind};
use promptsmith_runtime::resilience::BudgetTracker;
use promptsmith_runtime::{
    CircuitBreaker, LlmCaller, LlmProvider, PipelineOrchestrator, ProviderRegistry,
    RuntimeConfig, SecurityScanner,
};

mod output;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "promptsmith")]
#[command(about = "Analyze and improve LLM system prompts", long_about = None)]
#[command(version)]
struct Cli {
    /// Runtime configuration file (YAML)
    #[arg(short, long, global = true, env = "PROMPTSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Text-generation provider
    #[arg(short, long, global = true, default_value = "offline")]
    provider: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the improvement pipeline
    Run {
        /// Request file (YAML or JSON)
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Probe a prompt for vulnerabilities
    Scan {
        /// File holding the prompt text
        #[arg(long)]
        prompt: PathBuf,

        /// Attack categories, comma separated. Defaults to the full catalog.
        #[arg(long, value_delimiter = ',')]
        attacks: Vec<AttackCategory>,

        /// Stop probing once this much (USD) has been spent
        #[arg(long)]
        cost_ceiling: Option<f64>,
    },

    /// Validate a request file
    Validate {
        #[arg(short, long)]
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run { ref request } => run(&cli, request).await,
        Commands::Scan {
            ref prompt,
            ref attacks,
            cost_ceiling,
        } => scan(&cli, prompt, attacks, cost_ceiling).await,
        Commands::Validate { ref request } => validate(request),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn provider(name: &str) -> anyhow::Result<Arc<dyn LlmProvider>> {
    ProviderRegistry::with_defaults()
        .create(name, &serde_json::json!({}))
        .with_context(|| format!("creating provider '{}'", name))
}

async fn run(cli: &Cli, request: &Path) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let request = RunRequest::from_file(request)
        .with_context(|| format!("reading request {}", request.display()))?;

    let orchestrator = PipelineOrchestrator::new(provider(&cli.provider)?, config);
    let response = orchestrator.run(request).await?;

    match output::render(&response, cli.format)? {
        Some(text) => println!("{}", text),
        None => print!("{}", output::run_summary(&response)),
    }
    Ok(())
}

async fn scan(
    cli: &Cli,
    prompt: &Path,
    attacks: &[AttackCategory],
    cost_ceiling: Option<f64>,
) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let text = std::fs::read_to_string(prompt)
        .with_context(|| format!("reading prompt {}", prompt.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("prompt file {} is empty", prompt.display());
    }

    let caller = LlmCaller::new(
        StepKind::SecurityScan,
        provider(&cli.provider)?,
        config.completion_for(StepKind::SecurityScan),
        config.retry.clone(),
        Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
        Arc::new(BudgetTracker::new(
            config.budget.global_max_tokens,
            config.budget.per_step_max_tokens,
        )),
    );
    let mut scanner = SecurityScanner::new(caller);
    if let Some(ceiling) = cost_ceiling {
        scanner = scanner.with_cost_ceiling(ceiling);
    }

    let report = scanner.scan(&text, attacks).await.output;
    match output::render(&report, cli.format)? {
        Some(text) => println!("{}", text),
        None => print!("{}", output::scan_summary(&report)),
    }
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let request = RunRequest::from_file(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    request.validate()?;

    println!("{}: valid", path.display());
    for kind in StepKind::ORDERED {
        if !request.config.per_step_enable_flags.is_enabled(kind) {
            println!("  {}: disabled", kind);
        } else if let Some(issue) = request.config.config_issue(kind) {
            println!("  {}: will be skipped ({})", kind, issue);
        }
    }
    let (_, unknown) = request.config.attack_categories();
    if !unknown.is_empty() {
        println!("  unknown attack categories: {}", unknown.join(", "));
    }
    Ok(())
}
