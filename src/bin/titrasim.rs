use std::{path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};
use titrasim::{
    eval::{load_scenarios, BatchRunner, SimulationConfig, SubjectKind},
    providers::{openai::OpenAI, scripted::ScriptedProvider},
    LLMProvider,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, ValueEnum)]
enum ProviderKind {
    Openai,
    Scripted,
}

#[derive(Parser)]
#[command(name = "titrasim")]
#[command(about = "Simulate and score heart failure titration conversations")]
struct Args {
    /// Scenario file (JSON, or YAML by extension)
    #[arg(long, default_value = "conversations.json")]
    scenarios: PathBuf,

    /// Simulation config file (YAML); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run at most this many scenarios
    #[arg(long)]
    num_scenarios: Option<usize>,

    /// Conversations run concurrently per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Directory for per-conversation results and the summary
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Assistant under evaluation
    #[arg(long, value_enum)]
    subject: Option<SubjectKind>,

    /// Only run these round numbers (comma separated)
    #[arg(long, value_delimiter = ',')]
    rounds: Vec<u32>,

    /// Skip scenarios with fewer rounds
    #[arg(long)]
    min_rounds: Option<usize>,

    /// Skip scenarios with more rounds
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Maximum exchanges per round
    #[arg(long)]
    max_turns: Option<usize>,

    #[arg(long, value_enum, default_value = "openai")]
    provider: ProviderKind,

    /// Route file for the scripted provider (YAML)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Model for the assistant under evaluation
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    judge_model: Option<String>,

    #[arg(long)]
    patient_model: Option<String>,
}

impl Args {
    fn apply(&self, mut config: SimulationConfig) -> SimulationConfig {
        if let Some(n) = self.num_scenarios {
            config.num_scenarios = Some(n);
        }
        if let Some(size) = self.batch_size {
            config = config.with_batch_size(size);
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir.clone());
        }
        if let Some(subject) = self.subject {
            config = config.with_subject(subject);
        }
        if !self.rounds.is_empty() {
            config = config.with_rounds(self.rounds.clone());
        }
        if let Some(min) = self.min_rounds {
            config.min_rounds = Some(min);
        }
        if let Some(max) = self.max_rounds {
            config.max_rounds = Some(max);
        }
        if let Some(turns) = self.max_turns {
            config = config.with_max_turns(turns);
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(model) = &self.judge_model {
            config = config.with_judge_model(model.clone());
        }
        if let Some(model) = &self.patient_model {
            config = config.with_patient_model(model.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,titrasim=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let base = match &args.config {
        Some(path) => SimulationConfig::from_yaml_file(path)?,
        None => SimulationConfig::default(),
    };
    let config = args.apply(base);

    let scenarios = config.scenario_filter().apply(load_scenarios(&args.scenarios)?);
    if scenarios.is_empty() {
        eprintln!("No scenarios matched.");
        std::process::exit(2);
    }

    let provider: Arc<dyn LLMProvider> = match args.provider {
        ProviderKind::Openai => Arc::new(OpenAI::from_env()?),
        ProviderKind::Scripted => {
            let script = args
                .script
                .as_ref()
                .ok_or("--script is required with --provider scripted")?;
            Arc::new(ScriptedProvider::from_yaml_file(script)?)
        }
    };

    tracing::info!(
        provider = provider.name(),
        model = %config.model,
        subject = %config.subject,
        scenarios = scenarios.len(),
        "starting simulation"
    );

    let output_dir = config.output_dir.clone();
    let runner = BatchRunner::new(config, provider).with_configured_template()?;
    let summary = runner.run(&scenarios).await?;

    let mean = summary
        .scores
        .weighted
        .map(|stats| format!("{:.3}", stats.mean))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "Subject: {}, Conversations: {}/{} completed ({} partial, {} failed), Rounds evaluated: {}/{}, Mean weighted score: {mean}, Output: {}",
        summary.subject,
        summary.completed,
        summary.conversations,
        summary.partial,
        summary.failed,
        summary.rounds_evaluated,
        summary.rounds,
        output_dir.display()
    );
    for (rule, count) in &summary.failures_by_rule {
        println!("  {rule}: {count}");
    }
    for failed in &summary.unsuccessful {
        eprintln!(
            "{:?} {}: {}",
            failed.status,
            failed.scenario_id,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    if summary.all_completed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
