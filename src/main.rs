//! cortex - cognitive scheduler demo and diagnostics
//!
//! Usage:
//!   cortex run --personas 3 --message "why is the pool exhausted?"
//!   cortex assess "How do I fix this deadlock?"
//!   cortex score "I'm not sure, perhaps, actually wait"
//!   cortex dump-config
//!   cortex version

use anyhow::Context;
use clap::{Parser, Subcommand};
use cortex_agent::{ComplexityAssessor, CortexConfig, CycleOutcome, LogSink, ProgressiveScorer};
use cortex_core::InboxMessage;
use cortex_llm::{CancellationToken, Script, ScriptedEngine};
use cortex::Swarm;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "cortex",
    about = "Self-paced personas that take turns and share memory",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted swarm over a sequence of messages
    Run {
        /// Number of personas
        #[arg(short, long, default_value_t = 3)]
        personas: usize,
        /// Context the messages belong to
        #[arg(short, long, default_value = "demo")]
        context: String,
        /// Message priority in [0, 1]
        #[arg(long, default_value_t = 0.7)]
        priority: f64,
        /// Fixed arbitration window, overriding the adaptive one
        #[arg(long)]
        window_ms: Option<u64>,
        /// Messages to post, one round each
        #[arg(short, long, required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Print the complexity assessment of a message
    Assess { text: String },
    /// Print the progressive-scorer verdict for one window of text
    Score { text: String },
    /// Print the effective config as TOML
    DumpConfig,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => CortexConfig::load(path),
        None => CortexConfig::default(),
    };

    match cli.command {
        Commands::Run {
            personas,
            context,
            priority,
            window_ms,
            message,
        } => run(config, personas, &context, priority, window_ms, message).await?,
        Commands::Assess { text } => {
            let assessment = ComplexityAssessor::new(config.complexity).assess(&text);
            println!("{}", serde_json::to_string_pretty(&assessment)?);
        }
        Commands::Score { text } => {
            let verdict = ProgressiveScorer::new(config.scorer).analyze(&text, 0);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::DumpConfig => print!("{}", config.to_toml()),
        Commands::Version => println!("cortex v{}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}

async fn run(
    mut config: CortexConfig,
    personas: usize,
    context: &str,
    priority: f64,
    window_ms: Option<u64>,
    messages: Vec<String>,
) -> anyhow::Result<()> {
    if let Some(ms) = window_ms {
        config.arbitration.min_window_ms = ms;
        config.arbitration.max_window_ms = ms;
        config.arbitration.initial_window_ms = ms;
    }

    let engine = Arc::new(ScriptedEngine::constant(Script::Echo("On it:".into())));
    let mut swarm =
        Swarm::new(config, engine, Arc::new(LogSink)).context("failed to build swarm")?;
    for i in 1..=personas.max(1) {
        swarm.add_persona(format!("persona-{}", i));
    }

    let cancel = CancellationToken::new();
    for text in messages {
        let delivered = swarm.post(InboxMessage::new(context, text.as_str(), priority));
        tracing::debug!("Posted to {} personas", delivered);

        let reports = swarm.tick_all(&cancel).await;
        let winner = reports
            .iter()
            .find(|r| r.outcome == CycleOutcome::Delivered)
            .map(|r| r.state.agent_id.to_string());
        match winner {
            Some(agent) => println!("[{}] {} -> {}", context, text, agent),
            None => println!("[{}] {} -> (nobody)", context, text),
        }
        for r in &reports {
            println!(
                "    {:<12} {:<10} energy {:.2} mood {}",
                r.state.agent_id.as_str(),
                format!("{:?}", r.outcome),
                r.state.energy,
                r.state.mood
            );
        }
    }
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cortex=info".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let Some(path) = log_file else {
        registry.init();
        return Ok(None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("--log-file {} has no file name", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    registry
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}
