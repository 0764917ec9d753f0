use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flowforge_client::HttpBackend;
use flowforge_core::config::AppConfig;
use flowforge_core::event::EventBus;
use flowforge_core::types::{LogLevel, Role, SessionId};
use flowforge_engine::{validate, TestRunner, Transcript, TraversalEngine};
use flowforge_graph::Workflow;

#[derive(Parser)]
#[command(name = "flowforge", version, about = "Workflow composer core for agent graphs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a workflow file is well-formed and executable
    Validate {
        /// Workflow JSON file
        file: PathBuf,
    },
    /// Walk the workflow graph and print the execution trace
    Simulate {
        /// Workflow JSON file
        file: PathBuf,
    },
    /// Send one input through the execution endpoint
    Run {
        /// Workflow JSON file
        file: PathBuf,
        /// The user input for this turn
        #[arg(short, long)]
        input: String,
        /// Session ID (auto-generated if not provided)
        #[arg(short, long)]
        session: Option<String>,
        /// Force the one-shot endpoint even if streaming is configured
        #[arg(long)]
        no_stream: bool,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowforge=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config");
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::default()
    };

    match cli.command {
        Commands::Validate { file } => {
            let workflow = load_workflow(&file)?;
            validate(&workflow)?;
            println!(
                "OK: {} nodes, {} connections",
                workflow.nodes().len(),
                workflow.connections().len()
            );
        }
        Commands::Simulate { file } => {
            let workflow = load_workflow(&file)?;
            let engine = TraversalEngine::new().with_step_delay(
                std::time::Duration::from_millis(config.simulation.step_delay_ms),
            );
            let trace = engine.simulate(&workflow).await?;
            for entry in &trace {
                let level = match entry.level {
                    LogLevel::Info => "INFO",
                    LogLevel::Warning => "WARN",
                    LogLevel::Error => "ERROR",
                    LogLevel::Debug => "DEBUG",
                };
                println!("[{}] {}", level, entry.message);
            }
        }
        Commands::Run {
            file,
            input,
            session,
            no_stream,
        } => {
            let workflow = load_workflow(&file)?;
            let session_id = session
                .map(|s| SessionId::from_str(&s))
                .unwrap_or_default();
            let backend = Arc::new(HttpBackend::new(config.endpoint.clone()));
            let bus = Arc::new(EventBus::default());
            let runner = TestRunner::new(backend, bus)
                .with_streaming(config.endpoint.streaming && !no_stream);

            let mut transcript = Transcript::new();
            runner
                .send(&workflow, &mut transcript, &session_id, &input)
                .await?;

            for message in transcript.messages() {
                let who = match (&message.role, &message.agent_name) {
                    (Role::Assistant, Some(agent)) => agent.clone(),
                    (Role::Assistant, None) => "assistant".to_string(),
                    (Role::User, _) => "you".to_string(),
                    (Role::System, _) => "note".to_string(),
                    (Role::Error, _) => "error".to_string(),
                };
                println!("{}: {}", who, message.content);
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)?;
    let workflow: Workflow = serde_json::from_str(&content)?;
    Ok(workflow)
}
