use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cryptochat_core::config::StoreBackend;
use cryptochat_core::{ChatConfig, PersonaRegistry, Session, TranscriptStore};
use cryptochat_memory::{InMemoryTranscriptStore, SqliteTranscriptStore};
use cryptochat_perception::HttpTopicEnrichment;
use cryptochat_reasoning::providers::build_client;
use cryptochat_reasoning::retry::RetryPolicy;
use cryptochat_reasoning::{CompletionParams, DiscussionEvent, DiscussionOrchestrator, LlmClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod console;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "cryptochat", author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "cryptochat.toml", env = "CRYPTOCHAT_CONFIG")]
    config: PathBuf,

    /// Seed for reproducible speaker and style draws
    #[arg(long)]
    seed: Option<u64>,

    /// Write finished sessions to this file as JSON
    #[arg(long)]
    transcript: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one discussion per topic (the configured list by default)
    Batch {
        /// Topic to discuss, repeatable
        #[arg(short, long)]
        topic: Vec<String>,
    },
    /// Pick the topic and personas yourself
    Interactive,
    /// Ask a single persona one question
    Probe {
        #[arg(short, long)]
        persona: String,
        #[arg(long, default_value = "What do you think about the current market?")]
        prompt: String,
    },
    /// Check that the completion API answers through the configured proxy
    Check,
    /// List available personas
    Personas,
    /// Print stored messages of a room (sqlite backend)
    History {
        #[arg(long)]
        room: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = ChatConfig::load_or_default(&cli.config);
    if cli.seed.is_some() {
        config.room.seed = cli.seed;
    }
    let _guard = logging::init(&config.logging)?;

    let registry = Arc::new(load_registry(&config)?);

    match cli.command {
        Command::Personas => {
            for persona in registry.iter() {
                println!("{:<16} {}", persona.handle, persona.name);
            }
            Ok(())
        }
        Command::History { room, limit } => {
            let store = SqliteTranscriptStore::new(&config.store.db_path).await?;
            for msg in store.recent_messages(&room, limit).await? {
                println!("{}: {}", msg.speaker, msg.text);
            }
            Ok(())
        }
        Command::Check => {
            let client = build_client(&config.llm)?;
            let budget = RetryPolicy::from_config(&config.llm).call_budget();
            check_connectivity(client.as_ref(), budget).await
        }
        Command::Probe { persona, prompt } => {
            let orchestrator = build_orchestrator(&config, registry).await?;
            let reply = orchestrator.probe_persona(&persona, &prompt).await?;
            println!("{}: {}", persona, reply);
            Ok(())
        }
        Command::Batch { topic } => {
            let mut orchestrator = build_orchestrator(&config, registry).await?.on_event(print_event);
            let sessions = orchestrator.simulate_multiple_discussions(&topic).await?;
            info!("Finished {} discussions", sessions.len());
            write_transcript(cli.transcript.as_deref(), &sessions)
        }
        Command::Interactive => {
            let mut orchestrator = build_orchestrator(&config, registry).await?.on_event(print_event);
            let mut console = console::RustylineConsole::new().context("Failed to open console")?;
            let session = orchestrator.run_interactive(&mut console).await?;
            write_transcript(cli.transcript.as_deref(), session.as_slice())
        }
    }
}

fn load_registry(config: &ChatConfig) -> Result<PersonaRegistry> {
    let mut registry = PersonaRegistry::builtin()?;
    if let Some(dir) = &config.persona_dir {
        let loaded = registry
            .load_dir(dir)
            .with_context(|| format!("Failed to load personas from {}", dir.display()))?;
        info!("Loaded {} extra personas from {}", loaded, dir.display());
    }
    Ok(registry)
}

async fn build_store(config: &ChatConfig) -> Result<Arc<dyn TranscriptStore>> {
    Ok(match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryTranscriptStore::new()),
        StoreBackend::Sqlite => {
            info!("Connecting to transcript store at {}...", config.store.db_path);
            Arc::new(SqliteTranscriptStore::new(&config.store.db_path).await?)
        }
    })
}

async fn build_orchestrator(config: &ChatConfig, registry: Arc<PersonaRegistry>) -> Result<DiscussionOrchestrator> {
    let client = build_client(&config.llm)?;
    let store = build_store(config).await?;
    info!(
        "Using {} ({}) with the {} strategy",
        config.llm.provider, config.llm.model, config.strategy
    );

    let mut orchestrator = DiscussionOrchestrator::new(registry, client, store, config);
    if let Some(enrichment) = HttpTopicEnrichment::from_config(&config.enrichment)? {
        orchestrator = orchestrator.with_enrichment(Arc::new(enrichment));
    }
    Ok(orchestrator)
}

async fn check_connectivity(client: &dyn LlmClient, timeout: Duration) -> Result<()> {
    let params = CompletionParams {
        max_tokens: 20,
        temperature: 0.0,
        ..CompletionParams::default()
    };
    let reply = tokio::time::timeout(
        timeout,
        client.complete("You are a helpful assistant.", "Say 'Hello, World!'", params),
    )
    .await
    .context("Completion API did not answer in time")??;
    println!("API reachable: {}", reply.trim());
    Ok(())
}

fn print_event(event: &DiscussionEvent) {
    match event {
        DiscussionEvent::Started { topic, .. } => println!("=== New Discussion: {} ===\n", topic),
        DiscussionEvent::Turn(turn) => println!("{}: {}", turn.speaker, turn.text),
        DiscussionEvent::Reaction { symbol, .. } => println!("{}", symbol),
        DiscussionEvent::TopicChanged { topic, .. } => println!("\n=== Topic: {} ===\n", topic),
        DiscussionEvent::Ended { .. } => println!("\n=== End of Discussion ===\n"),
    }
}

fn write_transcript(path: Option<&Path>, sessions: &[Session]) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let json = serde_json::to_string_pretty(sessions)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
    info!("Wrote {} sessions to {}", sessions.len(), path.display());
    Ok(())
}
