mod console;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::ConsoleTransport;
use murmur_core::{ChatEvent, MurmurConfig};
use murmur_engine::{OpenAiCompatClient, Orchestrator};
use murmur_memory::MemoryStore;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "murmur.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent against the console transport (default)
    Run,
    /// Reset the message memory store
    ClearMemory,
    /// Show memory store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let cfg = MurmurConfig::load_or_default(&args.config);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg).await,
        Command::ClearMemory => {
            let mut store = MemoryStore::load_or_empty(&cfg.memory.file, cfg.memory.max_items);
            store.clear();
            println!("Message memory cleared.");
            Ok(())
        }
        Command::Stats => {
            let store = MemoryStore::load_or_empty(&cfg.memory.file, cfg.memory.max_items);
            println!("Current memory size: {} messages", store.len());
            if store.is_empty() {
                println!("Memory is already empty");
            } else {
                println!("Tip: run `murmur clear-memory` to reset before a persona change");
            }
            Ok(())
        }
    }
}

async fn run(cfg: MurmurConfig) -> Result<()> {
    info!("Starting murmur with {} candidate models", cfg.llm.models.len());

    let transport = Arc::new(ConsoleTransport::new(&cfg.identity.name));
    let backend = Arc::new(OpenAiCompatClient::new(
        &cfg.llm.api_base,
        cfg.llm.request_timeout_secs,
    )?);
    // On the console everything is a direct message from the operator; give
    // them owner identity so administrative commands work out of the box.
    let operator_id = if cfg.policy.owner_id.is_empty() {
        "operator".to_string()
    } else {
        cfg.policy.owner_id.clone()
    };
    let orchestrator = Orchestrator::from_config(cfg, transport, backend);

    let (tx, rx) = mpsc::channel::<ChatEvent>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut ordinal = 0u64;
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "quit" || trimmed == "exit" {
                break;
            }
            ordinal += 1;
            let event = ChatEvent::new(
                format!("stdin-{}", ordinal),
                "console",
                operator_id.clone(),
                "operator",
                trimmed,
            );
            if tx.send(event).await.is_err() {
                break;
            }
        }
        // Dropping tx shuts the orchestrator loop down.
    });

    println!("murmur online. Type 'quit' to exit.");
    orchestrator.run(rx).await;
    Ok(())
}
