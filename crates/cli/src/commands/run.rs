//! `stepwire run`: one-shot or interactive runs, printing wire events.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use stepwire_agent::{Engine, EngineFactory, ExecutorLimits, SimpleCompaction};
use stepwire_config::EngineConfig;
use stepwire_core::agent::Agent;
use stepwire_core::wire::{ContentKind, DeliveryMode, WireListener, WireMessage};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub struct RunOptions {
    pub message: Option<String>,
    pub config: Option<PathBuf>,
    pub name: String,
    pub system_prompt: String,
}

/// Prints streamed content to stdout and tool activity to stderr.
struct ConsolePrinter;

impl WireListener for ConsolePrinter {
    fn on_message(&self, message: &WireMessage) {
        match message {
            WireMessage::ContentPart {
                text,
                kind: ContentKind::Normal,
            } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            WireMessage::ContentPart {
                text,
                kind: ContentKind::Reasoning,
            } => eprint!("{text}"),
            WireMessage::ToolCall { request } => {
                eprintln!("\n  [tool] {}({})", request.name, request.arguments);
            }
            WireMessage::ToolResult { text, .. } => eprintln!("  [result] {text}"),
            WireMessage::StepInterrupted => eprintln!("\n  [interrupted]"),
            WireMessage::StepBegin { .. } => {}
        }
    }
}

pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    let mut config = super::load_config(options.config.as_deref()).context("failed to load config")?;
    // Print in step with the run rather than from the delivery thread.
    config.wire.delivery = DeliveryMode::Sync;

    let agent = Agent::builder()
        .name(options.name)
        .system_prompt(options.system_prompt)
        .build()?;

    let (engine, factory) = build_engine(config, agent)?;
    let printer: Arc<dyn WireListener> = Arc::new(ConsolePrinter);
    engine.add_listener(&printer);

    let result = match options.message {
        Some(message) => run_once(&engine, message).await,
        None => interactive(&engine).await,
    };

    engine.shutdown().await;
    if let Some(factory) = factory {
        factory.shutdown();
    }
    result
}

fn build_engine(config: EngineConfig, agent: Agent) -> anyhow::Result<(Engine, Option<EngineFactory>)> {
    if config.has_api_key() {
        let factory = EngineFactory::new(config)?;
        let engine = factory.create_engine(agent)?;
        return Ok((engine, Some(factory)));
    }

    warn!("No API key configured; using the placeholder client");
    Ok((placeholder_engine(&config, agent)?, None))
}

/// An engine on the placeholder client that still honours the configured
/// budget and compaction policy.
fn placeholder_engine(config: &EngineConfig, agent: Agent) -> stepwire_core::Result<Engine> {
    Engine::builder(agent)
        .delivery_mode(config.wire.delivery)
        .limits(ExecutorLimits::from_config(config))
        .compaction(Arc::new(SimpleCompaction::from_config(&config.compaction)))
        .build()
}

async fn run_once(engine: &Engine, message: String) -> anyhow::Result<()> {
    let outcome = engine.run(message).await?;
    println!();
    tracing::debug!(steps = outcome.steps, tool_calls = outcome.tool_calls, "Run finished");
    Ok(())
}

async fn interactive(engine: &Engine) -> anyhow::Result<()> {
    println!();
    println!("  Agent:  {}", engine.name());
    println!("  Model:  {}", engine.model());
    println!("  Type your message and press Enter. Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match engine.run(input).await {
            Ok(_) => println!("\n"),
            Err(e) => eprintln!("  [Error] {e}\n"),
        }
    }

    println!();
    Ok(())
}
