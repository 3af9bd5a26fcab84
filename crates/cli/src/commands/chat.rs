//! `maestro chat` — Interactive or single-message chat mode.

use super::runtime::{build_orchestrator, open_stores, seed_stores, spawn_event_listener};
use maestro_agent::{ChatOrchestrator, ConversationSession};
use maestro_config::AppConfig;
use maestro_core::event::EventBus;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Ollama needs no key; anything else does
    if config.primary.provider != "ollama" && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    MAESTRO_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY  = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let stores = open_stores(&config).await?;
    seed_stores(&config, &stores).await?;

    let events = Arc::new(EventBus::default());
    let listener = spawn_event_listener(&events);
    let orchestrator = build_orchestrator(&config, &stores, events);
    let session = orchestrator.new_session();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let response = orchestrator.respond(&session, &msg).await;
        eprint!("\r              \r");
        println!("{}", response?.text().unwrap_or_default());
    } else {
        interactive(&config, &orchestrator, &session).await?;
    }

    orchestrator.shutdown().await;
    listener.abort();
    Ok(())
}

async fn interactive(
    config: &AppConfig,
    orchestrator: &ChatOrchestrator,
    session: &ConversationSession,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Maestro — Classical Music Chat      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:         {} ({})", config.primary.model, config.primary.provider);
    println!("  Advisor model: {} ({})", config.advisor_model.model, config.advisor_model.provider);
    println!("  Advisors:      {}", orchestrator.chain().names().join(", "));
    println!("  Conversation:  {}", session.id());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        eprint!("  ...");
        match orchestrator.respond(session, line).await {
            Ok(response) => {
                eprint!("\r     \r");
                println!();
                for text_line in response.text().unwrap_or_default().lines() {
                    println!("  Maestro > {text_line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
