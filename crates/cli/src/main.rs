//! Maestro CLI — the main entry point.
//!
//! Commands:
//! - `chat`     — Interactive chat or single-message mode
//! - `seed`     — Insert the default mention vocabulary
//! - `popular`  — Show the most-mentioned composers, instruments or performers
//! - `config`   — Show, locate or initialise the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "maestro",
    about = "Maestro — a classical-music assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with Maestro
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Insert the default mention vocabulary into an empty store
    Seed,

    /// Show the most-mentioned things of one kind
    Popular {
        /// Composer, Instrument or Performer
        #[arg(short, long, default_value = "Composer")]
        kind: String,

        /// How many to show
        #[arg(short, long, default_value_t = 5)]
        top: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Seed => commands::seed::run().await?,
        Commands::Popular { kind, top } => commands::popular::run(&kind, top).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
