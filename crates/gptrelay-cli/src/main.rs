//! gptrelay CLI: entry point.
//!
//! # Commands
//!
//! - `gptrelay run`: start the gateway (Discord channel + dispatcher)
//! - `gptrelay chat`: talk to the bot from the terminal
//! - `gptrelay ask PROMPT`: one completion, no session
//! - `gptrelay status`: show configuration
//! - `gptrelay onboard`: write the default config file

mod gateway;
mod helpers;
mod onboard;
mod repl;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use gptrelay_chat::{ExpirySweeper, SessionManager, SessionStore};
use gptrelay_core::config::{load_config, Config};
use gptrelay_providers::{CompletionProvider, HttpProvider};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// gptrelay: relays chat prompts to an OpenAI-compatible completion API
#[derive(Parser)]
#[command(name = "gptrelay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (channels + dispatcher + expiry sweeper)
    Run {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Chat with the bot from the terminal using the bot commands
    Chat {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Send a single prompt, print the completion, and exit
    Ask {
        /// Prompt text
        prompt: String,
    },

    /// Show configuration and provider status
    Status,

    /// Create the default configuration file
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { logs } => {
            init_logging(logs);
            gateway::run().await
        }
        Commands::Chat { logs } => {
            init_logging(logs);
            let config = load_config(None);
            let (sessions, sweeper) = build_sessions(&config)?;
            repl::run(sessions, sweeper, &config.discord.command_prefix).await
        }
        Commands::Ask { prompt } => {
            init_logging(false);
            run_ask(&prompt).await
        }
        Commands::Status => status::run(),
        Commands::Onboard => onboard::run(),
    }
}

// ─────────────────────────────────────────────
// Ask command
// ─────────────────────────────────────────────

async fn run_ask(prompt: &str) -> Result<()> {
    let config = load_config(None);
    let provider = build_provider(&config)?;

    info!(model = %provider.model(), "sending single prompt");
    helpers::print_thinking();
    let result = provider.complete(&[prompt.to_string()]).await;
    helpers::clear_thinking();

    let reply = result.context("completion failed")?;
    helpers::print_response(&reply);
    Ok(())
}

/// Build the completion provider, refusing to start without an API key.
pub fn build_provider(config: &Config) -> Result<Arc<HttpProvider>> {
    if !config.provider.is_configured() {
        anyhow::bail!(
            "no API key configured; set provider.apiKey in {} or GPTRELAY_PROVIDER__API_KEY",
            gptrelay_core::config::get_config_path().display()
        );
    }
    let provider = HttpProvider::new(&config.provider).context("failed to create provider")?;
    Ok(Arc::new(provider))
}

/// Build the session store, its sweeper, and the manager on top of them.
pub fn build_sessions(config: &Config) -> Result<(Arc<SessionManager>, Arc<ExpirySweeper>)> {
    let provider = build_provider(config)?;
    let store = Arc::new(SessionStore::new(config.sessions.timeout()));
    let sweeper = Arc::new(ExpirySweeper::new(
        store.clone(),
        Some(config.sessions.sweep_interval()),
    ));
    let sessions = Arc::new(SessionManager::new(store, provider));
    Ok((sessions, sweeper))
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("gptrelay=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
