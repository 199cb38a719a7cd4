//! Interactive REPL: the bot's command set, typed at a terminal.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Every line is handled as if posted in channel `cli` of server `local`, so
//! `!gpt` keeps a conversation that `!clear` resets and the sweeper expires.

use std::sync::Arc;

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use gptrelay_chat::dispatcher::respond;
use gptrelay_chat::{Command, ExpirySweeper, SessionManager};
use gptrelay_core::utils::get_history_path;

use crate::helpers;

/// Server id used for REPL conversations.
pub const LOCAL_SERVER: &str = "local";

/// Channel id used for REPL conversations.
pub const LOCAL_CHANNEL: &str = "cli";

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Run the interactive REPL loop.
pub async fn run(
    sessions: Arc<SessionManager>,
    sweeper: Arc<ExpirySweeper>,
    prefix: &str,
) -> Result<()> {
    helpers::print_banner();
    println!(
        "Type `{prefix}help` for commands, or \"exit\" to quit."
    );
    println!();

    let sweeper_task = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.start().await })
    };

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        let _ = editor.add_history_entry(&input);

        let Some(command) = Command::parse(trimmed, prefix) else {
            println!("{}", unrecognised_hint(prefix));
            continue;
        };

        debug!(command = ?command, "processing input");
        helpers::print_thinking();
        let reply = respond(&sessions, command, LOCAL_SERVER, LOCAL_CHANNEL, prefix).await;
        helpers::clear_thinking();
        helpers::print_response(&reply);
    }

    save_history(&mut editor);
    sweeper.stop();
    let _ = sweeper_task.await;

    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = get_history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

/// The bot stays silent on unknown input; the terminal gets a hint instead.
fn unrecognised_hint(prefix: &str) -> String {
    format!("(not a command; try `{prefix}help`)")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
