//! `gptrelay status`: show configuration and provider status.

use anyhow::Result;
use colored::Colorize;

use gptrelay_core::config::{get_config_path, load_config, Config};
use gptrelay_core::utils::mask_secret;

use crate::helpers::display_path;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "gptrelay status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        display_path(&config_path),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    println!("  {:<18} {}", "API base:".bold(), config.provider.api_base);
    println!("  {:<18} {}", "Model:".bold(), config.provider.model);
    println!(
        "  {:<18} {} | {}",
        "Parameters:".bold(),
        format_optional("temp", config.provider.temperature).dimmed(),
        format_optional("max_tokens", config.provider.max_tokens).dimmed(),
    );

    println!();
    for (name, value) in secret_rows(&config) {
        let status = if value.is_empty() {
            format!("{}", "· not configured".dimmed())
        } else {
            format!("{} ({})", "✓".green(), mask_secret(value))
        };
        println!("  {:<18} {}", name.bold(), status);
    }

    println!();
    println!(
        "  {:<18} expire after {}s, swept every {}s",
        "Sessions:".bold(),
        config.sessions.timeout_secs,
        config.sessions.sweep_interval().as_secs()
    );
    println!(
        "  {:<18} prefix `{}`, up to {} in flight",
        "Commands:".bold(),
        config.discord.command_prefix,
        config.dispatch.max_concurrent_messages
    );
    println!();

    Ok(())
}

fn secret_rows(config: &Config) -> [(&'static str, &str); 2] {
    [
        ("OpenAI key:", config.provider.api_key.as_str()),
        ("Discord token:", config.discord.token.as_str()),
    ]
}

fn format_optional<T: std::fmt::Display>(label: &str, value: Option<T>) -> String {
    match value {
        Some(v) => format!("{label}: {v}"),
        None => format!("{label}: default"),
    }
}
