//! `gptrelay onboard`: create the default configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use gptrelay_core::config::{get_config_path, save_config, Config};

use crate::helpers::display_path;

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "gptrelay setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    let created = write_default_config(&config_path)?;
    if created {
        println!("  {} created config at {}", "✓".green(), display_path(&config_path));
    } else {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            display_path(&config_path)
        );
    }

    println!();
    println!("  Next steps:");
    println!("    1. Set {} (or GPTRELAY_PROVIDER__API_KEY)", "provider.apiKey".bold());
    println!("    2. Set {} (or GPTRELAY_DISCORD__TOKEN)", "discord.token".bold());
    println!("    3. Run {}", "gptrelay run".green());
    println!();

    Ok(())
}

/// Write the default config to `path` unless a file is already there.
///
/// Returns whether a file was written.
fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}
