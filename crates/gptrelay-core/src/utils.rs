//! Utility helpers: data paths and secret masking.

use std::path::PathBuf;

/// Get the gptrelay data directory (e.g. `~/.gptrelay/`).
pub fn get_data_path() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gptrelay")
}

/// REPL history file (e.g. `~/.gptrelay/history.txt`).
pub fn get_history_path() -> PathBuf {
    get_data_path().join("history.txt")
}

/// Mask a secret for display, keeping only the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}
