//! Config loader: reads `~/.gptrelay/config.json`, merges the legacy
//! `credentials.json`, then applies env var overrides.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.gptrelay/config.json`
//! 3. `credentials.json` in the working directory (`OPENAI_SECRET_KEY`,
//!    `DISCORD_SECRET_TOKEN`)
//! 4. Environment variables `GPTRELAY_<SECTION>__<FIELD>`

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// File name of the legacy credentials file, looked up in the working directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path, credentials file, and env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    let mut config = load_config_from_path(&config_path);
    merge_credentials(&mut config, Path::new(CREDENTIALS_FILE));
    apply_overrides(config, |name| std::env::var(name).ok())
}

/// Load config from a specific file path, without any overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Merge secrets from a legacy `credentials.json` file.
///
/// Only non-empty string values are taken. A missing file is silently ignored.
fn merge_credentials(config: &mut Config, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };

    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring unparsable {}: {}", path.display(), e);
            return;
        }
    };

    let secret = |key: &str| {
        raw.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    if let Some(key) = secret("OPENAI_SECRET_KEY") {
        config.provider.api_key = key;
        debug!("Provider API key taken from {}", path.display());
    }
    if let Some(token) = secret("DISCORD_SECRET_TOKEN") {
        config.discord.token = token;
        debug!("Discord token taken from {}", path.display());
    }
}

/// Apply `GPTRELAY_<SECTION>__<FIELD>` overrides on top of a loaded config.
///
/// `lookup` resolves a variable name to its value; `load_config` passes the
/// process environment. Values that fail to parse are ignored with a warning.
///
/// Supported overrides:
/// - `GPTRELAY_PROVIDER__API_KEY`, `__API_BASE`, `__MODEL`, `__MAX_TOKENS`,
///   `__TEMPERATURE`, `__REQUEST_TIMEOUT_SECS`
/// - `GPTRELAY_SESSIONS__TIMEOUT_SECS`, `__SWEEP_INTERVAL_SECS`
/// - `GPTRELAY_DISCORD__TOKEN`, `__COMMAND_PREFIX`
/// - `GPTRELAY_DISPATCH__MAX_CONCURRENT_MESSAGES`, `__BUS_CAPACITY`
fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let parsed = |name: &str| -> Option<String> { lookup(name).filter(|v| !v.is_empty()) };

    // Provider
    if let Some(val) = parsed("GPTRELAY_PROVIDER__API_KEY") {
        config.provider.api_key = val;
    }
    if let Some(val) = parsed("GPTRELAY_PROVIDER__API_BASE") {
        config.provider.api_base = val;
    }
    if let Some(val) = parsed("GPTRELAY_PROVIDER__MODEL") {
        config.provider.model = val;
    }
    if let Some(n) = parse_var(&parsed, "GPTRELAY_PROVIDER__MAX_TOKENS") {
        config.provider.max_tokens = Some(n);
    }
    if let Some(t) = parse_var(&parsed, "GPTRELAY_PROVIDER__TEMPERATURE") {
        config.provider.temperature = Some(t);
    }
    if let Some(n) = parse_var(&parsed, "GPTRELAY_PROVIDER__REQUEST_TIMEOUT_SECS") {
        config.provider.request_timeout_secs = n;
    }

    // Sessions
    if let Some(n) = parse_var(&parsed, "GPTRELAY_SESSIONS__TIMEOUT_SECS") {
        config.sessions.timeout_secs = n;
    }
    if let Some(n) = parse_var(&parsed, "GPTRELAY_SESSIONS__SWEEP_INTERVAL_SECS") {
        config.sessions.sweep_interval_secs = n;
    }

    // Discord
    if let Some(val) = parsed("GPTRELAY_DISCORD__TOKEN") {
        config.discord.token = val;
    }
    if let Some(val) = parsed("GPTRELAY_DISCORD__COMMAND_PREFIX") {
        config.discord.command_prefix = val;
    }

    // Dispatch
    if let Some(n) = parse_var(&parsed, "GPTRELAY_DISPATCH__MAX_CONCURRENT_MESSAGES") {
        config.dispatch.max_concurrent_messages = n;
    }
    if let Some(n) = parse_var(&parsed, "GPTRELAY_DISPATCH__BUS_CAPACITY") {
        config.dispatch.bus_capacity = n;
    }

    config
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}: cannot parse {:?}", name, raw);
            None
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
