//! Effective-configuration inspection with secret redaction.

use std::path::PathBuf;

use colloquy_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};

use super::CommandResult;

pub fn run(config_path: Option<PathBuf>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions { config_path, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(format!("config validation failed: {error}"), 2),
    };

    let lines = vec![
        "effective config (source precedence: overrides > env > file > default):".to_owned(),
        render("engine.mode", &config.engine.mode.to_string()),
        render("remote.base_url", &option(&config.remote.base_url)),
        render("remote.api_key", &redact_opt(&config.remote.api_key)),
        render("remote.timeout_secs", &config.remote.timeout_secs.to_string()),
        render("remote.max_retries", &config.remote.max_retries.to_string()),
        render("ner.enabled", &config.ner.enabled.to_string()),
        render("ner.base_url", &option(&config.ner.base_url)),
        render("ner.timeout_secs", &config.ner.timeout_secs.to_string()),
        render("llm.enabled", &config.llm.enabled.to_string()),
        render("llm.provider", &format!("{:?}", config.llm.provider)),
        render("llm.api_key", &redact_opt(&config.llm.api_key)),
        render("llm.base_url", &option(&config.llm.base_url)),
        render("llm.model", &config.llm.model),
        render("llm.timeout_secs", &config.llm.timeout_secs.to_string()),
        render("llm.max_retries", &config.llm.max_retries.to_string()),
        render("logging.level", &config.logging.level),
        render("logging.format", &format!("{:?}", config.logging.format)),
    ];

    CommandResult::success(lines.join("\n"))
}

fn render(key: &str, value: &str) -> String {
    format!("  {key} = {value}")
}

fn option(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "(unset)".to_owned())
}

fn redact_opt(value: &Option<SecretString>) -> String {
    match value {
        Some(secret) => redact(secret.expose_secret()),
        None => "(unset)".to_owned(),
    }
}

/// Keep just enough of the secret to recognize which one is configured.
fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        "****".to_owned()
    } else {
        format!("{}****", &secret[..4])
    }
}
