use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agentcart_core::config::{AppConfig, LoadOptions};
use serde_json::{Map, Value as JsonValue};
use toml::Value;

use crate::commands::CommandResult;

/// Config keys with the environment variable that can set each one.
const FIELDS: &[(&str, &[&str])] = &[
    ("database.url", &["AGENTCART_DATABASE_URL"]),
    ("database.max_connections", &["AGENTCART_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["AGENTCART_DATABASE_TIMEOUT_SECS"]),
    ("llm.provider", &["AGENTCART_LLM_PROVIDER"]),
    ("llm.api_key", &["AGENTCART_LLM_API_KEY"]),
    ("llm.base_url", &["AGENTCART_LLM_BASE_URL"]),
    ("llm.model", &["AGENTCART_LLM_MODEL"]),
    ("llm.timeout_secs", &["AGENTCART_LLM_TIMEOUT_SECS"]),
    ("agent.max_search_rounds", &["AGENTCART_AGENT_MAX_SEARCH_ROUNDS"]),
    ("payment.latency_ms", &["AGENTCART_PAYMENT_LATENCY_MS"]),
    ("payment.jitter_ms", &["AGENTCART_PAYMENT_JITTER_MS"]),
    ("minting.latency_ms", &["AGENTCART_MINTING_LATENCY_MS"]),
    ("logging.level", &["AGENTCART_LOGGING_LEVEL", "AGENTCART_LOG_LEVEL"]),
    ("logging.format", &["AGENTCART_LOGGING_FORMAT", "AGENTCART_LOG_FORMAT"]),
];

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut sources = Map::new();
    for (key_path, env_keys) in FIELDS {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        sources.insert((*key_path).to_string(), JsonValue::String(source));
    }

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        serde_json::json!({ "config": config.redacted(), "sources": sources }),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    ["agentcart.toml", "config/agentcart.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[llm]\nmodel = \"llama3.1\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "payment.latency_ms"));
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc: toml::Value = "[payment]\nlatency_ms = 10\n".parse().expect("toml");
        let source = field_source(
            "payment.latency_ms",
            &["AGENTCART_TEST_UNSET_PAYMENT_LATENCY"],
            Some(&doc),
            Some(std::path::Path::new("agentcart.toml")),
        );
        assert_eq!(source, "file (agentcart.toml)");
        assert_eq!(field_source("minting.latency_ms", &[], Some(&doc), None), "default");
    }
}
