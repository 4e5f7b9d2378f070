use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;
use waypoint_core::config::{AppConfig, LoadOptions};

use super::{CommandResult, EXIT_CONFIG};

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl ConfigField {
    fn new(key: &'static str, env_key: &'static str, value: impl ToString) -> Self {
        Self { key, env_key, value: value.to_string() }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn fields(config: &AppConfig) -> Vec<ConfigField> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        ConfigField::new(
            "llm.provider",
            "WAYPOINT_LLM_PROVIDER",
            format!("{:?}", config.llm.provider),
        ),
        ConfigField::new("llm.model", "WAYPOINT_LLM_MODEL", &config.llm.model),
        ConfigField::new(
            "llm.base_url",
            "WAYPOINT_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        ConfigField::new("llm.api_key", "WAYPOINT_LLM_API_KEY", api_key),
        ConfigField::new("llm.timeout_secs", "WAYPOINT_LLM_TIMEOUT_SECS", config.llm.timeout_secs),
        ConfigField::new("tools.enabled", "WAYPOINT_TOOLS_ENABLED", config.tools.enabled),
        ConfigField::new("tools.base_url", "WAYPOINT_TOOLS_BASE_URL", &config.tools.base_url),
        ConfigField::new(
            "tools.call_timeout_ms",
            "WAYPOINT_TOOLS_CALL_TIMEOUT_MS",
            config.tools.call_timeout_ms,
        ),
        ConfigField::new(
            "tools.max_attempts",
            "WAYPOINT_TOOLS_MAX_ATTEMPTS",
            config.tools.max_attempts,
        ),
        ConfigField::new(
            "router.request_timeout_secs",
            "WAYPOINT_ROUTER_REQUEST_TIMEOUT_SECS",
            config.router.request_timeout_secs,
        ),
        ConfigField::new(
            "router.max_tool_rounds",
            "WAYPOINT_ROUTER_MAX_TOOL_ROUNDS",
            config.router.max_tool_rounds,
        ),
        ConfigField::new(
            "router.strict_registration",
            "WAYPOINT_ROUTER_STRICT_REGISTRATION",
            config.router.strict_registration,
        ),
        ConfigField::new("cache.enabled", "WAYPOINT_CACHE_ENABLED", config.cache.enabled),
        ConfigField::new("cache.capacity", "WAYPOINT_CACHE_CAPACITY", config.cache.capacity),
        ConfigField::new(
            "server.bind_address",
            "WAYPOINT_SERVER_BIND_ADDRESS",
            &config.server.bind_address,
        ),
        ConfigField::new("server.port", "WAYPOINT_SERVER_PORT", config.server.port),
        ConfigField::new("logging.level", "WAYPOINT_LOGGING_LEVEL", &config.logging.level),
        ConfigField::new(
            "logging.format",
            "WAYPOINT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["waypoint.toml", "config/waypoint.toml"].into_iter().map(PathBuf::from).find(|p| p.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the vendor prefix (`sk-`) so operators can tell keys apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) => format!("{prefix}-***"),
        None => "<redacted>".to_string(),
    }
}
