use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub router: RouterConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ToolsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub call_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub request_timeout_secs: u64,
    pub max_tool_rounds: u32,
    pub general_handler: String,
    pub high_confidence: f64,
    pub low_confidence: f64,
    pub strict_registration: bool,
    pub max_context_turns: usize,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub tools_enabled: Option<bool>,
    pub tools_base_url: Option<String>,
    pub cache_capacity: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 20,
                temperature: 0.2,
                max_tokens: 1024,
            },
            tools: ToolsConfig {
                enabled: true,
                base_url: "http://127.0.0.1:8001".to_string(),
                call_timeout_ms: 2_000,
                max_attempts: 3,
                retry_base_delay_ms: 200,
                retry_max_delay_ms: 1_000,
            },
            router: RouterConfig {
                request_timeout_secs: 30,
                max_tool_rounds: 3,
                general_handler: "general".to_string(),
                high_confidence: 0.7,
                low_confidence: 0.4,
                strict_registration: false,
                max_context_turns: 10,
            },
            cache: CacheConfig { enabled: true, capacity: 10 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl ToolsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay slept before retry number `attempt` (zero based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        retry_backoff(self.retry_base_delay_ms, self.retry_max_delay_ms, attempt)
    }

    /// Longest a single tool invocation can take across all attempts.
    pub fn worst_case_call(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let mut total = self.call_timeout() * attempts;
        for retry in 0..attempts.saturating_sub(1) {
            total += self.backoff(retry);
        }
        total
    }
}

impl RouterConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("waypoint.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Tool rounds run their calls concurrently, so one round costs at most
    /// one worst-case call.
    pub fn worst_case_tool_loop(&self) -> Duration {
        self.tools.worst_case_call() * self.router.max_tool_rounds
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(enabled) = tools.enabled {
                self.tools.enabled = enabled;
            }
            if let Some(base_url) = tools.base_url {
                self.tools.base_url = base_url;
            }
            if let Some(call_timeout_ms) = tools.call_timeout_ms {
                self.tools.call_timeout_ms = call_timeout_ms;
            }
            if let Some(max_attempts) = tools.max_attempts {
                self.tools.max_attempts = max_attempts;
            }
            if let Some(retry_base_delay_ms) = tools.retry_base_delay_ms {
                self.tools.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_max_delay_ms) = tools.retry_max_delay_ms {
                self.tools.retry_max_delay_ms = retry_max_delay_ms;
            }
        }

        if let Some(router) = patch.router {
            if let Some(request_timeout_secs) = router.request_timeout_secs {
                self.router.request_timeout_secs = request_timeout_secs;
            }
            if let Some(max_tool_rounds) = router.max_tool_rounds {
                self.router.max_tool_rounds = max_tool_rounds;
            }
            if let Some(general_handler) = router.general_handler {
                self.router.general_handler = general_handler;
            }
            if let Some(high_confidence) = router.high_confidence {
                self.router.high_confidence = high_confidence;
            }
            if let Some(low_confidence) = router.low_confidence {
                self.router.low_confidence = low_confidence;
            }
            if let Some(strict_registration) = router.strict_registration {
                self.router.strict_registration = strict_registration;
            }
            if let Some(max_context_turns) = router.max_context_turns {
                self.router.max_context_turns = max_context_turns;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
            if let Some(capacity) = cache.capacity {
                self.cache.capacity = capacity;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WAYPOINT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WAYPOINT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("WAYPOINT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("WAYPOINT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("WAYPOINT_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_TOOLS_ENABLED") {
            self.tools.enabled = parse_bool("WAYPOINT_TOOLS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_TOOLS_BASE_URL") {
            self.tools.base_url = value;
        }
        if let Some(value) = read_env("WAYPOINT_TOOLS_CALL_TIMEOUT_MS") {
            self.tools.call_timeout_ms = parse_u64("WAYPOINT_TOOLS_CALL_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_TOOLS_MAX_ATTEMPTS") {
            self.tools.max_attempts = parse_u32("WAYPOINT_TOOLS_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_ROUTER_REQUEST_TIMEOUT_SECS") {
            self.router.request_timeout_secs =
                parse_u64("WAYPOINT_ROUTER_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_ROUTER_MAX_TOOL_ROUNDS") {
            self.router.max_tool_rounds = parse_u32("WAYPOINT_ROUTER_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_ROUTER_STRICT_REGISTRATION") {
            self.router.strict_registration =
                parse_bool("WAYPOINT_ROUTER_STRICT_REGISTRATION", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("WAYPOINT_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_CACHE_CAPACITY") {
            self.cache.capacity = parse_usize("WAYPOINT_CACHE_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("WAYPOINT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("WAYPOINT_SERVER_PORT") {
            self.server.port = parse_u16("WAYPOINT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("WAYPOINT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("WAYPOINT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("WAYPOINT_LOGGING_LEVEL").or_else(|| read_env("WAYPOINT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WAYPOINT_LOGGING_FORMAT").or_else(|| read_env("WAYPOINT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(tools_enabled) = overrides.tools_enabled {
            self.tools.enabled = tools_enabled;
        }
        if let Some(tools_base_url) = overrides.tools_base_url {
            self.tools.base_url = tools_base_url;
        }
        if let Some(cache_capacity) = overrides.cache_capacity {
            self.cache.capacity = cache_capacity;
        }
        if let Some(request_timeout_secs) = overrides.request_timeout_secs {
            self.router.request_timeout_secs = request_timeout_secs;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_tools(&self.tools)?;
        validate_router(&self.router)?;
        validate_cache(&self.cache)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;

        if self.tools.enabled {
            let worst_case = self.worst_case_tool_loop();
            if self.router.request_timeout() <= worst_case {
                return Err(ConfigError::Validation(format!(
                    "router.request_timeout_secs ({}s) must exceed the worst-case tool loop ({} ms = \
                     max_tool_rounds x attempts x call_timeout plus backoff)",
                    self.router.request_timeout_secs,
                    worst_case.as_millis()
                )));
            }
        }

        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("waypoint.toml"), PathBuf::from("config/waypoint.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation("llm.max_tokens must be greater than zero".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_tools(tools: &ToolsConfig) -> Result<(), ConfigError> {
    if !tools.enabled {
        return Ok(());
    }
    if !tools.base_url.starts_with("http://") && !tools.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "tools.base_url must start with http:// or https://".to_string(),
        ));
    }
    if tools.call_timeout_ms == 0 || tools.call_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "tools.call_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }
    if tools.max_attempts == 0 || tools.max_attempts > 5 {
        return Err(ConfigError::Validation(
            "tools.max_attempts must be in range 1..=5".to_string(),
        ));
    }
    if tools.retry_base_delay_ms > tools.retry_max_delay_ms {
        return Err(ConfigError::Validation(
            "tools.retry_base_delay_ms must not exceed tools.retry_max_delay_ms".to_string(),
        ));
    }
    Ok(())
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.request_timeout_secs == 0 || router.request_timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "router.request_timeout_secs must be in range 1..=600".to_string(),
        ));
    }
    if router.max_tool_rounds == 0 || router.max_tool_rounds > 10 {
        return Err(ConfigError::Validation(
            "router.max_tool_rounds must be in range 1..=10".to_string(),
        ));
    }
    if router.general_handler.trim().is_empty() {
        return Err(ConfigError::Validation(
            "router.general_handler must name the fallback handler".to_string(),
        ));
    }
    let thresholds_ok = (0.0..=1.0).contains(&router.low_confidence)
        && (0.0..=1.0).contains(&router.high_confidence)
        && router.low_confidence < router.high_confidence;
    if !thresholds_ok {
        return Err(ConfigError::Validation(
            "router confidence thresholds must satisfy 0 <= low_confidence < high_confidence <= 1"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.capacity == 0 {
        return Err(ConfigError::Validation(
            "cache.capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    tools: Option<ToolsPatch>,
    router: Option<RouterPatch>,
    cache: Option<CachePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    call_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    request_timeout_secs: Option<u64>,
    max_tool_rounds: Option<u32>,
    general_handler: Option<String>,
    high_confidence: Option<f64>,
    low_confidence: Option<f64>,
    strict_registration: Option<bool>,
    max_context_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    enabled: Option<bool>,
    capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// `base_ms` doubled `attempt` times, capped at `max_ms`.
pub fn retry_backoff(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.min(16);
    Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
}
