use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["menuguard.toml", "config/menuguard.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub guardrails: GuardrailsConfig,
    pub menu: MenuConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GuardrailsConfig {
    pub max_pair_distance: usize,
    pub history_turns: usize,
    pub event_log_path: Option<PathBuf>,
    pub messages: GuardrailMessages,
}

/// Fixed replies shown in place of a blocked turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailMessages {
    pub refusal: String,
    pub clarification: String,
    pub safety: String,
    pub price_fallback: String,
}

impl Default for GuardrailMessages {
    fn default() -> Self {
        Self {
            refusal: "I'm sorry, but I can only help you with menu ordering and food-related \
                      questions. How can I help you with the menu today?"
                .to_string(),
            clarification: "Could you please be more specific about what you'd like to order \
                            or know about the menu?"
                .to_string(),
            safety: "I apologize, but I need to verify my information for your safety. That \
                     suggestion contains a known allergen. What else would you like to know?"
                .to_string(),
            price_fallback: "I apologize, but I'm not confident in the accuracy of my response \
                             regarding prices or details. Please let me double-check the menu."
                .to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MenuConfig {
    /// TOML catalog; the built-in sample menu is used when unset.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    Hashing,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
    OpenAiCompatible,
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
    pub menu_path: Option<PathBuf>,
    pub embedding_provider: Option<EmbeddingProvider>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub event_log_path: Option<PathBuf>,
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
            embedding: EmbeddingConfig {
                provider: EmbeddingProvider::Hashing,
                base_url: "http://localhost:11434".to_string(),
                model: "nomic-embed-text".to_string(),
                dimensions: 512,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.2".to_string(),
                timeout_secs: 60,
            },
            guardrails: GuardrailsConfig {
                max_pair_distance: 50,
                history_turns: 6,
                event_log_path: None,
                messages: GuardrailMessages::default(),
            },
            menu: MenuConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported embedding provider `{other}` (expected hashing|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ollama" => Ok(Self::Ollama),
            "open_ai_compatible" | "openai_compatible" | "openai" => Ok(Self::OpenAiCompatible),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected ollama|open_ai_compatible)"
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(embedding) = patch.embedding {
            if let Some(provider) = embedding.provider {
                self.embedding.provider = provider;
            }
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = base_url;
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                self.embedding.dimensions = dimensions;
            }
            if let Some(timeout_secs) = embedding.timeout_secs {
                self.embedding.timeout_secs = timeout_secs;
            }
        }

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
        }

        if let Some(guardrails) = patch.guardrails {
            if let Some(max_pair_distance) = guardrails.max_pair_distance {
                self.guardrails.max_pair_distance = max_pair_distance;
            }
            if let Some(history_turns) = guardrails.history_turns {
                self.guardrails.history_turns = history_turns;
            }
            if let Some(event_log_path) = guardrails.event_log_path {
                self.guardrails.event_log_path = Some(event_log_path);
            }
            let messages = &mut self.guardrails.messages;
            if let Some(refusal) = guardrails.refusal_message {
                messages.refusal = refusal;
            }
            if let Some(clarification) = guardrails.clarification_message {
                messages.clarification = clarification;
            }
            if let Some(safety) = guardrails.safety_message {
                messages.safety = safety;
            }
            if let Some(price_fallback) = guardrails.price_fallback_message {
                messages.price_fallback = price_fallback;
            }
        }

        if let Some(menu) = patch.menu {
            if let Some(path) = menu.path {
                self.menu.path = Some(path);
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
        if let Some(value) = read_env("MENUGUARD_EMBEDDING_PROVIDER") {
            self.embedding.provider = value.parse()?;
        }
        if let Some(value) = read_env("MENUGUARD_EMBEDDING_BASE_URL") {
            self.embedding.base_url = value;
        }
        if let Some(value) = read_env("MENUGUARD_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = read_env("MENUGUARD_EMBEDDING_DIMENSIONS") {
            self.embedding.dimensions = parse_usize("MENUGUARD_EMBEDDING_DIMENSIONS", &value)?;
        }
        if let Some(value) = read_env("MENUGUARD_EMBEDDING_TIMEOUT_SECS") {
            self.embedding.timeout_secs = parse_u64("MENUGUARD_EMBEDDING_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MENUGUARD_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("MENUGUARD_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MENUGUARD_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MENUGUARD_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MENUGUARD_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MENUGUARD_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MENUGUARD_GUARDRAILS_MAX_PAIR_DISTANCE") {
            self.guardrails.max_pair_distance =
                parse_usize("MENUGUARD_GUARDRAILS_MAX_PAIR_DISTANCE", &value)?;
        }
        if let Some(value) = read_env("MENUGUARD_GUARDRAILS_HISTORY_TURNS") {
            self.guardrails.history_turns =
                parse_usize("MENUGUARD_GUARDRAILS_HISTORY_TURNS", &value)?;
        }
        if let Some(value) = read_env("MENUGUARD_GUARDRAILS_EVENT_LOG_PATH") {
            self.guardrails.event_log_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("MENUGUARD_MENU_PATH") {
            self.menu.path = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("MENUGUARD_LOGGING_LEVEL").or_else(|| read_env("MENUGUARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MENUGUARD_LOGGING_FORMAT").or_else(|| read_env("MENUGUARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(menu_path) = overrides.menu_path {
            self.menu.path = Some(menu_path);
        }
        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(event_log_path) = overrides.event_log_path {
            self.guardrails.event_log_path = Some(event_log_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_embedding(&self.embedding)?;
        validate_llm(&self.llm)?;
        validate_guardrails(&self.guardrails)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The file `load` would read for `explicit_path`, if any exists.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
    }
}

fn validate_embedding(embedding: &EmbeddingConfig) -> Result<(), ConfigError> {
    if !(16..=8192).contains(&embedding.dimensions) {
        return Err(ConfigError::Validation(
            "embedding.dimensions must be in range 16..=8192".to_string(),
        ));
    }

    if embedding.timeout_secs == 0 || embedding.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "embedding.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if embedding.provider == EmbeddingProvider::Ollama {
        validate_http_url("embedding.base_url", &embedding.base_url)?;
        if embedding.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "embedding.model is required for ollama provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.base_url.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(base_url) => validate_http_url("llm.base_url", base_url)?,
        None => {
            return Err(ConfigError::Validation(
                "llm.base_url is required for ollama and open_ai_compatible providers".to_string(),
            ))
        }
    }

    if let Some(api_key) = &llm.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_guardrails(guardrails: &GuardrailsConfig) -> Result<(), ConfigError> {
    if guardrails.max_pair_distance == 0 || guardrails.max_pair_distance > 500 {
        return Err(ConfigError::Validation(
            "guardrails.max_pair_distance must be in range 1..=500".to_string(),
        ));
    }

    if guardrails.history_turns > 50 {
        return Err(ConfigError::Validation(
            "guardrails.history_turns must be at most 50".to_string(),
        ));
    }

    let messages = &guardrails.messages;
    let blank = [
        ("guardrails.refusal_message", &messages.refusal),
        ("guardrails.clarification_message", &messages.clarification),
        ("guardrails.safety_message", &messages.safety),
        ("guardrails.price_fallback_message", &messages.price_fallback),
    ]
    .into_iter()
    .find(|(_, message)| message.trim().is_empty());
    if let Some((field, _)) = blank {
        return Err(ConfigError::Validation(format!("{field} must not be empty")));
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    embedding: Option<EmbeddingPatch>,
    llm: Option<LlmPatch>,
    guardrails: Option<GuardrailsPatch>,
    menu: Option<MenuPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    provider: Option<EmbeddingProvider>,
    base_url: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailsPatch {
    max_pair_distance: Option<usize>,
    history_turns: Option<usize>,
    event_log_path: Option<PathBuf>,
    refusal_message: Option<String>,
    clarification_message: Option<String>,
    safety_message: Option<String>,
    price_fallback_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MenuPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, EmbeddingProvider, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_offline() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.embedding.provider == EmbeddingProvider::Hashing,
            "default embedder should need no network",
        )?;
        ensure(config.guardrails.max_pair_distance == 50, "default pairing distance is 50")?;
        ensure(config.guardrails.history_turns == 6, "default history window is 6 turns")?;
        ensure(config.menu.path.is_none(), "sample menu is used by default")?;
        ensure(
            config.guardrails.messages.refusal.starts_with("I'm sorry, but I can only help"),
            "default refusal message should be set",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_MENUGUARD_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("menuguard.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai_compatible"
base_url = "https://llm.example.test"
api_key = "${TEST_MENUGUARD_LLM_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.provider == LlmProvider::OpenAiCompatible,
                "provider should be read from file",
            )?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_MENUGUARD_LLM_KEY"]);
        result
    }

    #[test]
    fn guardrail_messages_can_be_overridden_from_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("menuguard.toml");
        fs::write(
            &path,
            r#"
[guardrails]
max_pair_distance = 80
refusal_message = "Menu questions only, please."
event_log_path = "logs/guardrails.log"

[menu]
path = "menus/dinner.toml"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.guardrails.max_pair_distance == 80, "pair distance should come from file")?;
        ensure(
            config.guardrails.messages.refusal == "Menu questions only, please.",
            "refusal message should come from file",
        )?;
        ensure(
            config.guardrails.messages.clarification.starts_with("Could you please"),
            "unset messages keep their defaults",
        )?;
        ensure(
            config.guardrails.event_log_path == Some(PathBuf::from("logs/guardrails.log")),
            "event log path should come from file",
        )?;
        ensure(
            config.menu.path == Some(PathBuf::from("menus/dinner.toml")),
            "menu path should come from file",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MENUGUARD_LOG_LEVEL", "warn");
        env::set_var("MENUGUARD_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["MENUGUARD_LOG_LEVEL", "MENUGUARD_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MENUGUARD_LLM_MODEL", "model-from-env");
        env::set_var("MENUGUARD_MENU_PATH", "menu-from-env.toml");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("menuguard.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"

[menu]
path = "menu-from-file.toml"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    menu_path: Some(PathBuf::from("menu-from-override.toml")),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.menu.path == Some(PathBuf::from("menu-from-override.toml")),
                "override menu path should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            Ok(())
        })();

        clear_vars(&["MENUGUARD_LLM_MODEL", "MENUGUARD_MENU_PATH"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MENUGUARD_GUARDRAILS_MAX_PAIR_DISTANCE", "fifty");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "MENUGUARD_GUARDRAILS_MAX_PAIR_DISTANCE"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["MENUGUARD_GUARDRAILS_MAX_PAIR_DISTANCE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MENUGUARD_EMBEDDING_PROVIDER", "ollama");
        env::set_var("MENUGUARD_EMBEDDING_BASE_URL", "localhost:11434");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("embedding.base_url")
            );
            ensure(has_message, "validation failure should mention embedding.base_url")
        })();

        clear_vars(&["MENUGUARD_EMBEDDING_PROVIDER", "MENUGUARD_EMBEDDING_BASE_URL"]);
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");
        let result = AppConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(ref missing)) if *missing == path),
            "missing file should be reported with its path",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MENUGUARD_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["MENUGUARD_LLM_API_KEY"]);
        result
    }
}
