use std::env;
use std::fs;
use std::path::Path;

use menuguard_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{prepare, CommandResult};

struct Field {
    key: &'static str,
    /// File path when it differs from `key` (message overrides live flat in `[guardrails]`).
    file_key: Option<&'static str>,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, file_key: None, env_keys, value: value.into() }
    }

    fn from_file_key(mut self, file_key: &'static str) -> Self {
        self.file_key = Some(file_key);
        self
    }
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match prepare("config", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.file_key.unwrap_or(field.key),
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::raw(0, lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let embedding = &config.embedding;
    let llm = &config.llm;
    let guardrails = &config.guardrails;
    let messages = &guardrails.messages;

    let api_key = llm
        .api_key
        .as_ref()
        .map_or_else(|| "<unset>".to_string(), |key| redact_token(key.expose_secret()));
    let optional_path = |path: Option<&Path>| {
        path.map_or_else(|| "<unset>".to_string(), |path| path.display().to_string())
    };

    vec![
        Field::new(
            "embedding.provider",
            &["MENUGUARD_EMBEDDING_PROVIDER"],
            format!("{:?}", embedding.provider),
        ),
        Field::new("embedding.base_url", &["MENUGUARD_EMBEDDING_BASE_URL"], &embedding.base_url),
        Field::new("embedding.model", &["MENUGUARD_EMBEDDING_MODEL"], &embedding.model),
        Field::new(
            "embedding.dimensions",
            &["MENUGUARD_EMBEDDING_DIMENSIONS"],
            embedding.dimensions.to_string(),
        ),
        Field::new(
            "embedding.timeout_secs",
            &["MENUGUARD_EMBEDDING_TIMEOUT_SECS"],
            embedding.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", &["MENUGUARD_LLM_PROVIDER"], format!("{:?}", llm.provider)),
        Field::new(
            "llm.base_url",
            &["MENUGUARD_LLM_BASE_URL"],
            llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.model", &["MENUGUARD_LLM_MODEL"], &llm.model),
        Field::new("llm.api_key", &["MENUGUARD_LLM_API_KEY"], api_key),
        Field::new("llm.timeout_secs", &["MENUGUARD_LLM_TIMEOUT_SECS"], llm.timeout_secs.to_string()),
        Field::new(
            "guardrails.max_pair_distance",
            &["MENUGUARD_GUARDRAILS_MAX_PAIR_DISTANCE"],
            guardrails.max_pair_distance.to_string(),
        ),
        Field::new(
            "guardrails.history_turns",
            &["MENUGUARD_GUARDRAILS_HISTORY_TURNS"],
            guardrails.history_turns.to_string(),
        ),
        Field::new(
            "guardrails.event_log_path",
            &["MENUGUARD_GUARDRAILS_EVENT_LOG_PATH"],
            optional_path(guardrails.event_log_path.as_deref()),
        ),
        Field::new("guardrails.messages.refusal", &[], preview(&messages.refusal))
            .from_file_key("guardrails.refusal_message"),
        Field::new("guardrails.messages.clarification", &[], preview(&messages.clarification))
            .from_file_key("guardrails.clarification_message"),
        Field::new("guardrails.messages.safety", &[], preview(&messages.safety))
            .from_file_key("guardrails.safety_message"),
        Field::new("guardrails.messages.price_fallback", &[], preview(&messages.price_fallback))
            .from_file_key("guardrails.price_fallback_message"),
        Field::new("menu.path", &["MENUGUARD_MENU_PATH"], match &config.menu.path {
            Some(path) => path.display().to_string(),
            None => "<built-in sample>".to_string(),
        }),
        Field::new(
            "logging.level",
            &["MENUGUARD_LOGGING_LEVEL", "MENUGUARD_LOG_LEVEL"],
            &config.logging.level,
        ),
        Field::new(
            "logging.format",
            &["MENUGUARD_LOGGING_FORMAT", "MENUGUARD_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn preview(message: &str) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(40).collect();
    if chars.next().is_some() {
        format!("\"{head}...\"")
    } else {
        format!("\"{head}\"")
    }
}

/// Keeps a vendor prefix such as `sk-` so operators can tell keys apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
