use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use menuguard_core::config::{AppConfig, ConfigError, GuardrailsConfig, LoadOptions, MenuConfig};
use menuguard_core::domain::menu::MenuCatalog;
use menuguard_core::errors::DomainError;
use menuguard_core::events::{EventSink, FanoutEventSink, JsonLinesEventSink, TracingEventSink};
use menuguard_core::fixtures::sample_menu;
use menuguard_core::validation::price::PriceValidator;
use thiserror::Error;
use tracing::info;

use crate::embedding::{build_embedder, EmbeddingError};
use crate::guardrails::GuardrailManager;
use crate::llm::HttpLlmClient;
use crate::runtime::AgentRuntime;
use crate::topic::TopicClassifier;

pub struct Application {
    pub config: AppConfig,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not read menu file `{path}`: {source}")]
    MenuRead { path: PathBuf, source: std::io::Error },
    #[error("menu is invalid: {0}")]
    Menu(#[from] DomainError),
    #[error("embedding backend unavailable: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
}

/// The configured catalog, or the built-in sample menu when no path is set.
pub fn load_menu(config: &MenuConfig) -> Result<MenuCatalog, BootstrapError> {
    let Some(path) = &config.path else {
        return Ok(sample_menu());
    };
    let raw = fs::read_to_string(path)
        .map_err(|source| BootstrapError::MenuRead { path: path.clone(), source })?;
    Ok(MenuCatalog::from_toml_str(&raw)?)
}

/// Tracing always, plus a JSON-lines file when `event_log_path` is set.
pub fn build_event_sink(config: &GuardrailsConfig) -> Arc<dyn EventSink> {
    let mut sink = FanoutEventSink::default().with(Arc::new(TracingEventSink));
    if let Some(path) = &config.event_log_path {
        sink = sink.with(Arc::new(JsonLinesEventSink::new(path.clone())));
    }
    Arc::new(sink)
}

pub async fn build_guardrails(
    config: &AppConfig,
    sink: Arc<dyn EventSink>,
) -> Result<GuardrailManager, BootstrapError> {
    let menu = load_menu(&config.menu)?;
    let menu_source = config
        .menu
        .path
        .as_ref()
        .map_or_else(|| "sample".to_string(), |path| path.display().to_string());
    info!(
        event_name = "system.bootstrap.menu_loaded",
        correlation_id = "bootstrap",
        items = menu.len(),
        source = %menu_source,
        "menu catalog loaded"
    );

    let embedder = build_embedder(&config.embedding)?;
    let classifier = TopicClassifier::new(embedder).await?;
    info!(
        event_name = "system.bootstrap.classifier_ready",
        correlation_id = "bootstrap",
        provider = ?config.embedding.provider,
        prototypes = classifier.prototype_count(),
        "topic classifier ready"
    );

    Ok(GuardrailManager::new(Arc::new(menu), classifier, sink)
        .with_messages(config.guardrails.messages.clone())
        .with_price_validator(PriceValidator::new(config.guardrails.max_pair_distance)))
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let sink = build_event_sink(&config.guardrails);
    let guardrails = build_guardrails(&config, sink).await?;
    let llm = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::Llm(format!("{error:#}")))?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        provider = ?llm.provider(),
        model = llm.model(),
        "llm client configured"
    );

    let runtime = AgentRuntime::new(Arc::new(guardrails), Arc::new(llm))
        .with_history_turns(config.guardrails.history_turns);
    Ok(Application { config, runtime })
}
