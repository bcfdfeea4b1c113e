pub mod chat;
pub mod check;
pub mod config;
pub mod doctor;
pub mod menu;

use menuguard_agent::guardrails::GuardrailError;
use menuguard_core::config::{AppConfig, LoadOptions};
use menuguard_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::error;
use uuid::Uuid;

use crate::logging::init_logging;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_BOOTSTRAP: u8 = 3;
pub const EXIT_RUNTIME: u8 = 4;
pub const EXIT_CHECKS_FAILED: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Plain output that is not wrapped in the status envelope.
    pub fn raw(exit_code: u8, output: impl Into<String>) -> Self {
        Self { exit_code, output: output.into() }
    }
}

/// Loads config and installs logging, or returns the failure to print.
pub(crate) fn prepare(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    let config = AppConfig::load(options).map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
    })?;
    init_logging(&config);
    Ok(config)
}

pub(crate) fn async_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

/// Logs the full guardrail failure under a fresh correlation id and returns
/// the user-safe form of it.
pub(crate) fn interface_error(command: &str, failure: GuardrailError) -> InterfaceError {
    let correlation_id = Uuid::new_v4().to_string();
    error!(
        event_name = "cli.guardrail.failed",
        command,
        correlation_id = %correlation_id,
        error = %failure,
        "guardrail check failed"
    );
    ApplicationError::from(failure).into_interface(correlation_id)
}

pub(crate) fn interface_failure(command: &str, interface: &InterfaceError) -> CommandResult {
    CommandResult::failure(
        command,
        interface.error_class(),
        format!("{} (correlation id: {})", interface.user_message(), interface.correlation_id()),
        EXIT_RUNTIME,
    )
}

pub(crate) fn to_json<T: Serialize>(command: &str, report: &T) -> String {
    serde_json::to_string(report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"{command}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            escape_json(&error.to_string())
        )
    })
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
