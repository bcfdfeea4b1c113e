use std::fs::OpenOptions;

use menuguard_agent::bootstrap::load_menu;
use menuguard_agent::embedding::build_embedder;
use menuguard_agent::llm::HttpLlmClient;
use menuguard_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use crate::commands::{async_runtime, to_json, CommandResult, EXIT_CHECKS_FAILED};
use crate::logging::init_logging;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CHECK_NAMES: [&str; 4] = ["menu_catalog", "embedding_backend", "llm_client", "event_log"];

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CHECKS_FAILED };

    if json_output {
        return CommandResult::raw(exit_code, to_json("doctor", &report));
    }
    CommandResult::raw(exit_code, render_human(&report))
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            init_logging(&config);
            checks
                .push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_menu(&config));
            checks.push(check_embedding(&config));
            checks.push(check_llm(&config));
            checks.push(check_event_log(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(CHECK_NAMES.into_iter().map(|name| {
                DoctorCheck::skipped(name, "skipped because configuration did not load")
            }));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { command: "doctor", overall_status, summary, checks }
}

fn check_menu(config: &AppConfig) -> DoctorCheck {
    match load_menu(&config.menu) {
        Ok(menu) => DoctorCheck::pass("menu_catalog", format!("{} items loaded", menu.len())),
        Err(error) => DoctorCheck::fail("menu_catalog", error.to_string()),
    }
}

/// Embeds one probe sentence, which reaches the backend for remote providers.
fn check_embedding(config: &AppConfig) -> DoctorCheck {
    let runtime = match async_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(_) => {
            return DoctorCheck::fail("embedding_backend", "failed to initialize async runtime")
        }
    };

    let result = runtime.block_on(async {
        let embedder = build_embedder(&config.embedding).map_err(|error| error.to_string())?;
        embedder.embed("What is on the menu?").await.map_err(|error| error.to_string())
    });

    match result {
        Ok(vector) if vector.iter().any(|value| *value != 0.0) => DoctorCheck::pass(
            "embedding_backend",
            format!(
                "{:?} returned a {}-dimensional vector",
                config.embedding.provider,
                vector.len()
            ),
        ),
        Ok(_) => DoctorCheck::fail("embedding_backend", "probe sentence embedded to a zero vector"),
        Err(error) => DoctorCheck::fail("embedding_backend", error),
    }
}

/// Only validates the client settings; no completion is requested.
fn check_llm(config: &AppConfig) -> DoctorCheck {
    match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck::pass(
            "llm_client",
            format!(
                "{:?} model `{}` at {}",
                client.provider(),
                client.model(),
                config.llm.base_url.as_deref().unwrap_or("<unset>")
            ),
        ),
        Err(error) => DoctorCheck::fail("llm_client", format!("{error:#}")),
    }
}

fn check_event_log(config: &AppConfig) -> DoctorCheck {
    let Some(path) = &config.guardrails.event_log_path else {
        return DoctorCheck::skipped("event_log", "no event log path configured");
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(error) = std::fs::create_dir_all(parent) {
            return DoctorCheck::fail(
                "event_log",
                format!("cannot create `{}`: {error}", parent.display()),
            );
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(_) => DoctorCheck::pass("event_log", format!("`{}` is writable", path.display())),
        Err(error) => {
            DoctorCheck::fail("event_log", format!("cannot open `{}`: {error}", path.display()))
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
