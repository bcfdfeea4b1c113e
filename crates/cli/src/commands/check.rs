use std::collections::BTreeSet;
use std::sync::Arc;

use menuguard_agent::bootstrap::{build_event_sink, build_guardrails};
use menuguard_agent::guardrails::{GuardrailError, GuardrailManager, InputOutcome, OutputOutcome};
use menuguard_core::config::LoadOptions;
use menuguard_core::domain::allergen::Allergen;
use menuguard_core::domain::session::{SessionId, TurnState};
use menuguard_core::domain::topic::TopicLabel;
use menuguard_core::events::{FanoutEventSink, GuardrailEvent, InMemoryEventSink};
use serde::Serialize;

use crate::commands::{
    async_runtime, interface_error, interface_failure, prepare, to_json, CommandResult,
    EXIT_BOOTSTRAP,
};

#[derive(Debug, Serialize)]
struct CheckReport {
    command: &'static str,
    status: &'static str,
    session_id: String,
    input: InputReport,
    output: Option<OutputReport>,
    events: Vec<GuardrailEvent>,
}

#[derive(Debug, Serialize)]
struct InputReport {
    label: TopicLabel,
    similarity_score: f32,
    state: TurnState,
    reply: Option<String>,
    constraints: BTreeSet<Allergen>,
}

#[derive(Debug, Serialize)]
struct OutputReport {
    state: TurnState,
    text: String,
    corrections: usize,
}

pub fn run(
    options: LoadOptions,
    session_id: &str,
    input: &str,
    output: Option<&str>,
) -> CommandResult {
    let config = match prepare("check", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("check") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let recorded = InMemoryEventSink::default();
    let sink = FanoutEventSink::default()
        .with(build_event_sink(&config.guardrails))
        .with(Arc::new(recorded.clone()));

    let manager = match runtime.block_on(build_guardrails(&config, Arc::new(sink))) {
        Ok(manager) => manager,
        Err(error) => {
            return CommandResult::failure("check", "bootstrap", error.to_string(), EXIT_BOOTSTRAP)
        }
    };

    let session_id = SessionId::new(session_id);
    let result = runtime.block_on(check_turn(&manager, &session_id, input, output));
    match result {
        Ok((input, output)) => {
            let report = CheckReport {
                command: "check",
                status: "ok",
                session_id: session_id.to_string(),
                input,
                output,
                events: recorded.events(),
            };
            CommandResult::raw(0, to_json("check", &report))
        }
        Err(error) => interface_failure("check", &interface_error("check", error)),
    }
}

async fn check_turn(
    manager: &GuardrailManager,
    session_id: &SessionId,
    input: &str,
    output: Option<&str>,
) -> Result<(InputReport, Option<OutputReport>), GuardrailError> {
    let outcome = manager.check_input(session_id, input).await?;
    let classification = outcome.classification();
    let constraints = match &outcome {
        InputOutcome::Passed { constraints, .. } => constraints.clone(),
        InputOutcome::Blocked { .. } | InputOutcome::Clarify { .. } => manager
            .session(session_id)
            .await
            .map(|session| session.constraints)
            .unwrap_or_default(),
    };
    let input_report = InputReport {
        label: classification.label,
        similarity_score: classification.score,
        state: outcome.state(),
        reply: outcome.reply().map(str::to_string),
        constraints,
    };

    // A reply is only validated for a turn whose input passed.
    let Some(generated) = output.filter(|_| outcome.is_passed()) else {
        return Ok((input_report, None));
    };

    let checked = manager.check_output(session_id, generated).await?;
    let corrections = match &checked {
        OutputOutcome::Corrected { corrections, .. } => corrections.len(),
        OutputOutcome::Blocked { .. } | OutputOutcome::Passed { .. } => 0,
    };
    let output_report =
        OutputReport { state: checked.state(), text: checked.text().to_string(), corrections };
    Ok((input_report, Some(output_report)))
}
