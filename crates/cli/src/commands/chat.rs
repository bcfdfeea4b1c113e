use anyhow::{Context, Result};
use menuguard_agent::bootstrap::bootstrap_with_config;
use menuguard_agent::guardrails::GuardrailError;
use menuguard_agent::runtime::{AgentRuntime, ReplyDisposition};
use menuguard_core::config::LoadOptions;
use menuguard_core::domain::session::SessionId;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info};
use uuid::Uuid;

use crate::commands::{
    async_runtime, interface_error, prepare, CommandResult, EXIT_BOOTSTRAP, EXIT_RUNTIME,
};

const GREETING: &str =
    "Welcome! Ask me about the menu, prices, or allergens. Commands: /reset, /summary, /quit";
const TURN_FAILED: &str =
    "Sorry, I couldn't reach the kitchen assistant just now. Please try again.";

pub fn run(options: LoadOptions, session: Option<String>) -> CommandResult {
    let config = match prepare("chat", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let app = match runtime.block_on(bootstrap_with_config(config)) {
        Ok(app) => app,
        Err(error) => {
            return CommandResult::failure("chat", "bootstrap", error.to_string(), EXIT_BOOTSTRAP)
        }
    };

    let session_id = SessionId::new(session.unwrap_or_else(|| Uuid::new_v4().to_string()));
    let result = runtime.block_on(converse(
        &app.runtime,
        &session_id,
        BufReader::new(io::stdin()),
        io::stdout(),
    ));

    match result {
        Ok(()) => CommandResult::raw(0, ""),
        Err(error) => CommandResult::failure("chat", "io", format!("{error:#}"), EXIT_RUNTIME),
    }
}

/// Reads guest lines until EOF or `/quit`, writing one reply per line.
pub async fn converse<R, W>(
    runtime: &AgentRuntime,
    session_id: &SessionId,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(event_name = "chat.session.started", session_id = %session_id, "chat session started");
    write_line(&mut writer, GREETING).await?;

    let mut lines = reader.lines();
    loop {
        writer.write_all(b"> ").await.context("failed to write prompt")?;
        writer.flush().await.context("failed to flush prompt")?;

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/reset" => {
                runtime.reset(session_id).await;
                write_line(&mut writer, "Conversation reset. Allergy notes were cleared.").await?;
            }
            "/summary" => {
                let summary = runtime.summary(session_id).await;
                let rendered = format!(
                    "queries: {}, on topic: {}, off topic: {}, needed clarification: {}",
                    summary.total_queries, summary.on_topic, summary.off_topic, summary.clarify
                );
                write_line(&mut writer, &rendered).await?;
            }
            text => match runtime.handle_message(session_id, text).await {
                Ok(reply) => {
                    if reply.disposition == ReplyDisposition::Corrected {
                        info!(
                            event_name = "chat.reply.corrected",
                            session_id = %session_id,
                            "delivered a price-corrected reply"
                        );
                    }
                    write_line(&mut writer, &reply.text).await?;
                }
                Err(turn_error) => match turn_error.downcast::<GuardrailError>() {
                    Ok(failure) => {
                        let interface = interface_error("chat", failure);
                        let rendered = format!(
                            "{} (reference: {})",
                            interface.user_message(),
                            interface.correlation_id()
                        );
                        write_line(&mut writer, &rendered).await?;
                    }
                    Err(turn_error) => {
                        error!(
                            event_name = "chat.turn.failed",
                            session_id = %session_id,
                            error = %format!("{turn_error:#}"),
                            "chat turn failed"
                        );
                        write_line(&mut writer, TURN_FAILED).await?;
                    }
                },
            },
        }
    }

    runtime.end(session_id).await;
    info!(event_name = "chat.session.ended", session_id = %session_id, "chat session ended");
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<()> {
    writer.write_all(text.as_bytes()).await.context("failed to write reply")?;
    writer.write_all(b"\n").await.context("failed to write reply")?;
    writer.flush().await.context("failed to flush reply")
}
