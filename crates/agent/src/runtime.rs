use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use menuguard_core::domain::menu::MenuCatalog;
use menuguard_core::domain::session::SessionId;
use menuguard_core::domain::topic::TopicLabel;
use menuguard_core::validation::price::format_price;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::guardrails::{GuardrailError, GuardrailManager, InputOutcome, OutputOutcome};
use crate::llm::LlmClient;

pub const DEFAULT_HISTORY_TURNS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyDisposition {
    Delivered,
    Corrected,
    Refused,
    Clarification,
    Blocked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub text: String,
    pub disposition: ReplyDisposition,
}

impl TurnReply {
    fn new(text: impl Into<String>, disposition: ReplyDisposition) -> Self {
        Self { text: text.into(), disposition }
    }
}

/// Per-session tally of how inputs were labelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub total_queries: usize,
    pub on_topic: usize,
    pub off_topic: usize,
    pub clarify: usize,
}

impl ConversationSummary {
    fn record(&mut self, label: TopicLabel) {
        self.total_queries += 1;
        match label {
            TopicLabel::OnTopic => self.on_topic += 1,
            TopicLabel::OffTopic => self.off_topic += 1,
            TopicLabel::Clarify => self.clarify += 1,
        }
    }
}

#[derive(Clone, Debug)]
struct Exchange {
    guest: String,
    assistant: String,
}

#[derive(Default)]
struct Conversation {
    exchanges: VecDeque<Exchange>,
    summary: ConversationSummary,
}

/// One guarded turn per call: input check, model call, output check.
pub struct AgentRuntime {
    guardrails: Arc<GuardrailManager>,
    llm: Arc<dyn LlmClient>,
    history_turns: usize,
    conversations: Mutex<HashMap<SessionId, Conversation>>,
}

impl AgentRuntime {
    pub fn new(guardrails: Arc<GuardrailManager>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            guardrails,
            llm,
            history_turns: DEFAULT_HISTORY_TURNS,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_history_turns(mut self, history_turns: usize) -> Self {
        self.history_turns = history_turns;
        self
    }

    pub fn guardrails(&self) -> &GuardrailManager {
        &self.guardrails
    }

    pub async fn handle_message(&self, session_id: &SessionId, text: &str) -> Result<TurnReply> {
        let input = match self.guardrails.check_input(session_id, text).await {
            Ok(input) => input,
            Err(GuardrailError::Embedding(error)) => {
                warn!(
                    event_name = "runtime.embedding.failed",
                    session_id = %session_id,
                    error = %error,
                    "embedding failed, asking guest to rephrase"
                );
                return Ok(TurnReply::new(
                    self.guardrails.messages().clarification.clone(),
                    ReplyDisposition::Clarification,
                ));
            }
            Err(error) => return Err(error.into()),
        };

        self.conversation(session_id, |conversation| {
            conversation.summary.record(input.classification().label)
        })
        .await;

        match input {
            InputOutcome::Blocked { message, .. } => {
                return Ok(TurnReply::new(message, ReplyDisposition::Refused))
            }
            InputOutcome::Clarify { message, .. } => {
                return Ok(TurnReply::new(message, ReplyDisposition::Clarification))
            }
            InputOutcome::Passed { .. } => {}
        }

        let prompt = self.build_prompt(session_id, text).await;
        let generated = match self.llm.complete(&prompt).await {
            Ok(generated) => generated,
            Err(error) => {
                self.guardrails.abandon_turn(session_id).await?;
                return Err(error.context("language model completion failed"));
            }
        };

        let output = self
            .guardrails
            .check_output(session_id, &generated)
            .await
            .context("output guardrail check failed")?;

        let reply = match output {
            OutputOutcome::Blocked { message, .. } => {
                TurnReply::new(message, ReplyDisposition::Blocked)
            }
            OutputOutcome::Corrected { text: corrected, .. } => {
                TurnReply::new(corrected, ReplyDisposition::Corrected)
            }
            OutputOutcome::Passed { text: passed } => {
                TurnReply::new(passed, ReplyDisposition::Delivered)
            }
        };

        if reply.disposition != ReplyDisposition::Blocked {
            let history_turns = self.history_turns;
            let exchange = Exchange { guest: text.to_string(), assistant: reply.text.clone() };
            self.conversation(session_id, move |conversation| {
                conversation.exchanges.push_back(exchange);
                while conversation.exchanges.len() > history_turns {
                    conversation.exchanges.pop_front();
                }
            })
            .await;
        }

        info!(
            event_name = "runtime.turn.completed",
            session_id = %session_id,
            disposition = ?reply.disposition,
            "turn completed"
        );
        Ok(reply)
    }

    pub async fn summary(&self, session_id: &SessionId) -> ConversationSummary {
        self.conversations
            .lock()
            .await
            .get(session_id)
            .map(|conversation| conversation.summary)
            .unwrap_or_default()
    }

    /// Forgets history and allergen constraints but keeps the session id.
    pub async fn reset(&self, session_id: &SessionId) {
        self.conversations.lock().await.remove(session_id);
        self.guardrails.reset_session(session_id).await;
    }

    pub async fn end(&self, session_id: &SessionId) {
        self.conversations.lock().await.remove(session_id);
        self.guardrails.end_session(session_id).await;
    }

    async fn conversation<F>(&self, session_id: &SessionId, update: F)
    where
        F: FnOnce(&mut Conversation),
    {
        let mut conversations = self.conversations.lock().await;
        update(conversations.entry(session_id.clone()).or_default());
    }

    async fn build_prompt(&self, session_id: &SessionId, text: &str) -> String {
        let mut prompt = system_prompt(self.guardrails.menu());
        let conversations = self.conversations.lock().await;
        if let Some(conversation) = conversations.get(session_id) {
            for exchange in &conversation.exchanges {
                let _ = write!(
                    prompt,
                    "\nGuest: {}\nAssistant: {}\n",
                    exchange.guest, exchange.assistant
                );
            }
        }
        let _ = write!(prompt, "\nGuest: {text}\nAssistant:");
        prompt
    }
}

pub fn system_prompt(menu: &MenuCatalog) -> String {
    let mut prompt = String::from(
        "You are a helpful restaurant ordering assistant. Help guests choose from the menu \
         below.\n\nRules:\n\
         1. Only recommend items that are on the menu.\n\
         2. Always state prices exactly as listed.\n\
         3. Take allergies and dietary restrictions seriously and give accurate allergen \
         information.\n\
         4. Keep replies short, one to three sentences, with the most important facts first.\n\
         5. Answer yes/no questions directly before explaining.\n\nMENU:\n",
    );

    for item in menu.items() {
        let allergens = if item.allergens.is_empty() {
            "none".to_string()
        } else {
            item.allergens.iter().map(|allergen| allergen.as_str()).collect::<Vec<_>>().join(", ")
        };
        let _ = writeln!(
            prompt,
            "- {} (${}) [{}] allergens: {}",
            item.name,
            format_price(item.price),
            item.category,
            allergens
        );
    }
    prompt
}
