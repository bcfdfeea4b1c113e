use std::collections::BTreeSet;
use std::sync::Arc;

use menuguard_core::config::GuardrailMessages;
use menuguard_core::domain::allergen::Allergen;
use menuguard_core::domain::menu::MenuCatalog;
use menuguard_core::domain::session::{Session, SessionId, TurnState};
use menuguard_core::domain::topic::{ClassificationResult, TopicLabel};
use menuguard_core::errors::{ApplicationError, DomainError};
use menuguard_core::events::{EventPayload, EventSink, GuardrailEvent};
use menuguard_core::validation::allergen::{AllergenValidator, AllergenVerdict, AllergenViolation};
use menuguard_core::validation::constraints::ConstraintTracker;
use menuguard_core::validation::price::{AmbiguousPrice, PriceFinding, PriceValidator};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingError;
use crate::sessions::SessionStore;
use crate::topic::TopicClassifier;

#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("unknown session `{0}`")]
    UnknownSession(SessionId),
}

impl From<GuardrailError> for ApplicationError {
    fn from(value: GuardrailError) -> Self {
        match value {
            GuardrailError::Embedding(error) => Self::Integration(error.to_string()),
            GuardrailError::Domain(error) => Self::Domain(error),
            GuardrailError::UnknownSession(id) => Self::SessionNotFound(id.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputOutcome {
    Blocked { message: String, classification: ClassificationResult },
    Clarify { message: String, classification: ClassificationResult },
    Passed {
        classification: ClassificationResult,
        /// Tags this utterance added to the session.
        new_constraints: BTreeSet<Allergen>,
        constraints: BTreeSet<Allergen>,
    },
}

impl InputOutcome {
    pub fn state(&self) -> TurnState {
        match self {
            Self::Blocked { .. } => TurnState::BlockedOffTopic,
            Self::Clarify { .. } => TurnState::NeedsClarification,
            Self::Passed { .. } => TurnState::AwaitingOutput,
        }
    }

    pub fn classification(&self) -> ClassificationResult {
        match self {
            Self::Blocked { classification, .. }
            | Self::Clarify { classification, .. }
            | Self::Passed { classification, .. } => *classification,
        }
    }

    /// The fixed reply to show instead of calling the model, if any.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Blocked { message, .. } | Self::Clarify { message, .. } => Some(message),
            Self::Passed { .. } => None,
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlockReason {
    Allergen(Vec<AllergenViolation>),
    PriceAmbiguity(Vec<AmbiguousPrice>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OutputOutcome {
    Blocked { message: String, reason: BlockReason },
    Corrected { text: String, corrections: Vec<PriceFinding> },
    Passed { text: String },
}

impl OutputOutcome {
    pub fn state(&self) -> TurnState {
        match self {
            Self::Blocked { .. } => TurnState::BlockedUnsafe,
            Self::Corrected { .. } => TurnState::CorrectedOutput,
            Self::Passed { .. } => TurnState::Passed,
        }
    }

    /// Text safe to deliver to the guest.
    pub fn text(&self) -> &str {
        match self {
            Self::Blocked { message, .. } => message,
            Self::Corrected { text, .. } | Self::Passed { text } => text,
        }
    }
}

/// Runs the input and output checks for every session and reports what it
/// blocked or rewrote to an [`EventSink`].
pub struct GuardrailManager {
    menu: Arc<MenuCatalog>,
    classifier: TopicClassifier,
    tracker: ConstraintTracker,
    price_validator: PriceValidator,
    allergen_validator: AllergenValidator,
    sessions: SessionStore,
    sink: Arc<dyn EventSink>,
    messages: GuardrailMessages,
}

impl GuardrailManager {
    pub fn new(
        menu: Arc<MenuCatalog>,
        classifier: TopicClassifier,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            menu,
            classifier,
            tracker: ConstraintTracker::new(),
            price_validator: PriceValidator::default(),
            allergen_validator: AllergenValidator::new(),
            sessions: SessionStore::new(),
            sink,
            messages: GuardrailMessages::default(),
        }
    }

    pub fn with_messages(mut self, messages: GuardrailMessages) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_price_validator(mut self, price_validator: PriceValidator) -> Self {
        self.price_validator = price_validator;
        self
    }

    pub fn menu(&self) -> &MenuCatalog {
        &self.menu
    }

    pub fn messages(&self) -> &GuardrailMessages {
        &self.messages
    }

    pub async fn check_input(
        &self,
        session_id: &SessionId,
        utterance: &str,
    ) -> Result<InputOutcome, GuardrailError> {
        let turn_id = Uuid::new_v4().to_string();
        let classification = self.classifier.classify(utterance).await?;

        let (handle, created) = self.sessions.get_or_create(session_id).await;
        if created {
            info!(
                event_name = "guardrail.session.created",
                session_id = %session_id,
                "guardrail session created"
            );
        }
        let mut session = handle.lock().await;

        match classification.label {
            TopicLabel::OffTopic => {
                session.conclude(TurnState::BlockedOffTopic)?;
                drop(session);
                info!(
                    event_name = "guardrail.input.blocked",
                    session_id = %session_id,
                    correlation_id = %turn_id,
                    similarity_score = classification.score,
                    "input blocked as off topic"
                );
                self.sink.emit(GuardrailEvent::new(
                    session_id.clone(),
                    turn_id,
                    EventPayload::off_topic(classification.label, classification.score, utterance),
                ));
                Ok(InputOutcome::Blocked { message: self.messages.refusal.clone(), classification })
            }
            TopicLabel::Clarify => {
                session.conclude(TurnState::NeedsClarification)?;
                debug!(
                    event_name = "guardrail.input.clarify",
                    session_id = %session_id,
                    correlation_id = %turn_id,
                    similarity_score = classification.score,
                    "input needs clarification"
                );
                Ok(InputOutcome::Clarify {
                    message: self.messages.clarification.clone(),
                    classification,
                })
            }
            TopicLabel::OnTopic => {
                session.transition_to(TurnState::AwaitingOutput)?;
                let new_constraints = session.merge_constraints(self.tracker.extract(utterance));
                if !new_constraints.is_empty() {
                    info!(
                        event_name = "guardrail.constraints.updated",
                        session_id = %session_id,
                        correlation_id = %turn_id,
                        added = ?new_constraints,
                        "session allergen constraints updated"
                    );
                }
                Ok(InputOutcome::Passed {
                    classification,
                    new_constraints,
                    constraints: session.constraints.clone(),
                })
            }
        }
    }

    pub async fn check_output(
        &self,
        session_id: &SessionId,
        generated_text: &str,
    ) -> Result<OutputOutcome, GuardrailError> {
        let turn_id = Uuid::new_v4().to_string();
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| GuardrailError::UnknownSession(session_id.clone()))?;
        let mut session = handle.lock().await;

        if session.state != TurnState::AwaitingOutput {
            return Err(DomainError::InvalidTurnTransition {
                from: session.state,
                to: TurnState::Passed,
            }
            .into());
        }

        let verdict = self.allergen_validator.validate(generated_text, &session, &self.menu);
        if let AllergenVerdict::Unsafe(violations) = verdict {
            session.conclude(TurnState::BlockedUnsafe)?;
            let constraints = session.constraints.clone();
            drop(session);

            warn!(
                event_name = "guardrail.output.blocked_unsafe",
                session_id = %session_id,
                correlation_id = %turn_id,
                violations = violations.len(),
                "reply blocked for allergen safety"
            );
            if let Some(payload) = EventPayload::allergen_block(violations.clone(), constraints) {
                self.sink.emit(GuardrailEvent::new(session_id.clone(), turn_id, payload));
            }
            return Ok(OutputOutcome::Blocked {
                message: self.messages.safety.clone(),
                reason: BlockReason::Allergen(violations),
            });
        }

        let report = self.price_validator.validate(generated_text, &self.menu);
        if report.is_ambiguous() {
            session.conclude(TurnState::BlockedUnsafe)?;
            drop(session);

            warn!(
                event_name = "guardrail.output.price_ambiguous",
                session_id = %session_id,
                correlation_id = %turn_id,
                ambiguities = report.ambiguities.len(),
                "reply blocked for unattributable price"
            );
            for ambiguity in &report.ambiguities {
                self.sink.emit(GuardrailEvent::new(
                    session_id.clone(),
                    turn_id.clone(),
                    EventPayload::price_ambiguity(
                        ambiguity.candidates.clone(),
                        ambiguity.stated_price,
                        generated_text,
                    ),
                ));
            }
            return Ok(OutputOutcome::Blocked {
                message: self.messages.price_fallback.clone(),
                reason: BlockReason::PriceAmbiguity(report.ambiguities),
            });
        }

        if report.has_corrections() {
            session.conclude(TurnState::CorrectedOutput)?;
            drop(session);

            let corrections: Vec<PriceFinding> = report.corrections().cloned().collect();
            info!(
                event_name = "guardrail.output.corrected",
                session_id = %session_id,
                correlation_id = %turn_id,
                corrections = corrections.len(),
                "reply prices corrected"
            );
            for finding in &corrections {
                if let (Some(dish), Some(actual)) = (&finding.dish, finding.actual_price) {
                    self.sink.emit(GuardrailEvent::new(
                        session_id.clone(),
                        turn_id.clone(),
                        EventPayload::incorrect_price(
                            dish.name.clone(),
                            finding.stated_price,
                            actual,
                            generated_text,
                        ),
                    ));
                }
            }
            return Ok(OutputOutcome::Corrected { text: report.corrected_text, corrections });
        }

        session.conclude(TurnState::Passed)?;
        debug!(
            event_name = "guardrail.output.passed",
            session_id = %session_id,
            correlation_id = %turn_id,
            "reply passed output checks"
        );
        Ok(OutputOutcome::Passed { text: generated_text.to_string() })
    }

    /// Returns a session waiting on the model to `AwaitingInput` without an
    /// outcome. A session that is not mid-turn is left alone.
    pub async fn abandon_turn(&self, session_id: &SessionId) -> Result<(), GuardrailError> {
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| GuardrailError::UnknownSession(session_id.clone()))?;
        let mut session = handle.lock().await;
        if session.state == TurnState::AwaitingOutput {
            session.transition_to(TurnState::AwaitingInput)?;
            info!(
                event_name = "guardrail.turn.abandoned",
                session_id = %session_id,
                "turn abandoned before output check"
            );
        }
        Ok(())
    }

    /// Clears the session's constraints. Returns false for an unknown session.
    pub async fn reset_session(&self, session_id: &SessionId) -> bool {
        let Some(handle) = self.sessions.get(session_id).await else {
            return false;
        };
        handle.lock().await.reset();
        info!(event_name = "guardrail.session.reset", session_id = %session_id, "session reset");
        true
    }

    pub async fn end_session(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id).await;
        if removed {
            info!(event_name = "guardrail.session.ended", session_id = %session_id, "session ended");
        }
        removed
    }

    pub async fn session(&self, session_id: &SessionId) -> Option<Session> {
        let handle = self.sessions.get(session_id).await?;
        let snapshot = handle.lock().await.clone();
        Some(snapshot)
    }
}
