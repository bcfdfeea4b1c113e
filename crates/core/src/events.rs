use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::allergen::Allergen;
use crate::domain::session::SessionId;
use crate::domain::topic::TopicLabel;
use crate::validation::allergen::{AllergenViolation, ViolationKind};
use crate::validation::price::format_price;

const PREVIEW_CHARS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    InputBlocked,
    OutputError,
    CriticalBlock,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputBlocked => "INPUT_BLOCKED",
            Self::OutputError => "OUTPUT_ERROR",
            Self::CriticalBlock => "CRITICAL_BLOCK",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error_type", rename_all = "snake_case")]
pub enum EventPayload {
    OffTopic {
        topic_status: TopicLabel,
        similarity_score: f32,
        query: String,
    },
    IncorrectPrice {
        dish: String,
        stated_price: Decimal,
        actual_price: Decimal,
        response_preview: String,
    },
    PriceAmbiguity {
        candidates: Vec<String>,
        stated_price: Decimal,
        response_preview: String,
    },
    UnsafeRecommendation {
        dish: String,
        allergens: BTreeSet<Allergen>,
        user_constraints: BTreeSet<Allergen>,
        violations: Vec<AllergenViolation>,
    },
    AllergenMisinformation {
        dish: String,
        allergens: BTreeSet<Allergen>,
        user_constraints: BTreeSet<Allergen>,
        violations: Vec<AllergenViolation>,
    },
}

impl EventPayload {
    pub fn off_topic(label: TopicLabel, score: f32, query: &str) -> Self {
        Self::OffTopic {
            topic_status: label,
            similarity_score: (score * 10_000.0).round() / 10_000.0,
            query: preview(query),
        }
    }

    pub fn incorrect_price(
        dish: impl Into<String>,
        stated_price: Decimal,
        actual_price: Decimal,
        response: &str,
    ) -> Self {
        Self::IncorrectPrice {
            dish: dish.into(),
            stated_price,
            actual_price,
            response_preview: preview(response),
        }
    }

    pub fn price_ambiguity(candidates: Vec<String>, stated_price: Decimal, response: &str) -> Self {
        Self::PriceAmbiguity { candidates, stated_price, response_preview: preview(response) }
    }

    /// Built from the first violation; every violation is kept in the payload.
    pub fn allergen_block(
        violations: Vec<AllergenViolation>,
        user_constraints: BTreeSet<Allergen>,
    ) -> Option<Self> {
        let first = violations.first()?.clone();
        Some(match first.kind {
            ViolationKind::UnsafeRecommendation => Self::UnsafeRecommendation {
                dish: first.dish,
                allergens: first.allergens,
                user_constraints,
                violations,
            },
            ViolationKind::AllergenMisinformation => Self::AllergenMisinformation {
                dish: first.dish,
                allergens: first.allergens,
                user_constraints,
                violations,
            },
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::OffTopic { .. } => EventKind::InputBlocked,
            Self::IncorrectPrice { .. } | Self::PriceAmbiguity { .. } => EventKind::OutputError,
            Self::UnsafeRecommendation { .. } | Self::AllergenMisinformation { .. } => {
                EventKind::CriticalBlock
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            EventKind::InputBlocked => Severity::Medium,
            EventKind::OutputError => Severity::High,
            EventKind::CriticalBlock => Severity::Critical,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::OffTopic { .. } => "off_topic",
            Self::IncorrectPrice { .. } => "incorrect_price",
            Self::PriceAmbiguity { .. } => "price_ambiguity",
            Self::UnsafeRecommendation { .. } => "unsafe_recommendation",
            Self::AllergenMisinformation { .. } => "allergen_misinformation",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::OffTopic { topic_status, similarity_score, .. } => {
                format!("Input blocked as {topic_status} (similarity {similarity_score:.4})")
            }
            Self::IncorrectPrice { dish, stated_price, actual_price, .. } => format!(
                "Incorrect price for '{dish}': stated ${}, actual ${}",
                format_price(*stated_price),
                format_price(*actual_price)
            ),
            Self::PriceAmbiguity { candidates, stated_price, .. } => format!(
                "Price ${} cannot be attributed to one of: {}",
                format_price(*stated_price),
                candidates.join(", ")
            ),
            Self::UnsafeRecommendation { dish, allergens, .. } => format!(
                "SAFETY BLOCK: guest is allergic to {}, but response mentioned '{dish}' which contains them.",
                join_tags(allergens)
            ),
            Self::AllergenMisinformation { dish, allergens, .. } => format!(
                "SAFETY ALERT: '{dish}' contains {}, but response suggests it is free of them.",
                join_tags(allergens)
            ),
        }
    }
}

fn join_tags(tags: &BTreeSet<Allergen>) -> String {
    tags.iter().map(Allergen::as_str).collect::<Vec<_>>().join(", ")
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardrailEvent {
    pub event_id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub severity: Severity,
    pub session_id: SessionId,
    pub correlation_id: String,
    pub message: String,
    pub details: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl GuardrailEvent {
    pub fn new(
        session_id: SessionId,
        correlation_id: impl Into<String>,
        details: EventPayload,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind: details.kind(),
            severity: details.severity(),
            session_id,
            correlation_id: correlation_id.into(),
            message: details.message(),
            details,
            occurred_at: Utc::now(),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: GuardrailEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<GuardrailEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<GuardrailEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_of(&self, kind: EventKind) -> Vec<GuardrailEvent> {
        self.events().into_iter().filter(|event| event.kind == kind).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: GuardrailEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards every event to `tracing` as one structured record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: GuardrailEvent) {
        let details = serde_json::to_string(&event.details).unwrap_or_default();
        match event.severity {
            Severity::Low | Severity::Medium => info!(
                event_name = "guardrail.event",
                event_id = %event.event_id,
                kind = event.kind.as_str(),
                severity = event.severity.as_str(),
                error_type = event.details.error_type(),
                session_id = %event.session_id,
                correlation_id = %event.correlation_id,
                details = %details,
                "{}",
                event.message
            ),
            Severity::High | Severity::Critical => warn!(
                event_name = "guardrail.event",
                event_id = %event.event_id,
                kind = event.kind.as_str(),
                severity = event.severity.as_str(),
                error_type = event.details.error_type(),
                session_id = %event.session_id,
                correlation_id = %event.correlation_id,
                details = %details,
                "{}",
                event.message
            ),
        }
    }
}

/// Appends one JSON object per line. The file is opened on the first event and
/// kept open; after a failed write it is reopened on the next event. Write
/// failures are logged and swallowed.
#[derive(Debug)]
pub struct JsonLinesEventSink {
    path: PathBuf,
    writer: Mutex<Option<LineWriter<File>>>,
}

impl JsonLinesEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), writer: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<LineWriter<File>> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(LineWriter::new(file))
    }

    fn append(
        &self,
        slot: &mut Option<LineWriter<File>>,
        event: &GuardrailEvent,
    ) -> io::Result<()> {
        let line = serde_json::to_string(event)?;
        let writer = match slot.take() {
            Some(writer) => writer,
            None => self.open()?,
        };
        writeln!(slot.insert(writer), "{line}")
    }
}

impl EventSink for JsonLinesEventSink {
    fn emit(&self, event: GuardrailEvent) {
        let mut slot = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(error) = self.append(&mut slot, &event) {
            *slot = None;
            warn!(
                event_name = "guardrail.event_log.write_failed",
                path = %self.path.display(),
                event_id = %event.event_id,
                error = %error,
                "failed to append guardrail event"
            );
        }
    }
}

#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: GuardrailEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::domain::allergen::Allergen;
    use crate::domain::session::SessionId;
    use crate::domain::topic::TopicLabel;
    use crate::events::{
        EventKind, EventPayload, EventSink, FanoutEventSink, GuardrailEvent, InMemoryEventSink,
        JsonLinesEventSink, Severity,
    };
    use crate::validation::allergen::{AllergenViolation, ViolationKind};

    fn session() -> SessionId {
        SessionId::new("guest-7")
    }

    #[test]
    fn kind_and_severity_follow_payload() {
        let blocked = GuardrailEvent::new(
            session(),
            "turn-1",
            EventPayload::off_topic(TopicLabel::OffTopic, 0.123_456, "What's the weather today?"),
        );
        assert_eq!(blocked.kind, EventKind::InputBlocked);
        assert_eq!(blocked.severity, Severity::Medium);

        let price = GuardrailEvent::new(
            session(),
            "turn-2",
            EventPayload::incorrect_price(
                "Coca-Cola",
                Decimal::new(199, 2),
                Decimal::new(299, 2),
                "Our Coca-Cola costs $1.99",
            ),
        );
        assert_eq!(price.kind, EventKind::OutputError);
        assert_eq!(price.severity, Severity::High);
        assert_eq!(price.message, "Incorrect price for 'Coca-Cola': stated $1.99, actual $2.99");
    }

    #[test]
    fn off_topic_payload_rounds_score_and_truncates_query() {
        let long_query = "weather ".repeat(40);
        let payload = EventPayload::off_topic(TopicLabel::OffTopic, 0.123_456, &long_query);

        let EventPayload::OffTopic { similarity_score, query, .. } = payload else {
            panic!("expected off-topic payload");
        };
        assert!((similarity_score - 0.1235).abs() < 1e-6);
        assert_eq!(query.chars().count(), 100);
    }

    #[test]
    fn allergen_block_names_first_violation_and_keeps_all() {
        let violations = vec![
            AllergenViolation {
                kind: ViolationKind::UnsafeRecommendation,
                dish: "Pad Thai".to_owned(),
                allergens: BTreeSet::from([Allergen::Peanuts]),
            },
            AllergenViolation {
                kind: ViolationKind::AllergenMisinformation,
                dish: "Pad Thai".to_owned(),
                allergens: BTreeSet::from([Allergen::Gluten]),
            },
        ];

        let payload =
            EventPayload::allergen_block(violations, BTreeSet::from([Allergen::Peanuts]))
                .expect("payload for non-empty violations");
        assert_eq!(payload.kind(), EventKind::CriticalBlock);
        assert_eq!(payload.severity(), Severity::Critical);
        assert!(payload.message().contains("Pad Thai"));
        assert!(payload.message().contains("peanuts"));
        let EventPayload::UnsafeRecommendation { violations, .. } = payload else {
            panic!("expected unsafe recommendation payload");
        };
        assert_eq!(violations.len(), 2);

        assert!(EventPayload::allergen_block(Vec::new(), BTreeSet::new()).is_none());
    }

    #[test]
    fn event_serializes_with_log_field_names() {
        let event = GuardrailEvent::new(
            session(),
            "turn-3",
            EventPayload::off_topic(TopicLabel::OffTopic, 0.2, "Tell me a joke"),
        );
        let json = serde_json::to_value(&event).expect("serialize event");

        assert_eq!(json["type"], "INPUT_BLOCKED");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["session_id"], "guest-7");
        assert_eq!(json["details"]["error_type"], "off_topic");
        assert_eq!(json["details"]["topic_status"], "off_topic");
        assert_eq!(json["details"]["query"], "Tell me a joke");
    }

    #[test]
    fn json_lines_sink_appends_one_object_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("guardrails.log");
        let sink = JsonLinesEventSink::new(&path);

        for turn in ["turn-1", "turn-2"] {
            sink.emit(GuardrailEvent::new(
                session(),
                turn,
                EventPayload::off_topic(TopicLabel::OffTopic, 0.1, "Who won the game?"),
            ));
        }

        let contents = std::fs::read_to_string(&path).expect("read event log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: GuardrailEvent = serde_json::from_str(lines[1]).expect("parse event line");
        assert_eq!(second.correlation_id, "turn-2");
    }

    #[cfg(unix)]
    #[test]
    fn json_lines_sink_keeps_its_file_open_between_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("guardrails.log");
        let sink = JsonLinesEventSink::new(&path);
        let event = |turn: &str| {
            GuardrailEvent::new(
                session(),
                turn,
                EventPayload::off_topic(TopicLabel::OffTopic, 0.1, "Who won the game?"),
            )
        };

        sink.emit(event("turn-1"));
        std::fs::remove_file(&path).expect("remove event log");
        sink.emit(event("turn-2"));

        assert!(!path.exists(), "second event must reuse the open handle");
    }

    #[test]
    fn json_lines_sink_swallows_write_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = JsonLinesEventSink::new(dir.path());

        sink.emit(GuardrailEvent::new(
            session(),
            "turn-1",
            EventPayload::off_topic(TopicLabel::OffTopic, 0.1, "Who won the game?"),
        ));
        assert!(dir.path().is_dir());
    }

    #[test]
    fn fanout_delivers_to_every_sink() {
        let first = InMemoryEventSink::default();
        let second = InMemoryEventSink::default();
        let fanout = FanoutEventSink::default()
            .with(Arc::new(first.clone()))
            .with(Arc::new(second.clone()));

        fanout.emit(GuardrailEvent::new(
            session(),
            "turn-1",
            EventPayload::off_topic(TopicLabel::OffTopic, 0.1, "Who won the game?"),
        ));

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events_of(EventKind::InputBlocked).len(), 1);
    }
}
