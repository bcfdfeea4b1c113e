//! Guardrail domain for a menu-ordering assistant: the catalog, allergen vocabulary,
//! per-session turn state, and the validators that screen model replies.

pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod fixtures;
pub mod validation;

pub use domain::allergen::Allergen;
pub use domain::menu::{MenuCatalog, MenuItem};
pub use domain::session::{Session, SessionId, TurnState};
pub use domain::topic::{ClassificationResult, TopicLabel};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use events::{
    EventKind, EventPayload, EventSink, FanoutEventSink, GuardrailEvent, InMemoryEventSink,
    JsonLinesEventSink, Severity, TracingEventSink,
};
pub use validation::allergen::{
    AllergenValidator, AllergenVerdict, AllergenViolation, ViolationKind,
};
pub use validation::constraints::ConstraintTracker;
pub use validation::price::{PriceFinding, PriceReport, PriceValidator, PriceVerdict};
