use thiserror::Error;

use crate::domain::session::TurnState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid turn transition from {from:?} to {to:?}")]
    InvalidTurnTransition { from: TurnState, to: TurnState },
    #[error("unknown allergen tag `{0}`")]
    UnknownAllergen(String),
    #[error("invalid menu: {0}")]
    InvalidMenu(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Stable class reported in command envelopes.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The assistant is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::InvalidTurnTransition { .. })
            | ApplicationError::Domain(DomainError::UnknownAllergen(_))
            | ApplicationError::Domain(DomainError::InvariantViolation(_))
            | ApplicationError::SessionNotFound(_) => Self::BadRequest {
                message: "guardrail validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Domain(DomainError::InvalidMenu(message))
            | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::session::TurnState;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn turn_transition_error_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::InvalidTurnTransition {
            from: TurnState::AwaitingInput,
            to: TurnState::Passed,
        })
        .into_interface("turn-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "turn-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Integration("embedding service timed out".to_owned())
            .into_interface("turn-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.error_class(), "service_unavailable");
        assert_eq!(interface.correlation_id(), "turn-2");
        assert_eq!(
            interface.user_message(),
            "The assistant is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn invalid_menu_maps_to_internal() {
        let interface =
            ApplicationError::from(DomainError::InvalidMenu("duplicate dish".to_owned()))
                .into_interface("turn-3");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
