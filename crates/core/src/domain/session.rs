use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::allergen::Allergen;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-session position in the input → model → output cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingInput,
    BlockedOffTopic,
    NeedsClarification,
    AwaitingOutput,
    BlockedUnsafe,
    CorrectedOutput,
    Passed,
}

impl TurnState {
    /// Result states are reported to the caller and then fold back to `AwaitingInput`.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            TurnState::BlockedOffTopic
                | TurnState::NeedsClarification
                | TurnState::BlockedUnsafe
                | TurnState::CorrectedOutput
                | TurnState::Passed
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub constraints: BTreeSet<Allergen>,
    pub created_at: DateTime<Utc>,
    pub state: TurnState,
    pub last_outcome: Option<TurnState>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            constraints: BTreeSet::new(),
            created_at: Utc::now(),
            state: TurnState::AwaitingInput,
            last_outcome: None,
        }
    }

    /// Unions `tags` into the constraint set and returns the tags that were not
    /// already present. Constraints are never removed here.
    pub fn merge_constraints(
        &mut self,
        tags: impl IntoIterator<Item = Allergen>,
    ) -> BTreeSet<Allergen> {
        tags.into_iter().filter(|tag| self.constraints.insert(*tag)).collect()
    }

    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    /// Forgets constraints and any turn in flight.
    pub fn reset(&mut self) {
        self.constraints.clear();
        self.state = TurnState::AwaitingInput;
        self.last_outcome = None;
    }

    pub fn can_transition_to(&self, next: TurnState) -> bool {
        matches!(
            (self.state, next),
            (TurnState::AwaitingInput, TurnState::BlockedOffTopic)
                | (TurnState::AwaitingInput, TurnState::NeedsClarification)
                | (TurnState::AwaitingInput, TurnState::AwaitingOutput)
                | (TurnState::AwaitingOutput, TurnState::BlockedUnsafe)
                | (TurnState::AwaitingOutput, TurnState::CorrectedOutput)
                | (TurnState::AwaitingOutput, TurnState::Passed)
                | (TurnState::AwaitingOutput, TurnState::AwaitingInput)
                | (TurnState::BlockedOffTopic, TurnState::AwaitingInput)
                | (TurnState::NeedsClarification, TurnState::AwaitingInput)
                | (TurnState::BlockedUnsafe, TurnState::AwaitingInput)
                | (TurnState::CorrectedOutput, TurnState::AwaitingInput)
                | (TurnState::Passed, TurnState::AwaitingInput)
        )
    }

    pub fn transition_to(&mut self, next: TurnState) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.state = next;
            return Ok(());
        }

        Err(DomainError::InvalidTurnTransition { from: self.state, to: next })
    }

    /// Enters an outcome state, remembers it, and folds back to `AwaitingInput`.
    pub fn conclude(&mut self, outcome: TurnState) -> Result<(), DomainError> {
        if !outcome.is_outcome() {
            return Err(DomainError::InvariantViolation(format!(
                "{outcome:?} is not a turn outcome"
            )));
        }
        self.transition_to(outcome)?;
        self.last_outcome = Some(outcome);
        self.transition_to(TurnState::AwaitingInput)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{Session, SessionId, TurnState};
    use crate::domain::allergen::Allergen;
    use crate::errors::DomainError;

    fn session() -> Session {
        Session::new(SessionId::new("s-1"))
    }

    #[test]
    fn merge_is_a_union_and_reports_only_new_tags() {
        let mut session = session();
        let added = session.merge_constraints([Allergen::Peanuts, Allergen::Dairy]);
        assert_eq!(added, BTreeSet::from([Allergen::Peanuts, Allergen::Dairy]));

        let added_again = session.merge_constraints([Allergen::Peanuts]);
        assert!(added_again.is_empty());
        assert_eq!(session.constraints, BTreeSet::from([Allergen::Peanuts, Allergen::Dairy]));
    }

    #[test]
    fn passed_input_then_output_cycle_returns_to_awaiting_input() {
        let mut session = session();
        session.transition_to(TurnState::AwaitingOutput).expect("input passed");
        session.conclude(TurnState::CorrectedOutput).expect("output corrected");

        assert_eq!(session.state, TurnState::AwaitingInput);
        assert_eq!(session.last_outcome, Some(TurnState::CorrectedOutput));
    }

    #[test]
    fn output_outcome_without_passed_input_is_rejected() {
        let mut session = session();
        let error = session.conclude(TurnState::Passed).expect_err("no pending output");
        assert!(matches!(
            error,
            DomainError::InvalidTurnTransition {
                from: TurnState::AwaitingInput,
                to: TurnState::Passed
            }
        ));
    }

    #[test]
    fn blocked_input_folds_back_immediately() {
        let mut session = session();
        session.conclude(TurnState::BlockedOffTopic).expect("off-topic block");
        assert_eq!(session.state, TurnState::AwaitingInput);
        assert_eq!(session.last_outcome, Some(TurnState::BlockedOffTopic));
    }

    #[test]
    fn conclude_rejects_non_outcome_states() {
        let mut session = session();
        assert!(matches!(
            session.conclude(TurnState::AwaitingOutput),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
