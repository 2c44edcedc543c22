//! Confirmation state machine — tracks where a record is in its lifecycle.

use serde::{Deserialize, Serialize};

/// Lifecycle of one record.
///
/// Collecting → AwaitingConfirmation → Complete. New field data sends an
/// awaiting record back to Collecting; Complete is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPhase {
    #[default]
    Collecting,
    AwaitingConfirmation,
    Complete,
}

impl ConfirmationPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: ConfirmationPhase) -> bool {
        use ConfirmationPhase::*;
        matches!(
            (self, target),
            (Collecting, AwaitingConfirmation)
                | (AwaitingConfirmation, AwaitingConfirmation)
                | (AwaitingConfirmation, Collecting)
                | (AwaitingConfirmation, Complete)
        )
    }

    /// Whether this phase is terminal for the record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for ConfirmationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}
