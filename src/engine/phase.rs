//! Engine phase: idle, or waiting for the browser to confirm a write.

use crate::mvi::{Intent, Model, Reducer};
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnginePhase {
    #[default]
    Idle,
    /// A browser write is in flight. `pending` becomes live on confirmation.
    AwaitingConfirmation { pending: State },
}

impl EnginePhase {
    pub fn is_pending(&self) -> bool {
        matches!(self, EnginePhase::AwaitingConfirmation { .. })
    }

    pub fn pending(&self) -> Option<&State> {
        match self {
            EnginePhase::AwaitingConfirmation { pending } => Some(pending),
            EnginePhase::Idle => None,
        }
    }
}

impl Model for EnginePhase {}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseIntent {
    /// A browser write is about to be issued and will be reported back.
    BrowserWritten { pending: State },
    /// The browser reported the write.
    Confirmed,
    /// The write was given up, or the browser had nothing to write.
    Abandoned,
}

impl Intent for PhaseIntent {}

pub struct PhaseReducer;

impl Reducer for PhaseReducer {
    type Model = EnginePhase;
    type Intent = PhaseIntent;

    fn reduce(phase: EnginePhase, intent: PhaseIntent) -> EnginePhase {
        match (phase, intent) {
            (_, PhaseIntent::BrowserWritten { pending }) => {
                EnginePhase::AwaitingConfirmation { pending }
            }
            (EnginePhase::AwaitingConfirmation { .. }, PhaseIntent::Confirmed)
            | (EnginePhase::AwaitingConfirmation { .. }, PhaseIntent::Abandoned) => {
                EnginePhase::Idle
            }
            (EnginePhase::Idle, _) => EnginePhase::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state;

    #[test]
    fn browser_write_enters_awaiting() {
        let phase = PhaseReducer::reduce(
            EnginePhase::Idle,
            PhaseIntent::BrowserWritten {
                pending: state! { "view" => "a" },
            },
        );
        assert_eq!(phase.pending(), Some(&state! { "view" => "a" }));
    }

    #[test]
    fn confirmation_and_abandon_return_to_idle() {
        let awaiting = EnginePhase::AwaitingConfirmation {
            pending: state! { "view" => "a" },
        };
        assert_eq!(
            PhaseReducer::reduce(awaiting.clone(), PhaseIntent::Confirmed),
            EnginePhase::Idle
        );
        assert_eq!(
            PhaseReducer::reduce(awaiting, PhaseIntent::Abandoned),
            EnginePhase::Idle
        );
    }

    #[test]
    fn idle_ignores_confirmation() {
        assert_eq!(
            PhaseReducer::reduce(EnginePhase::Idle, PhaseIntent::Confirmed),
            EnginePhase::Idle
        );
    }
}
