//! Pipeline session state and the transition table.
//!
//! A session tracks one recording-to-completion cycle. State changes flow
//! through `transition`, which rejects anything outside the table, so a bug
//! in stage sequencing surfaces as an error rather than silent corruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::action::VoiceAction;

/// State-machine states for one voice-logging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Transcribing,
    Classifying,
    Extracting,
    Executing,
    Completed,
    Failed,
}

/// The active stages, used to label timeouts and stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcribing,
    Classifying,
    Extracting,
    Executing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transcribing => "transcription",
            Self::Classifying => "classification",
            Self::Extracting => "extraction",
            Self::Executing => "execution",
        };
        f.write_str(name)
    }
}

/// Attempted state change outside the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Transient state for one recording-to-completion cycle.
#[derive(Debug, Clone)]
pub struct PipelineSession {
    pub id: Uuid,

    pub state: SessionState,

    pub started_at: DateTime<Utc>,

    /// Set once transcription succeeds.
    pub transcript: Option<String>,

    /// Classifier verdict, if that stage was reached.
    pub has_action: Option<bool>,

    pub extracted_actions: Vec<VoiceAction>,

    pub executed_actions: Vec<VoiceAction>,

    /// Actions whose shell persistence failed, with the error text.
    pub failed_actions: Vec<(VoiceAction, String)>,

    pub error: Option<String>,
}

impl PipelineSession {
    /// Start a fresh session in `Transcribing`.
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Transcribing,
            started_at,
            transcript: None,
            has_action: None,
            extracted_actions: Vec::new(),
            executed_actions: Vec::new(),
            failed_actions: Vec::new(),
            error: None,
        }
    }

    /// Advance the state machine, rejecting transitions outside the table.
    pub fn transition(&mut self, to: SessionState) -> Result<(), InvalidTransition> {
        if Self::allowed(self.state, to) {
            self.state = to;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn allowed(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (from, to),
            (Idle, Transcribing)
                | (Transcribing, Classifying)
                | (Transcribing, Failed)
                | (Classifying, Extracting)
                | (Classifying, Completed)
                | (Classifying, Failed)
                | (Extracting, Executing)
                | (Extracting, Completed)
                | (Extracting, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Completed, Idle)
                | (Failed, Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Completed | SessionState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut session = PipelineSession::begin(Utc::now());
        assert_eq!(session.state, SessionState::Transcribing);
        session.transition(SessionState::Classifying).unwrap();
        session.transition(SessionState::Extracting).unwrap();
        session.transition(SessionState::Executing).unwrap();
        session.transition(SessionState::Completed).unwrap();
        assert!(session.is_terminal());
    }

    #[test]
    fn classifier_short_circuit_goes_straight_to_completed() {
        let mut session = PipelineSession::begin(Utc::now());
        session.transition(SessionState::Classifying).unwrap();
        session.transition(SessionState::Completed).unwrap();
    }

    #[test]
    fn skipping_stages_is_rejected() {
        let mut session = PipelineSession::begin(Utc::now());
        let err = session.transition(SessionState::Executing).unwrap_err();
        assert_eq!(err.from, SessionState::Transcribing);
        assert_eq!(err.to, SessionState::Executing);
    }

    #[test]
    fn terminal_states_only_return_to_idle() {
        let mut session = PipelineSession::begin(Utc::now());
        session.transition(SessionState::Failed).unwrap();
        assert!(session.transition(SessionState::Transcribing).is_err());
        session.transition(SessionState::Idle).unwrap();
    }

    #[test]
    fn every_stage_can_fail() {
        use SessionState::*;
        for from in [Transcribing, Classifying, Extracting, Executing] {
            assert!(PipelineSession::allowed(from, Failed), "{from:?}");
        }
    }
}
