use thiserror::Error;

/// Rejection reported by an [`AudioEngine`](crate::engine::AudioEngine) call
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("{0} is not active")]
    NotActive(&'static str),

    #[error("{0} is already active")]
    Busy(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by the session controllers and the coordinator
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("engine call failed: {0}")]
    Engine(#[from] EngineError),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("no recording at position {0}")]
    UnknownRecording(usize),

    #[error("recordings directory error: {0}")]
    Storage(#[source] std::io::Error),

    #[error("session task is no longer running")]
    Closed,
}

impl SessionError {
    pub fn invalid(action: &'static str, state: &'static str) -> Self {
        Self::InvalidTransition { action, state }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
