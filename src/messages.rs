use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

/// A recorded file in the catalog. The path is the identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Recording {
    pub name: String,
    pub path: PathBuf,
}

impl Recording {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Identifies one recording or playback session.
///
/// Timer ticks and finish notifications carry the id of the session that
/// scheduled them, so anything arriving after that session ended is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Combined state of the recorder and the player
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Idle,
    Recording {
        paused: bool,
    },
    Playing {
        target: Recording,
        paused: bool,
        position: usize,
    },
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Recording { paused: false } => "recording",
            SessionState::Recording { paused: true } => "recording paused",
            SessionState::Playing { paused: false, .. } => "playing",
            SessionState::Playing { paused: true, .. } => "playback paused",
        }
    }
}

/// Events produced by clocks and the engine, consumed by the coordinator task
#[derive(Debug)]
pub enum SessionEvent {
    RecorderTick(SessionId),
    PlayerTick(SessionId),
    PlaybackFinished(SessionId),
}

/// How playback is presented to the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    /// Selecting a recording opens a playback panel that stays until closed
    #[default]
    Modal,
    /// Selecting a recording toggles playback in place within the list
    Inline,
}

/// User intent, as parsed from the input surface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserAction {
    Record,
    Pause,
    Resume,
    Stop,
    /// Select the n-th recording (0-based) from the catalog
    Play(usize),
    TogglePlayback,
    CloseModal,
    Refresh,
    Shutdown,
}

/// Commands for the session coordinator task
pub struct SessionCommand {
    pub action: UserAction,
    pub reply: oneshot::Sender<Result<(), SessionError>>,
}

/// Everything the presentation layer needs to draw one frame
#[derive(Clone, Debug, PartialEq)]
pub struct SessionView {
    pub state: SessionState,
    pub presentation: Presentation,
    /// Live bars while recording, reference bars while playing
    pub waveform: Vec<f32>,
    pub recordings: Vec<Recording>,
    pub selected: Option<Recording>,
    pub modal_open: bool,
}

#[cfg(test)]
impl SessionView {
    pub fn idle(presentation: Presentation) -> Self {
        Self {
            state: SessionState::Idle,
            presentation,
            waveform: Vec::new(),
            recordings: Vec::new(),
            selected: None,
            modal_open: false,
        }
    }
}
