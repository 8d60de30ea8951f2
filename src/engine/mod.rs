//! The audio engine contract consumed by the session controllers
//!
//! Recorder and player calls must follow the order one `start_*`, any
//! interleaving of `pause_*`/`resume_*`, then exactly one terminal `stop_*`.
//! Controllers guarantee this; engines may reject anything else.

#[cfg(test)]
pub mod mock;
pub mod native;

pub use native::NativeEngine;

use crate::error::EngineError;
use crate::messages::{SessionEvent, SessionId};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// End-of-media callback registered for a single playback session
///
/// Consumed by `notify`, so it fires at most once. Dropping it unsubscribes.
pub struct FinishListener {
    session: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl FinishListener {
    pub fn new(session: SessionId, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, events }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn notify(self) {
        tracing::debug!("Playback finished for session {:?}", self.session);
        let _ = self.events.send(SessionEvent::PlaybackFinished(self.session));
    }
}

/// Native record/play primitives
///
/// Engines are shared by both controllers and are driven from a single
/// thread, hence `&self` methods and no `Send` bound.
#[async_trait(?Send)]
pub trait AudioEngine {
    async fn start_recorder(&self, path: &Path) -> Result<(), EngineError>;

    async fn pause_recorder(&self) -> Result<(), EngineError>;

    async fn resume_recorder(&self) -> Result<(), EngineError>;

    async fn stop_recorder(&self) -> Result<(), EngineError>;

    async fn start_player(&self, path: &Path, on_finish: FinishListener) -> Result<(), EngineError>;

    async fn pause_player(&self) -> Result<(), EngineError>;

    async fn resume_player(&self) -> Result<(), EngineError>;

    async fn stop_player(&self) -> Result<(), EngineError>;

    /// Current input RMS level in 0.0 - 1.0, if the engine meters its input
    fn input_level(&self) -> Option<f32> {
        None
    }

    /// `bars` amplitude values summarizing the file, if the engine can decode it
    async fn waveform(&self, _path: &Path, _bars: usize) -> Option<Vec<f32>> {
        None
    }
}
