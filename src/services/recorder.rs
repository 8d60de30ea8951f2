use crate::clock::SampleClock;
use crate::engine::AudioEngine;
use crate::error::SessionError;
use crate::messages::{SessionEvent, SessionId, SessionState};
use crate::waveform::{self, WaveformBuffer};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;

enum RecorderState {
    Idle,
    Recording {
        session: SessionId,
        paused: bool,
        path: PathBuf,
    },
}

/// Owns the recording session state machine
///
/// `Idle -> Recording(paused=false) <-> Recording(paused=true) -> Idle`
///
/// While recording, a clock ticks every `tick` and each unpaused tick appends
/// one bar to the live waveform. The bar is the engine's input level when it
/// meters input, otherwise a synthetic amplitude.
pub struct RecorderController {
    engine: Rc<dyn AudioEngine>,
    events: mpsc::UnboundedSender<SessionEvent>,
    tick: Duration,
    state: RecorderState,
    waveform: WaveformBuffer,
    clock: SampleClock,
    sessions: u64,
}

impl RecorderController {
    pub fn new(
        engine: Rc<dyn AudioEngine>,
        events: mpsc::UnboundedSender<SessionEvent>,
        tick: Duration,
        bars: usize,
    ) -> Self {
        Self {
            engine,
            events,
            tick,
            state: RecorderState::Idle,
            waveform: WaveformBuffer::new(bars),
            clock: SampleClock::new(),
            sessions: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    pub fn session_state(&self) -> SessionState {
        match self.state {
            RecorderState::Idle => SessionState::Idle,
            RecorderState::Recording { paused, .. } => SessionState::Recording { paused },
        }
    }

    #[cfg(test)]
    pub fn current_path(&self) -> Option<&Path> {
        match &self.state {
            RecorderState::Idle => None,
            RecorderState::Recording { path, .. } => Some(path),
        }
    }

    pub fn waveform(&self) -> Vec<f32> {
        self.waveform.snapshot()
    }

    pub async fn start(&mut self, path: &Path) -> Result<(), SessionError> {
        if self.is_active() {
            return Err(self.reject("start recording"));
        }

        if let Err(e) = self.engine.start_recorder(path).await {
            tracing::error!("Failed to start recorder: {}", e);
            return Err(e.into());
        }

        self.sessions += 1;
        let session = SessionId(self.sessions);
        self.waveform.clear();
        self.state = RecorderState::Recording {
            session,
            paused: false,
            path: path.to_path_buf(),
        };

        let events = self.events.clone();
        self.clock.start(self.tick, move || {
            let _ = events.send(SessionEvent::RecorderTick(session));
        });

        tracing::info!("Recording started: {}", path.display());
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, RecorderState::Recording { paused: false, .. }) {
            return Err(self.reject("pause recording"));
        }

        if let Err(e) = self.engine.pause_recorder().await {
            tracing::error!("Failed to pause recorder: {}", e);
            return Err(e.into());
        }

        self.set_paused(true);
        tracing::info!("Recording paused");
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, RecorderState::Recording { paused: true, .. }) {
            return Err(self.reject("resume recording"));
        }

        if let Err(e) = self.engine.resume_recorder().await {
            tracing::error!("Failed to resume recorder: {}", e);
            return Err(e.into());
        }

        self.set_paused(false);
        tracing::info!("Recording resumed");
        Ok(())
    }

    /// End the session and return the finished file's path
    ///
    /// Local state always returns to idle, even when the engine fails to
    /// finalize; the engine error is still returned.
    pub async fn stop(&mut self) -> Result<PathBuf, SessionError> {
        let path = match &self.state {
            RecorderState::Recording { path, .. } => path.clone(),
            RecorderState::Idle => return Err(self.reject("stop recording")),
        };

        let result = self.engine.stop_recorder().await;

        self.clock.cancel();
        self.waveform.clear();
        self.state = RecorderState::Idle;

        match result {
            Ok(()) => {
                tracing::info!("Recording saved: {}", path.display());
                Ok(path)
            }
            Err(e) => {
                tracing::error!("Failed to stop recorder, forcing idle: {}", e);
                Err(e.into())
            }
        }
    }

    pub fn on_tick(&mut self, session: SessionId) {
        match self.state {
            RecorderState::Recording {
                session: current,
                paused,
                ..
            } if current == session => {
                if paused {
                    return;
                }
                let amplitude = match self.engine.input_level() {
                    Some(level) => waveform::level_to_amplitude(level),
                    None => waveform::synthetic_amplitude(&mut rand::rng()),
                };
                self.waveform.push(amplitude);
            }
            _ => tracing::debug!("Ignoring stale recorder tick {:?}", session),
        }
    }

    fn set_paused(&mut self, value: bool) {
        if let RecorderState::Recording { paused, .. } = &mut self.state {
            *paused = value;
        }
    }

    fn reject(&self, action: &'static str) -> SessionError {
        let state = self.session_state().label();
        tracing::warn!("Rejected: cannot {} while {}", action, state);
        SessionError::invalid(action, state)
    }
}
