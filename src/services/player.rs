use crate::clock::SampleClock;
use crate::engine::{AudioEngine, FinishListener};
use crate::error::SessionError;
use crate::messages::{Recording, SessionEvent, SessionId, SessionState};
use crate::waveform::{self, WaveformBuffer};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;

enum PlayerState {
    Idle,
    Playing {
        session: SessionId,
        target: Recording,
        paused: bool,
        position: usize,
    },
}

/// Owns the playback session state machine
///
/// `Idle -> Playing(paused=false) <-> Playing(paused=true) -> Idle`
///
/// A clock advances the progress cursor once per unpaused tick across a
/// fixed-length reference waveform. Playback ends on whichever comes first:
/// the cursor reaching the end, or the engine reporting end-of-media. Both
/// paths share one transition, so the engine's `stop_player` runs once per
/// session.
pub struct PlayerController {
    engine: Rc<dyn AudioEngine>,
    events: mpsc::UnboundedSender<SessionEvent>,
    tick: Duration,
    bars: usize,
    state: PlayerState,
    reference: WaveformBuffer,
    clock: SampleClock,
    sessions: u64,
}

impl PlayerController {
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
            bars,
            state: PlayerState::Idle,
            reference: WaveformBuffer::new(bars),
            clock: SampleClock::new(),
            sessions: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PlayerState::Playing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, PlayerState::Playing { paused: true, .. })
    }

    pub fn session_state(&self) -> SessionState {
        match &self.state {
            PlayerState::Idle => SessionState::Idle,
            PlayerState::Playing {
                target,
                paused,
                position,
                ..
            } => SessionState::Playing {
                target: target.clone(),
                paused: *paused,
                position: *position,
            },
        }
    }

    pub fn target(&self) -> Option<&Recording> {
        match &self.state {
            PlayerState::Idle => None,
            PlayerState::Playing { target, .. } => Some(target),
        }
    }

    #[cfg(test)]
    pub fn position(&self) -> usize {
        match self.state {
            PlayerState::Idle => 0,
            PlayerState::Playing { position, .. } => position,
        }
    }

    pub fn waveform(&self) -> Vec<f32> {
        self.reference.snapshot()
    }

    /// Start playing `recording`, ending any session playing something else
    pub async fn start(&mut self, recording: Recording) -> Result<(), SessionError> {
        match self.target() {
            Some(current) if *current == recording => {
                return Err(self.reject("restart the recording already playing"));
            }
            Some(current) => {
                tracing::info!("Switching playback from {} to {}", current.name, recording.name);
                self.end_session().await?;
            }
            None => {}
        }

        let session = SessionId(self.sessions + 1);
        let listener = FinishListener::new(session, self.events.clone());
        if let Err(e) = self.engine.start_player(recording.path(), listener).await {
            tracing::error!("Failed to start player for {}: {}", recording.name, e);
            return Err(e.into());
        }
        self.sessions = session.0;

        let bars = match self.engine.waveform(recording.path(), self.bars).await {
            Some(bars) => bars,
            None => waveform::synthetic_bars(self.bars, &mut rand::rng()),
        };
        self.reference.clear();
        for bar in bars {
            self.reference.push(bar);
        }

        tracing::info!("Playing {}", recording.name);
        self.state = PlayerState::Playing {
            session,
            target: recording,
            paused: false,
            position: 0,
        };

        let events = self.events.clone();
        self.clock.start(self.tick, move || {
            let _ = events.send(SessionEvent::PlayerTick(session));
        });
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, PlayerState::Playing { paused: false, .. }) {
            return Err(self.reject("pause playback"));
        }

        if let Err(e) = self.engine.pause_player().await {
            tracing::error!("Failed to pause player: {}", e);
            return Err(e.into());
        }

        self.set_paused(true);
        tracing::info!("Playback paused");
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, PlayerState::Playing { paused: true, .. }) {
            return Err(self.reject("resume playback"));
        }

        if let Err(e) = self.engine.resume_player().await {
            tracing::error!("Failed to resume player: {}", e);
            return Err(e.into());
        }

        self.set_paused(false);
        tracing::info!("Playback resumed");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(self.reject("stop playback"));
        }
        self.end_session().await
    }

    pub async fn on_tick(&mut self, session: SessionId) -> Result<(), SessionError> {
        let reached_end = match &mut self.state {
            PlayerState::Playing {
                session: current,
                paused,
                position,
                ..
            } if *current == session => {
                if *paused {
                    return Ok(());
                }
                *position = (*position + 1).min(self.bars);
                *position == self.bars
            }
            _ => {
                tracing::debug!("Ignoring stale player tick {:?}", session);
                return Ok(());
            }
        };

        if reached_end {
            tracing::info!("Playback reached the end of its waveform");
            self.end_session().await?;
        }
        Ok(())
    }

    /// Engine end-of-media notification for `session`
    pub async fn on_finished(&mut self, session: SessionId) -> Result<(), SessionError> {
        let is_current = matches!(
            self.state,
            PlayerState::Playing { session: current, .. } if current == session
        );
        if !is_current {
            tracing::debug!("Ignoring finish notification for ended session {:?}", session);
            return Ok(());
        }

        tracing::info!("Engine reported end of media");
        self.end_session().await
    }

    /// Terminal transition shared by stop, cursor end and engine finish.
    /// Local state is idle afterwards whatever the engine says.
    async fn end_session(&mut self) -> Result<(), SessionError> {
        let result = self.engine.stop_player().await;

        self.clock.cancel();
        self.reference.clear();
        self.state = PlayerState::Idle;

        result.map_err(|e| {
            tracing::error!("Failed to stop player, forcing idle: {}", e);
            e.into()
        })
    }

    fn set_paused(&mut self, value: bool) {
        if let PlayerState::Playing { paused, .. } = &mut self.state {
            *paused = value;
        }
    }

    fn reject(&self, action: &'static str) -> SessionError {
        let state = self.session_state().label();
        tracing::warn!("Rejected: cannot {} while {}", action, state);
        SessionError::invalid(action, state)
    }
}
