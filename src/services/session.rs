use super::{PlayerController, RecorderController};
use crate::catalog::RecordingCatalog;
use crate::config::Config;
use crate::engine::AudioEngine;
use crate::error::SessionError;
use crate::messages::{
    Presentation, Recording, SessionCommand, SessionEvent, SessionState, SessionView, UserAction,
};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Knobs the coordinator needs from the configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tick: Duration,
    pub live_bars: usize,
    pub playback_bars: usize,
    pub presentation: Presentation,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            tick: config.tick_interval(),
            live_bars: config.live_bars,
            playback_bars: config.playback_bars,
            presentation: config.presentation,
        }
    }
}

/// Composes the recorder and the player into one session surface
///
/// Recording and playback never overlap: asking to record while playing ends
/// the playback first, asking to play while recording is rejected. The
/// catalog is reloaded after every recording that was saved successfully.
///
/// Both presentations drive the same controllers. `Modal` opens a playback
/// panel for the selected recording and keeps it open until closed; `Inline`
/// toggles playback in place when a recording is selected again.
pub struct SessionCoordinator {
    recorder: RecorderController,
    player: PlayerController,
    catalog: Box<dyn RecordingCatalog>,
    presentation: Presentation,
    recordings: Vec<Recording>,
    selected: Option<Recording>,
    modal_open: bool,
}

impl SessionCoordinator {
    pub fn new(
        engine: Rc<dyn AudioEngine>,
        catalog: Box<dyn RecordingCatalog>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let recorder = RecorderController::new(
            engine.clone(),
            events_tx.clone(),
            settings.tick,
            settings.live_bars,
        );
        let player = PlayerController::new(engine, events_tx, settings.tick, settings.playback_bars);

        let coordinator = Self {
            recorder,
            player,
            catalog,
            presentation: settings.presentation,
            recordings: Vec::new(),
            selected: None,
            modal_open: false,
        };
        (coordinator, events_rx)
    }

    pub fn state(&self) -> SessionState {
        if self.recorder.is_active() {
            self.recorder.session_state()
        } else {
            self.player.session_state()
        }
    }

    #[cfg(test)]
    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    #[cfg(test)]
    pub fn selected(&self) -> Option<&Recording> {
        self.selected.as_ref()
    }

    #[cfg(test)]
    pub fn is_modal_open(&self) -> bool {
        self.modal_open
    }

    pub fn view(&self) -> SessionView {
        let waveform = if self.recorder.is_active() {
            self.recorder.waveform()
        } else {
            self.player.waveform()
        };

        SessionView {
            state: self.state(),
            presentation: self.presentation,
            waveform,
            recordings: self.recordings.clone(),
            selected: self.selected.clone(),
            modal_open: self.modal_open,
        }
    }

    pub async fn handle_action(&mut self, action: UserAction) -> Result<(), SessionError> {
        tracing::debug!("Handling {:?} while {}", action, self.state().label());

        match action {
            UserAction::Record => self.start_recording().await,
            UserAction::Pause => self.pause().await,
            UserAction::Resume => self.resume().await,
            UserAction::Stop => self.stop().await,
            UserAction::Play(index) => self.select(index).await,
            UserAction::TogglePlayback => self.toggle_playback().await,
            UserAction::CloseModal => self.close_modal().await,
            UserAction::Refresh => self.refresh_catalog(),
            UserAction::Shutdown => self.shutdown().await,
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::RecorderTick(session) => {
                self.recorder.on_tick(session);
                Ok(())
            }
            SessionEvent::PlayerTick(session) => self.player.on_tick(session).await,
            SessionEvent::PlaybackFinished(session) => self.player.on_finished(session).await,
        }
    }

    pub async fn start_recording(&mut self) -> Result<(), SessionError> {
        if self.player.is_active() {
            tracing::info!("Stopping playback before recording");
        }
        // The panel goes away even when its playback already finished
        if !self.recorder.is_active() {
            self.close_modal().await?;
        }

        let path = self
            .catalog
            .next_recording_path()
            .map_err(SessionError::Storage)?;
        self.recorder.start(&path).await
    }

    pub async fn stop_recording(&mut self) -> Result<(), SessionError> {
        self.recorder.stop().await?;
        self.refresh_catalog()
    }

    pub async fn pause(&mut self) -> Result<(), SessionError> {
        if self.player.is_active() {
            self.player.pause().await
        } else {
            self.recorder.pause().await
        }
    }

    pub async fn resume(&mut self) -> Result<(), SessionError> {
        if self.player.is_active() {
            self.player.resume().await
        } else {
            self.recorder.resume().await
        }
    }

    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if self.player.is_active() {
            self.player.stop().await
        } else {
            self.stop_recording().await
        }
    }

    /// Select the `index`-th recording for playback
    pub async fn select(&mut self, index: usize) -> Result<(), SessionError> {
        let recording = self
            .recordings
            .get(index)
            .cloned()
            .ok_or(SessionError::UnknownRecording(index))?;

        if self.recorder.is_active() {
            let state = self.recorder.session_state().label();
            tracing::warn!("Rejected: cannot play {} while {}", recording.name, state);
            return Err(SessionError::invalid("play a recording", state));
        }

        if self.player.target() == Some(&recording) {
            return self.toggle_playback().await;
        }

        self.player.start(recording.clone()).await?;
        self.selected = Some(recording);
        if self.presentation == Presentation::Modal {
            self.modal_open = true;
        }
        Ok(())
    }

    /// Pause or resume the current playback. With nothing playing, replays
    /// the selected recording.
    pub async fn toggle_playback(&mut self) -> Result<(), SessionError> {
        if self.player.is_paused() {
            return self.player.resume().await;
        }
        if self.player.is_active() {
            return self.player.pause().await;
        }

        match self.selected.clone() {
            Some(recording) if !self.recorder.is_active() => self.player.start(recording).await,
            _ => Err(SessionError::invalid("toggle playback", self.state().label())),
        }
    }

    /// Close the playback panel, ending playback if it is still running
    pub async fn close_modal(&mut self) -> Result<(), SessionError> {
        let result = if self.player.is_active() {
            self.player.stop().await
        } else {
            Ok(())
        };

        self.modal_open = false;
        self.selected = None;
        result
    }

    pub fn refresh_catalog(&mut self) -> Result<(), SessionError> {
        let recordings = self.catalog.list().map_err(|e| {
            tracing::error!("Failed to list recordings: {}", e);
            SessionError::Storage(e)
        })?;

        tracing::info!("Catalog refreshed: {} recordings", recordings.len());
        self.recordings = recordings;

        let selection_gone = self
            .selected
            .as_ref()
            .is_some_and(|selected| !self.recordings.contains(selected));
        if selection_gone && !self.player.is_active() {
            self.selected = None;
            self.modal_open = false;
        }
        Ok(())
    }

    /// End whatever session is active so the engine sees its terminal stop
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.recorder.is_active() {
            self.stop_recording().await
        } else if self.player.is_active() {
            self.player.stop().await
        } else {
            Ok(())
        }
    }

    /// Spawn the coordinator as a local task and return a handle to it
    pub fn spawn(
        self,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (view_tx, view_rx) = watch::channel(self.view());

        let task = tokio::task::spawn_local(self.run(cmd_rx, events, view_tx));
        (SessionHandle::new(cmd_tx, view_rx), task)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        view_tx: watch::Sender<SessionView>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(SessionCommand { action, reply }) = cmd else {
                        tracing::debug!("All session handles dropped");
                        if let Err(e) = self.shutdown().await {
                            tracing::error!("Error during shutdown: {}", e);
                        }
                        break;
                    };

                    let shutting_down = action == UserAction::Shutdown;
                    let result = self.handle_action(action).await;
                    let _ = reply.send(result);
                    view_tx.send_replace(self.view());

                    if shutting_down {
                        break;
                    }
                }

                Some(event) = events.recv() => {
                    if let Err(e) = self.handle_event(event).await {
                        tracing::error!("Error handling session event: {}", e);
                    }
                    view_tx.send_replace(self.view());
                }
            }
        }

        tracing::info!("Session coordinator stopped");
    }
}

/// Handle for communicating with the session coordinator task
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionCommand>, view: watch::Receiver<SessionView>) -> Self {
        Self { tx, view }
    }

    pub async fn dispatch(&self, action: UserAction) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand { action, reply })
            .await
            .map_err(|_| SessionError::Closed)?;

        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Receiver that sees a new view after every handled command or event
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{Call, MockEngine, settle};
    use crate::render::{ModalPresenter, Presenter};
    use std::cell::{Cell, RefCell};
    use std::io;
    use std::path::PathBuf;
    use tokio::task::LocalSet;

    const TICK: Duration = Duration::from_millis(100);

    /// In-memory catalog counting how often it is listed
    #[derive(Clone, Default)]
    struct FakeCatalog {
        recordings: Rc<RefCell<Vec<Recording>>>,
        lists: Rc<Cell<usize>>,
        created: Rc<Cell<usize>>,
    }

    impl FakeCatalog {
        fn with(names: &[&str]) -> Self {
            let catalog = Self::default();
            for name in names {
                catalog.add(name);
            }
            catalog
        }

        fn add(&self, name: &str) {
            self.recordings
                .borrow_mut()
                .insert(0, Recording::from_path(format!("/memos/{}", name)));
        }
    }

    impl RecordingCatalog for FakeCatalog {
        fn list(&self) -> io::Result<Vec<Recording>> {
            self.lists.set(self.lists.get() + 1);
            Ok(self.recordings.borrow().clone())
        }

        fn next_recording_path(&self) -> io::Result<PathBuf> {
            self.created.set(self.created.get() + 1);
            Ok(PathBuf::from(format!("/memos/new_{}.wav", self.created.get())))
        }
    }

    fn settings(presentation: Presentation) -> SessionSettings {
        SessionSettings {
            tick: TICK,
            live_bars: 50,
            playback_bars: 100,
            presentation,
        }
    }

    fn coordinator(
        engine: &Rc<MockEngine>,
        catalog: &FakeCatalog,
        presentation: Presentation,
    ) -> (SessionCoordinator, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionCoordinator::new(engine.clone(), Box::new(catalog.clone()), settings(presentation))
    }

    async fn run_ticks(
        session: &mut SessionCoordinator,
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        n: usize,
    ) {
        for _ in 0..n {
            tokio::time::advance(TICK).await;
            settle().await;
            while let Ok(event) = events.try_recv() {
                session.handle_event(event).await.unwrap();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_then_stop_reloads_catalog_once() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::default();
                let (mut session, mut events) = coordinator(&engine, &catalog, Presentation::Modal);

                session.handle_action(UserAction::Record).await.unwrap();
                assert_eq!(session.state(), SessionState::Recording { paused: false });
                assert_eq!(engine.paths(), vec![PathBuf::from("/memos/new_1.wav")]);

                run_ticks(&mut session, &mut events, 4).await;
                assert_eq!(session.view().waveform.len(), 4);

                catalog.add("new_1.wav");
                session.handle_action(UserAction::Stop).await.unwrap();

                assert_eq!(session.state(), SessionState::Idle);
                assert_eq!(catalog.lists.get(), 1);
                assert_eq!(session.recordings().len(), 1);
                assert!(session.view().waveform.is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_recorder_stop_skips_reload() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                engine.fail(Call::StopRecorder);
                let catalog = FakeCatalog::default();
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);

                session.handle_action(UserAction::Record).await.unwrap();
                assert!(session.handle_action(UserAction::Stop).await.is_err());
                assert_eq!(session.state(), SessionState::Idle);
                assert_eq!(catalog.lists.get(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_while_idle_makes_no_engine_call() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::default();
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);

                let err = session.handle_action(UserAction::Pause).await.unwrap_err();
                assert!(err.is_invalid_transition());
                assert_eq!(session.state(), SessionState::Idle);
                assert!(engine.calls().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_modal_select_opens_panel_and_close_stops() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav", "b.wav"]);
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Play(1)).await.unwrap();
                assert!(session.is_modal_open());
                assert_eq!(session.selected().map(|r| r.name.as_str()), Some("a.wav"));
                assert!(matches!(session.state(), SessionState::Playing { paused: false, .. }));

                session.handle_action(UserAction::CloseModal).await.unwrap();
                assert!(!session.is_modal_open());
                assert!(session.selected().is_none());
                assert_eq!(session.state(), SessionState::Idle);
                assert_eq!(engine.calls(), vec![Call::StartPlayer, Call::StopPlayer]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_modal_stays_open_after_playback_ends_and_replays() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav"]);
                let (mut session, mut events) = coordinator(&engine, &catalog, Presentation::Modal);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Play(0)).await.unwrap();
                run_ticks(&mut session, &mut events, 100).await;

                assert_eq!(session.state(), SessionState::Idle);
                assert!(session.is_modal_open());
                assert_eq!(engine.count(Call::StopPlayer), 1);

                session.handle_action(UserAction::TogglePlayback).await.unwrap();
                assert!(matches!(session.state(), SessionState::Playing { position: 0, .. }));
                assert_eq!(engine.count(Call::StartPlayer), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_reselect_toggles_in_place() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav", "b.wav"]);
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Inline);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Play(0)).await.unwrap();
                assert!(!session.is_modal_open());

                session.handle_action(UserAction::Play(0)).await.unwrap();
                assert!(matches!(session.state(), SessionState::Playing { paused: true, .. }));
                session.handle_action(UserAction::Play(0)).await.unwrap();
                assert!(matches!(session.state(), SessionState::Playing { paused: false, .. }));

                session.handle_action(UserAction::Play(1)).await.unwrap();
                assert_eq!(session.selected().map(|r| r.name.as_str()), Some("a.wav"));
                assert_eq!(
                    engine.calls(),
                    vec![
                        Call::StartPlayer,
                        Call::PausePlayer,
                        Call::ResumePlayer,
                        Call::StopPlayer,
                        Call::StartPlayer,
                    ]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_preempts_playback() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav"]);
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Play(0)).await.unwrap();
                session.handle_action(UserAction::Record).await.unwrap();

                assert_eq!(session.state(), SessionState::Recording { paused: false });
                assert!(!session.is_modal_open());
                assert_eq!(
                    engine.calls(),
                    vec![Call::StartPlayer, Call::StopPlayer, Call::StartRecorder]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_after_finished_playback_closes_panel() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav"]);
                let (mut session, mut events) = coordinator(&engine, &catalog, Presentation::Modal);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Play(0)).await.unwrap();
                run_ticks(&mut session, &mut events, 100).await;
                assert!(session.is_modal_open());

                session.handle_action(UserAction::Record).await.unwrap();

                let view = session.view();
                assert_eq!(view.state, SessionState::Recording { paused: false });
                assert!(!view.modal_open);
                assert!(view.selected.is_none());
                assert_eq!(engine.count(Call::StopPlayer), 1);
                assert!(!ModalPresenter.render(&view).contains('┌'));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_while_recording_rejected() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav"]);
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Inline);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Record).await.unwrap();
                let err = session.handle_action(UserAction::Play(0)).await.unwrap_err();
                assert!(err.is_invalid_transition());
                assert_eq!(session.state(), SessionState::Recording { paused: false });
                assert_eq!(engine.count(Call::StartPlayer), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_index_rejected() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::default();
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);

                let err = session.handle_action(UserAction::Play(3)).await.unwrap_err();
                assert!(matches!(err, SessionError::UnknownRecording(3)));
                assert!(engine.calls().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_stop_route_to_active_controller() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav"]);
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);
                session.refresh_catalog().unwrap();

                session.handle_action(UserAction::Record).await.unwrap();
                session.handle_action(UserAction::Pause).await.unwrap();
                assert_eq!(session.state(), SessionState::Recording { paused: true });
                session.handle_action(UserAction::Resume).await.unwrap();
                session.handle_action(UserAction::Stop).await.unwrap();

                session.handle_action(UserAction::Play(0)).await.unwrap();
                session.handle_action(UserAction::Pause).await.unwrap();
                session.handle_action(UserAction::Stop).await.unwrap();

                assert_eq!(
                    engine.calls(),
                    vec![
                        Call::StartRecorder,
                        Call::PauseRecorder,
                        Call::ResumeRecorder,
                        Call::StopRecorder,
                        Call::StartPlayer,
                        Call::PausePlayer,
                        Call::StopPlayer,
                    ]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_active_recording() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::default();
                let (mut session, _events) = coordinator(&engine, &catalog, Presentation::Modal);

                session.handle_action(UserAction::Record).await.unwrap();
                session.handle_action(UserAction::Shutdown).await.unwrap();
                assert_eq!(session.state(), SessionState::Idle);
                assert_eq!(engine.count(Call::StopRecorder), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_drives_spawned_coordinator() {
        LocalSet::new()
            .run_until(async {
                let engine = MockEngine::new();
                let catalog = FakeCatalog::with(&["a.wav"]);
                let (session, events) = coordinator(&engine, &catalog, Presentation::Modal);
                let (handle, task) = session.spawn(events);
                let mut views = handle.subscribe();

                handle.dispatch(UserAction::Refresh).await.unwrap();
                handle.dispatch(UserAction::Play(0)).await.unwrap();
                assert!(views.has_changed().unwrap());
                let view = views.borrow_and_update().clone();
                assert!(view.modal_open);
                assert_eq!(view.recordings.len(), 1);
                assert!(matches!(view.state, SessionState::Playing { .. }));

                tokio::time::advance(TICK).await;
                settle().await;
                assert!(matches!(
                    views.borrow().state,
                    SessionState::Playing { position: 1, .. }
                ));

                handle.dispatch(UserAction::Shutdown).await.unwrap();
                task.await.unwrap();
                assert_eq!(engine.count(Call::StopPlayer), 1);
                assert!(matches!(
                    handle.dispatch(UserAction::Refresh).await,
                    Err(SessionError::Closed)
                ));
            })
            .await;
    }
}
