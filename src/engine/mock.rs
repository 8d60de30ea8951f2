//! Scripted engine and helpers for controller tests

use super::{AudioEngine, FinishListener};
use crate::error::EngineError;
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    StartRecorder,
    PauseRecorder,
    ResumeRecorder,
    StopRecorder,
    StartPlayer,
    PausePlayer,
    ResumePlayer,
    StopPlayer,
}

#[derive(Default)]
pub struct MockEngine {
    calls: RefCell<Vec<Call>>,
    failing: RefCell<HashSet<Call>>,
    listener: RefCell<Option<FinishListener>>,
    paths: RefCell<Vec<PathBuf>>,
    level: Cell<Option<f32>>,
    waveform: RefCell<Option<Vec<f32>>>,
}

impl MockEngine {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Make every subsequent `call` fail
    pub fn fail(&self, call: Call) {
        self.failing.borrow_mut().insert(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.borrow().iter().filter(|c| **c == call).count()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.borrow().clone()
    }

    pub fn set_level(&self, level: Option<f32>) {
        self.level.set(level);
    }

    pub fn set_waveform(&self, bars: Vec<f32>) {
        *self.waveform.borrow_mut() = Some(bars);
    }

    /// Take the listener registered by the last successful `start_player`
    pub fn take_listener(&self) -> Option<FinishListener> {
        self.listener.borrow_mut().take()
    }

    fn record(&self, call: Call) -> Result<(), EngineError> {
        self.calls.borrow_mut().push(call);
        if self.failing.borrow().contains(&call) {
            return Err(EngineError::Device(format!("scripted {:?} failure", call)));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl AudioEngine for MockEngine {
    async fn start_recorder(&self, path: &Path) -> Result<(), EngineError> {
        self.record(Call::StartRecorder)?;
        self.paths.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    async fn pause_recorder(&self) -> Result<(), EngineError> {
        self.record(Call::PauseRecorder)
    }

    async fn resume_recorder(&self) -> Result<(), EngineError> {
        self.record(Call::ResumeRecorder)
    }

    async fn stop_recorder(&self) -> Result<(), EngineError> {
        self.record(Call::StopRecorder)
    }

    async fn start_player(&self, path: &Path, on_finish: FinishListener) -> Result<(), EngineError> {
        self.record(Call::StartPlayer)?;
        self.paths.borrow_mut().push(path.to_path_buf());
        *self.listener.borrow_mut() = Some(on_finish);
        Ok(())
    }

    async fn pause_player(&self) -> Result<(), EngineError> {
        self.record(Call::PausePlayer)
    }

    async fn resume_player(&self) -> Result<(), EngineError> {
        self.record(Call::ResumePlayer)
    }

    async fn stop_player(&self) -> Result<(), EngineError> {
        self.listener.borrow_mut().take();
        self.record(Call::StopPlayer)
    }

    fn input_level(&self) -> Option<f32> {
        self.level.get()
    }

    async fn waveform(&self, _path: &Path, _bars: usize) -> Option<Vec<f32>> {
        self.waveform.borrow().clone()
    }
}

/// Let spawned local tasks (clock schedules) run after time moved
pub async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}
