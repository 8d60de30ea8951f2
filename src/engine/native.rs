use super::{AudioEngine, FinishListener};
use crate::audio::{AudioFormat, AudioSink, InputCapture, Playback, WavSink, wav_sink};
use crate::error::EngineError;
use async_trait::async_trait;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How often the player checks whether the sink has drained
const FINISH_POLL: Duration = Duration::from_millis(50);

struct ActiveRecording {
    path: PathBuf,
    capture: InputCapture,
    stop_tx: oneshot::Sender<()>,
    writer: JoinHandle<anyhow::Result<u64>>,
}

struct ActivePlayback {
    playback: Rc<Playback>,
    watcher: JoinHandle<()>,
}

/// Engine backed by the host's default input and output devices
///
/// Recording goes cpal -> ring buffer -> writer task -> WAV thread. Playback
/// goes through a rodio sink, with a local task watching for end-of-media.
/// Holds !Send device handles, so it must be used from a LocalSet.
pub struct NativeEngine {
    format: AudioFormat,
    recorder: RefCell<Option<ActiveRecording>>,
    player: RefCell<Option<ActivePlayback>>,
}

impl NativeEngine {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            recorder: RefCell::new(None),
            player: RefCell::new(None),
        }
    }

    /// Open the input with `open_input` and only then create the file at
    /// `path`, so a device failure leaves nothing behind in the catalog
    fn open_pipeline<I>(
        path: &Path,
        format: AudioFormat,
        open_input: impl FnOnce(mpsc::Sender<Vec<f32>>) -> anyhow::Result<I>,
    ) -> anyhow::Result<(I, WavSink, mpsc::Receiver<Vec<f32>>)> {
        let (chunk_tx, chunk_rx) = mpsc::channel(64);
        let input = open_input(chunk_tx)?;
        let sink = WavSink::create(path, format)?;
        Ok((input, sink, chunk_rx))
    }

    async fn write_recording(
        mut sink: Box<dyn AudioSink>,
        mut chunks: mpsc::Receiver<Vec<f32>>,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> anyhow::Result<u64> {
        loop {
            tokio::select! {
                chunk = chunks.recv() => match chunk {
                    Some(chunk) => sink.write_chunk(chunk)?,
                    None => break,
                },
                _ = &mut stop_rx => {
                    while let Ok(chunk) = chunks.try_recv() {
                        sink.write_chunk(chunk)?;
                    }
                    break;
                }
            }
        }

        sink.finalize().await
    }

    async fn watch_for_finish(playback: Rc<Playback>, listener: FinishListener) {
        let mut ticker = tokio::time::interval(FINISH_POLL);
        loop {
            ticker.tick().await;
            if playback.is_finished() {
                listener.notify();
                return;
            }
        }
    }
}

#[async_trait(?Send)]
impl AudioEngine for NativeEngine {
    async fn start_recorder(&self, path: &Path) -> Result<(), EngineError> {
        if self.recorder.borrow().is_some() {
            return Err(EngineError::Busy("recorder"));
        }

        let format = self.format;
        let (capture, sink, chunk_rx) =
            Self::open_pipeline(path, format, |chunk_tx| InputCapture::open(format, chunk_tx))?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let writer =
            tokio::task::spawn_local(Self::write_recording(Box::new(sink), chunk_rx, stop_rx));

        *self.recorder.borrow_mut() = Some(ActiveRecording {
            path: path.to_path_buf(),
            capture,
            stop_tx,
            writer,
        });

        tracing::info!("Recorder writing to {}", path.display());
        Ok(())
    }

    async fn pause_recorder(&self) -> Result<(), EngineError> {
        let recorder = self.recorder.borrow();
        let active = recorder.as_ref().ok_or(EngineError::NotActive("recorder"))?;

        active.capture.pause();
        Ok(())
    }

    async fn resume_recorder(&self) -> Result<(), EngineError> {
        let recorder = self.recorder.borrow();
        let active = recorder.as_ref().ok_or(EngineError::NotActive("recorder"))?;

        active
            .capture
            .resume()
            .map_err(|e| EngineError::Device(format!("{:#}", e)))
    }

    async fn stop_recorder(&self) -> Result<(), EngineError> {
        let active = self
            .recorder
            .borrow_mut()
            .take()
            .ok_or(EngineError::NotActive("recorder"))?;

        drop(active.capture);
        let _ = active.stop_tx.send(());

        let written = active
            .writer
            .await
            .map_err(|e| EngineError::Device(format!("recording writer panicked: {}", e)))??;

        tracing::info!(
            "Recorder finalized {} ({:.1}s)",
            active.path.display(),
            self.format.duration_of(written)
        );
        Ok(())
    }

    async fn start_player(&self, path: &Path, on_finish: FinishListener) -> Result<(), EngineError> {
        if self.player.borrow().is_some() {
            return Err(EngineError::Busy("player"));
        }

        let playback = Rc::new(Playback::open(path)?);
        tracing::debug!("Player session {:?} opened {}", on_finish.session(), path.display());
        let watcher = tokio::task::spawn_local(Self::watch_for_finish(playback.clone(), on_finish));

        *self.player.borrow_mut() = Some(ActivePlayback { playback, watcher });
        Ok(())
    }

    async fn pause_player(&self) -> Result<(), EngineError> {
        let player = self.player.borrow();
        let active = player.as_ref().ok_or(EngineError::NotActive("player"))?;
        active.playback.pause();
        Ok(())
    }

    async fn resume_player(&self) -> Result<(), EngineError> {
        let player = self.player.borrow();
        let active = player.as_ref().ok_or(EngineError::NotActive("player"))?;
        active.playback.resume();
        Ok(())
    }

    async fn stop_player(&self) -> Result<(), EngineError> {
        let active = self
            .player
            .borrow_mut()
            .take()
            .ok_or(EngineError::NotActive("player"))?;

        // Aborting the watcher drops the session's listener with it
        active.watcher.abort();
        active.playback.stop();
        Ok(())
    }

    fn input_level(&self) -> Option<f32> {
        self.recorder.borrow().as_ref().map(|active| active.capture.level())
    }

    async fn waveform(&self, path: &Path, bars: usize) -> Option<Vec<f32>> {
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav {
            return None;
        }

        let path = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || wav_sink::summarize_file(&path, bars)).await;
        match result {
            Ok(Ok(bars)) => Some(bars),
            Ok(Err(e)) => {
                tracing::warn!("Could not summarize waveform: {:#}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Waveform task failed: {}", e);
                None
            }
        }
    }
}
