use anyhow::{Context, Result};
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One file playing on the default output device
///
/// Dropping it releases the output stream, which silences the sink.
pub struct Playback {
    sink: Sink,
    _stream: OutputStream,
}

impl Playback {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;

        let stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open default output stream")?;

        let sink = rodio::play(stream.mixer(), BufReader::new(file))
            .with_context(|| format!("Failed to decode {}", path.display()))?;

        tracing::debug!("Playback opened: {}", path.display());
        Ok(Self {
            sink,
            _stream: stream,
        })
    }

    pub fn pause(&self) {
        self.sink.pause();
    }

    pub fn resume(&self) {
        self.sink.play();
    }

    pub fn stop(&self) {
        self.sink.stop();
    }

    /// True once every queued source has played out
    pub fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}
