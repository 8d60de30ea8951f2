use anyhow::Result;
use async_trait::async_trait;

/// Streaming encoder for captured audio
///
/// Chunks are written as they arrive instead of being buffered for the whole
/// recording.
#[async_trait]
pub trait AudioSink: Send {
    /// Write audio samples (called repeatedly while recording)
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Flush and close the file, returning the number of samples written
    async fn finalize(&mut self) -> Result<u64>;
}
