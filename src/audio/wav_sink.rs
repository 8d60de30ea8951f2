use super::format::AudioFormat;
use super::sink::AudioSink;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

enum WavCommand {
    Write(Vec<f32>),
    Finalize { reply: oneshot::Sender<Result<u64>> },
}

/// WAV encoder with its file I/O on a dedicated thread
///
/// Chunks are queued to the writer thread so the capture path never blocks on
/// disk.
pub struct WavSink {
    tx: mpsc::UnboundedSender<WavCommand>,
}

impl WavSink {
    pub fn create(path: &Path, format: AudioFormat) -> Result<Self> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file {}", path.display()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || write_loop(writer, rx));

        Ok(Self { tx })
    }
}

fn write_loop(mut writer: WavWriter<BufWriter<File>>, mut rx: mpsc::UnboundedReceiver<WavCommand>) {
    let mut written: u64 = 0;
    let mut failed: Option<String> = None;

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            WavCommand::Write(samples) => {
                if failed.is_some() {
                    continue;
                }
                for sample in samples {
                    let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    if let Err(e) = writer.write_sample(amplitude) {
                        tracing::error!("Failed to write sample: {}", e);
                        failed = Some(e.to_string());
                        break;
                    }
                    written += 1;
                }
            }
            WavCommand::Finalize { reply } => {
                let result = match failed {
                    Some(reason) => Err(anyhow!("WAV write failed earlier: {}", reason)),
                    None => writer
                        .finalize()
                        .map(|_| written)
                        .map_err(|e| anyhow!("Failed to finalize WAV: {}", e)),
                };
                let _ = reply.send(result);
                return;
            }
        }
    }
}

#[async_trait]
impl AudioSink for WavSink {
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()> {
        self.tx
            .send(WavCommand::Write(samples))
            .map_err(|_| anyhow!("WAV writer thread has exited"))
    }

    async fn finalize(&mut self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WavCommand::Finalize { reply })
            .map_err(|_| anyhow!("WAV writer thread has exited"))?;

        rx.await
            .map_err(|e| anyhow!("Failed to receive finalize response: {}", e))?
    }
}

/// Read a WAV file and reduce it to `bars` RMS values
pub fn summarize_file(path: &Path, bars: usize) -> Result<Vec<f32>> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(crate::waveform::summarize(&samples, bars))
}
