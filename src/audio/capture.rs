use super::format::{AudioFormat, rms};
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapRb, traits::*};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{Notify, mpsc};

/// Size of the chunks handed to the recording writer, in seconds
const CHUNK_SECONDS: f32 = 0.1;

/// Seconds of audio the ring buffer holds before the realtime side drops samples
const RING_SECONDS: f32 = 10.0;

/// State shared between the realtime callback and the engine
#[derive(Default)]
struct Meter {
    paused: AtomicBool,
    /// f32 bits of the RMS of the last callback buffer
    level: AtomicU32,
}

impl Meter {
    fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    fn set_level(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }
}

/// A live microphone stream feeding fixed-size chunks into a channel
///
/// While paused the callback discards samples and reports a zero level, so
/// nothing captured during the pause reaches the writer. The stream is !Send,
/// so the capture has to live on a LocalSet.
pub struct InputCapture {
    stream: cpal::Stream,
    meter: Arc<Meter>,
}

impl InputCapture {
    /// Open the default input device and start streaming into `chunk_tx`
    pub fn open(format: AudioFormat, chunk_tx: mpsc::Sender<Vec<f32>>) -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .context("No input audio device available")?;
        if let Ok(name) = device.name() {
            tracing::debug!("Using input device {}", name);
        }

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let ring = HeapRb::<f32>::new(format.samples_for_duration(RING_SECONDS));
        let (mut producer, consumer) = ring.split();
        let meter = Arc::new(Meter::default());
        let notify = Arc::new(Notify::new());

        let callback_meter = meter.clone();
        let callback_notify = notify.clone();
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if callback_meter.paused.load(Ordering::Relaxed) {
                        callback_meter.set_level(0.0);
                        return;
                    }
                    callback_meter.set_level(rms(data).min(1.0));
                    producer.push_slice(data);
                    callback_notify.notify_one();
                },
                move |err| {
                    tracing::error!("Audio input stream error: {}", err);
                },
                None,
            )
            .context("Failed to build input stream")?;

        stream.play().context("Failed to start input stream")?;

        let chunk_size = format.samples_for_duration(CHUNK_SECONDS).max(1);
        tokio::task::spawn_local(forward_chunks(consumer, chunk_tx, chunk_size, notify));

        tracing::info!(
            "Audio capture started ({} Hz, {} ch)",
            format.sample_rate,
            format.channels
        );
        Ok(Self { stream, meter })
    }

    /// Stop accepting samples. Hosts that cannot pause a stream still have
    /// their samples discarded by the callback.
    pub fn pause(&self) {
        self.meter.paused.store(true, Ordering::Relaxed);
        if let Err(e) = self.stream.pause() {
            tracing::warn!("Input stream does not support pausing: {}", e);
        }
    }

    pub fn resume(&self) -> Result<()> {
        self.stream.play().context("Failed to resume input stream")?;
        self.meter.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// RMS of the most recent input buffer, 0.0 - 1.0
    pub fn level(&self) -> f32 {
        self.meter.level()
    }
}

/// Drain the ring buffer into `chunk_size` chunks until the receiver is gone
async fn forward_chunks(
    mut consumer: impl Consumer<Item = f32>,
    tx: mpsc::Sender<Vec<f32>>,
    chunk_size: usize,
    notify: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = notify.notified() => {}
            _ = tx.closed() => break,
        }

        while consumer.occupied_len() >= chunk_size {
            let mut chunk = vec![0.0f32; chunk_size];
            let n = consumer.pop_slice(&mut chunk);
            chunk.truncate(n);

            if tx.send(chunk).await.is_err() {
                return;
            }
        }
    }

    tracing::debug!("Capture forwarding exited");
}
