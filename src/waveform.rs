use crate::audio::format::rms;
use rand::Rng;
use std::collections::VecDeque;

/// Bar heights produced when no real input level is available
pub const SYNTHETIC_MIN: f32 = 10.0;
pub const SYNTHETIC_MAX: f32 = 110.0;

/// Fixed-capacity sliding window of amplitude samples
///
/// Once full, every push evicts the oldest sample so the buffer always holds
/// the most recent `capacity` values in push order.
#[derive(Debug, Clone)]
pub struct WaveformBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl WaveformBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f32) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        // NaN fails the comparison and lands on 0.0 as well
        let sample = if sample > 0.0 { sample } else { 0.0 };
        self.samples.push_back(sample);
    }

    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Stand-in amplitude for engines that expose no input metering
pub fn synthetic_amplitude(rng: &mut impl Rng) -> f32 {
    rng.random_range(SYNTHETIC_MIN..SYNTHETIC_MAX)
}

/// Map a normalized RMS level (0.0 - 1.0) onto the synthetic bar range
pub fn level_to_amplitude(level: f32) -> f32 {
    let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    SYNTHETIC_MIN + level * (SYNTHETIC_MAX - SYNTHETIC_MIN)
}

/// `bars` synthetic amplitudes, used as a playback reference when the file
/// cannot be summarized
pub fn synthetic_bars(bars: usize, rng: &mut impl Rng) -> Vec<f32> {
    (0..bars).map(|_| synthetic_amplitude(rng)).collect()
}

/// Reduce PCM samples to `bars` RMS values
pub fn summarize(samples: &[f32], bars: usize) -> Vec<f32> {
    if bars == 0 {
        return Vec::new();
    }
    let per_bar = samples.len() / bars;
    if per_bar == 0 {
        return vec![0.0; bars];
    }

    (0..bars)
        .map(|i| rms(&samples[i * per_bar..(i + 1) * per_bar]))
        .collect()
}
