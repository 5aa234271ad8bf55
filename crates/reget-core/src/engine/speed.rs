//! Moving-average transfer rate
//!
//! Keeps only the samples covering roughly the last megabyte of transfer so
//! the reported rate follows recent throughput rather than the lifetime average.

use std::collections::VecDeque;

/// Bytes of transfer the sample window should span
const WINDOW_BYTES: u64 = 1024 * 1024;

/// Bounded window of `(bytes, milliseconds)` rate samples
#[derive(Debug, Clone, Default)]
pub struct SpeedSampler {
    samples: VecDeque<(u64, u64)>,
    /// Sum of the bytes held in `samples`
    window_bytes: u64,
}

impl SpeedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `bytes` arrived over `millis` milliseconds
    pub fn record(&mut self, bytes: u64, millis: u64) {
        // Sub-millisecond chunks still count, just at the 1ms floor
        self.samples.push_back((bytes, millis.max(1)));
        self.window_bytes += bytes;

        // The newest sample always stays, however large
        while self.window_bytes > WINDOW_BYTES && self.samples.len() > 1 {
            if let Some((old, _)) = self.samples.pop_front() {
                self.window_bytes -= old;
            }
        }
    }

    /// Mean of the stored per-sample rates, in bytes per second
    pub fn current_rate(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&(bytes, millis)| bytes as f64 * 1000.0 / millis as f64)
            .sum();
        (sum / self.samples.len() as f64) as u64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bytes covered by the stored samples
    pub fn window_bytes(&self) -> u64 {
        self.window_bytes
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.window_bytes = 0;
    }
}
