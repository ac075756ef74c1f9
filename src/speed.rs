//! Ring-buffer smoother turning byte deltas into a reported bytes/sec.
//!
//! A wget-style smoother: stable mid-download, converges quickly at
//! start/end, without the jitter a naive "bytes since last tick" estimate
//! would produce on short reads.

use std::collections::VecDeque;
use std::time::Duration;

/// Fixed capacity of the sample ring buffer.
const CAPACITY: usize = 20;

/// Samples shorter than this are not admitted - they're too noisy to be
/// worth smoothing over.
const MIN_SAMPLE_DURATION: Duration = Duration::from_millis(150);

/// One `(bytes, duration)` observation.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    bytes: u64,
    duration: Duration,
}

/// Smooths short-interval byte/duration samples into a stable speed.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    samples: VecDeque<Sample>,
    total_bytes: u64,
    total_duration: Duration,
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(CAPACITY),
            total_bytes: 0,
            total_duration: Duration::ZERO,
        }
    }

    /// Admits a new sample. A no-op when `duration < 150ms`. When the
    /// buffer is already full, the oldest sample is evicted and its totals
    /// subtracted before the new one is admitted.
    pub fn add_sample(&mut self, bytes: u64, duration: Duration) {
        if duration < MIN_SAMPLE_DURATION {
            return;
        }

        if self.samples.len() == CAPACITY {
            if let Some(evicted) = self.samples.pop_front() {
                self.total_bytes -= evicted.bytes;
                self.total_duration -= evicted.duration;
            }
        }

        self.total_bytes += bytes;
        self.total_duration += duration;
        self.samples.push_back(Sample { bytes, duration });
    }

    /// `(Σbytes + recent_bytes) / (Σtime + recent_time)`, or 0 when the
    /// denominator is non-positive. `recent_bytes`/`recent_time` represent
    /// bytes accumulated since the last admitted sample, giving a
    /// responsive current estimate without polluting the history.
    #[must_use]
    pub fn calculate_speed(&self, recent_bytes: u64, recent_time: Duration) -> f64 {
        let total_seconds = (self.total_duration + recent_time).as_secs_f64();
        if total_seconds <= 0.0 {
            return 0.0;
        }

        (self.total_bytes + recent_bytes) as f64 / total_seconds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
