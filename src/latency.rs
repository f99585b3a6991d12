//! Rolling-window p99 latency spike detector with consecutive-breach
//! confirmation (spec.md §4.7).
//!
//! The p99 is computed by *position*, not by interpolated rank:
//! `floor(0.99 * len)` into an ascending sort. This is deliberately not a
//! textbook percentile. spec.md §9 calls this out explicitly as a
//! behavior to preserve, not "fix".

use std::collections::VecDeque;

pub struct LatencySpikeDetector {
    buffer_size: usize,
    threshold_ms: u32,
    consecutive_required: u32,
    window: VecDeque<i64>,
    consecutive_spikes: u32,
}

impl LatencySpikeDetector {
    pub fn new(buffer_size: usize, threshold_ms: u32, consecutive_required: u32) -> Self {
        LatencySpikeDetector {
            buffer_size,
            threshold_ms,
            consecutive_required,
            window: VecDeque::with_capacity(buffer_size.min(4096)),
            consecutive_spikes: 0,
        }
    }

    /// Feed one `(ingest_ts_ms, recv_ts_ms)` sample. Returns `true` iff
    /// this sample confirms a spike (the `consecutive_required`-th
    /// consecutive p99 breach).
    pub fn add_sample(&mut self, ingest_ts_ms: i64, recv_ts_ms: i64) -> bool {
        let latency = (recv_ts_ms - ingest_ts_ms).max(0);
        self.window.push_back(latency);
        while self.window.len() > self.buffer_size {
            self.window.pop_front();
        }

        if self.window.len() < 100 {
            return false;
        }

        let p99 = self.percentile_at_position();
        if p99 > self.threshold_ms as i64 {
            self.consecutive_spikes += 1;
            if self.consecutive_spikes >= self.consecutive_required {
                self.consecutive_spikes = 0;
                return true;
            }
            false
        } else {
            self.consecutive_spikes = 0;
            false
        }
    }

    /// p99 by the same positional formula, usable whenever the window
    /// holds at least 10 samples (else 0), for human-readable incident
    /// metadata only.
    pub fn get_p99(&self) -> i64 {
        if self.window.len() < 10 {
            0
        } else {
            self.percentile_at_position()
        }
    }

    fn percentile_at_position(&self) -> i64 {
        let mut sorted: Vec<i64> = self.window.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((0.99 * sorted.len() as f64) as usize).min(sorted.len() - 1);
        sorted[idx]
    }
}
