//! Sliding message windows for flood detection.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of one user's recent messages in one channel.
#[derive(Debug, Default)]
pub struct FloodWindow {
    stamps: VecDeque<Instant>,
}

impl FloodWindow {
    /// Drop entries older than `timeframe` before `now`.
    pub fn prune(&mut self, now: Instant, timeframe: Duration) {
        while let Some(&t) = self.stamps.front() {
            if now.saturating_duration_since(t) > timeframe {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a message and return how many remain in the window.
    pub fn record(&mut self, now: Instant, timeframe: Duration) -> usize {
        self.prune(now, timeframe);
        self.stamps.push_back(now);
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
