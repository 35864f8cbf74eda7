//! Per-key request log.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of admitted requests for one client, oldest first.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    timestamps: VecDeque<Instant>,
}

impl RequestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp at least `window` older than `now`.
    ///
    /// Returns the number of removed entries. A timestamp exactly `window`
    /// old is expired.
    pub fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Append an admitted request.
    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    /// Number of retained timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The oldest retained timestamp, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.timestamps.front().copied()
    }

    /// Count the timestamps still inside the window without pruning.
    pub fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < window)
            .count()
    }

    /// Time until enough entries leave the window for the count to drop
    /// below `limit`.
    ///
    /// With room to spare this is the expiry of the oldest entry. When the
    /// log holds `limit` or more entries, it is the expiry of the entry at
    /// `len - limit`.
    pub fn duration_until_slot(&self, now: Instant, window: Duration, limit: usize) -> Duration {
        let index = self.timestamps.len().saturating_sub(limit.max(1));
        match self.timestamps.get(index) {
            Some(&t) => window.saturating_sub(now.saturating_duration_since(t)),
            None => Duration::ZERO,
        }
    }

    /// Iterate over retained timestamps, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.timestamps.iter()
    }
}
