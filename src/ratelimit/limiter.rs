//! Core sliding-window limiter implementation.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::key::ClientKey;
use super::policy::WindowPolicy;
use super::window::RequestLog;
use crate::error::Result;

/// Outcome of a rate limit check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The request fits in the window and was recorded
    Admit,
    /// The window is full; nothing was recorded
    Reject,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit)
    }
}

/// A decision together with the state of the key's window after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitStatus {
    /// Admit or reject
    pub decision: Decision,
    /// Configured maximum requests per window
    pub limit: u32,
    /// Requests still available in the current window
    pub remaining: u32,
    /// Time until enough retained requests leave the window for the next
    /// one to be admitted
    pub reset_after: Duration,
}

/// Per-client sliding-window rate limiter.
///
/// Each client key owns a log of admitted request timestamps. The limiter is
/// `Send + Sync` and meant to be shared behind an `Arc`. Logs are stored in a
/// sharded map; checking a key holds its shard's write guard for the whole
/// prune/count/append sequence, so concurrent requests for the same key
/// cannot both take the last slot.
pub struct SlidingWindowLimiter {
    /// Request logs indexed by client key
    logs: DashMap<ClientKey, RequestLog>,
    /// Active limits
    policy: RwLock<WindowPolicy>,
}

impl SlidingWindowLimiter {
    /// Create a new limiter enforcing the given policy.
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            logs: DashMap::new(),
            policy: RwLock::new(policy),
        }
    }

    /// Create a new limiter from raw limits, failing on degenerate values.
    pub fn from_limits(max_requests: u32, window: Duration) -> Result<Self> {
        Ok(Self::new(WindowPolicy::new(max_requests, window)?))
    }

    /// Decide whether a request from `key` at `now` is admitted.
    ///
    /// Stale timestamps are pruned first. An admitted request is recorded;
    /// a rejected one is not. `now` must not go backwards for a given key.
    pub fn check_and_record(&self, key: &str, now: Instant) -> Result<Decision> {
        Ok(self.check(key, now)?.decision)
    }

    /// Like [`check_and_record`](Self::check_and_record), also reporting
    /// the remaining quota and time until a slot frees up.
    pub fn check(&self, key: &str, now: Instant) -> Result<LimitStatus> {
        let key = ClientKey::new(key)?;
        Ok(self.check_key(&key, now))
    }

    /// Check a request against the current time.
    ///
    /// The clock is read while the key's shard is locked, so racing callers
    /// for one key append timestamps in order.
    pub fn check_now(&self, key: &ClientKey) -> LimitStatus {
        self.check_with_clock(key, Instant::now)
    }

    /// Check a request for an already validated key.
    pub fn check_key(&self, key: &ClientKey, now: Instant) -> LimitStatus {
        self.check_with_clock(key, || now)
    }

    fn check_with_clock(&self, key: &ClientKey, clock: impl FnOnce() -> Instant) -> LimitStatus {
        let policy = *self.policy.read();
        let window = policy.window();
        let limit = policy.max_requests();

        let mut log = self.logs.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, limit = limit, window = ?window, "Tracking new client key");
            RequestLog::new()
        });
        let now = clock();

        let pruned = log.prune(now, window);
        let decision = if log.len() >= limit as usize {
            Decision::Reject
        } else {
            log.record(now);
            Decision::Admit
        };

        let in_window = log.len();
        let reset_after = log.duration_until_slot(now, window, limit as usize);
        drop(log);

        trace!(
            key = %key,
            pruned = pruned,
            in_window = in_window,
            decision = ?decision,
            "Checked rate limit"
        );

        if decision == Decision::Reject {
            debug!(key = %key, retry_after = ?reset_after, "Rate limit exceeded");
        }

        LimitStatus {
            decision,
            limit,
            remaining: limit.saturating_sub(u32::try_from(in_window).unwrap_or(u32::MAX)),
            reset_after,
        }
    }

    /// Prune every log and drop keys left with no timestamps.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let window = self.policy.read().window();
        let mut removed = 0;

        self.logs.retain(|_, log| {
            log.prune(now, window);
            let keep = !log.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed = removed, remaining = self.logs.len(), "Swept idle client keys");
        }
        removed
    }

    /// Replace the active policy. Existing logs are kept and judged by the
    /// new limits from the next check on.
    pub fn set_policy(&self, policy: WindowPolicy) {
        let mut current = self.policy.write();
        debug!(
            max_requests = policy.max_requests(),
            window = ?policy.window(),
            "Updating rate limit policy"
        );
        *current = policy;
    }

    /// Get the active policy.
    pub fn policy(&self) -> WindowPolicy {
        *self.policy.read()
    }

    /// Number of requests from `key` still inside the window at `now`.
    ///
    /// Returns `None` if the key has never been seen (or was swept).
    pub fn request_count(&self, key: &ClientKey, now: Instant) -> Option<usize> {
        let window = self.policy.read().window();
        self.logs.get(key).map(|log| log.count_within(now, window))
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.logs.len()
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.logs.clear();
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(WindowPolicy::default())
    }
}
