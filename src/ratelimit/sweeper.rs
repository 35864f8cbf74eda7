//! Background sweeping of idle client keys.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::limiter::SlidingWindowLimiter;

/// Spawn a task that periodically drops keys with no requests left in the
/// window, bounding memory by the number of active clients.
///
/// The task exits once `shutdown` observes `true` or its sender is dropped.
pub fn spawn_sweeper(
    limiter: Arc<SlidingWindowLimiter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(interval = ?interval, "Key sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep(Instant::now());
                    debug!(
                        removed = removed,
                        tracked = limiter.tracked_keys(),
                        "Sweep completed"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Key sweeper stopped");
    })
}
