//! Optional Background Expiry Sweeper
//!
//! TideKV expires keys lazily: an entry past its deadline is removed the next
//! time its key is read. A key that is never read again stays in memory.
//! Starting the server with `--active-expiry` spawns this sweeper, which
//! periodically calls [`StorageEngine::cleanup_expired`]. It takes the same
//! shard locks as `get` and `set`, so it cannot race with them.
//!
//! The interval adapts: when a large fraction of keys turn out to be expired
//! the sweeper runs more often, and it backs off while nothing expires.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval before the first sweep (default: 100ms)
    pub base_interval: Duration,

    /// Lower bound on the interval (default: 10ms)
    pub min_interval: Duration,

    /// Upper bound on the interval (default: 1s)
    pub max_interval: Duration,

    /// Expired fraction above which the sweeper speeds up
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

/// Handle to a running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
        debug!("Background expiry sweeper stopped");
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }

        let keys_before = engine.len();
        let expired = engine.cleanup_expired();

        current_interval = next_interval(&config, current_interval, keys_before, expired);

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                next_sweep_ms = current_interval.as_millis() as u64,
                "Expired keys cleaned up"
            );
        } else {
            trace!(
                next_sweep_ms = current_interval.as_millis() as u64,
                "Sweep found nothing"
            );
        }
    }
}

/// Picks the delay before the next sweep.
fn next_interval(
    config: &ExpiryConfig,
    current: Duration,
    keys_before: usize,
    expired: u64,
) -> Duration {
    if expired == 0 {
        return (current * 2).min(config.max_interval);
    }

    let rate = expired as f64 / keys_before.max(1) as f64;
    if rate > config.speedup_threshold {
        (current / 2).max(config.min_interval)
    } else {
        current
    }
}
