//! Background expirer.
//!
//! Reads never reclaim expired chains, so a key that is written with a
//! TTL and never touched again would otherwise sit in memory forever.
//! The expirer is a single tokio task on a fixed ticker: each pass
//! drains the due keys from the TTL index and removes the ones whose
//! newest version is still expired. It holds at most one shard write
//! lock at a time, for the duration of one removal.

use crate::storage::engine::VersionedStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Period between expirer passes.
pub const TTL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the running expirer task.
///
/// Dropping the handle stops the task, so the store's lifecycle is
/// construct, [`Expirer::start`], serve, drop.
#[derive(Debug)]
pub struct Expirer {
    shutdown_tx: watch::Sender<bool>,
}

impl Expirer {
    /// Spawns the expirer loop over `store`.
    pub fn start(store: Arc<VersionedStore>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(expirer_loop(store, shutdown_rx));
        info!("background expirer started");

        Self { shutdown_tx }
    }

    /// Signals the expirer task to exit. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Expirer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn expirer_loop(store: Arc<VersionedStore>, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(TTL_CHECK_INTERVAL) => {
                let removed = store.remove_expired();
                if removed > 0 {
                    debug!(removed, "expired keys removed");
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expirer received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Starts the expirer over `store` with the default interval.
pub fn start_expirer(store: Arc<VersionedStore>) -> Expirer {
    Expirer::start(store)
}
