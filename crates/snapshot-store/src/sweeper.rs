//! Background expiry sweeper.
//!
//! [`ExpirySweeper`] runs [`ImageRecordManager::expire_now`] once right
//! away and then on every interval tick, the way a gallery screen does while
//! it is on display. Each sweep runs on tokio's blocking pool, since it takes
//! the manager lock and does SQLite and file I/O. [`ExpirySweeper::stop`]
//! waits for the task to finish, so once it returns the sweeper will never
//! touch the manager again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::blob::BlobStore;
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::manager::ImageRecordManager;
use crate::record::RecordStore;

/// A manager shared between the caller and a sweeper.
pub type SharedManager<B, R, C> = Arc<Mutex<ImageRecordManager<B, R, C>>>;

/// Handle to a running periodic expiry sweep.
pub struct ExpirySweeper {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn start<B, R, C>(manager: SharedManager<B, R, C>, interval: Duration) -> Self
    where
        B: BlobStore + 'static,
        R: RecordStore + 'static,
        C: Clock + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    // Only `true` is ever sent; a closed channel means the handle is gone.
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        let manager = Arc::clone(&manager);
                        match tokio::task::spawn_blocking(move || sweep_once(&manager)).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                let err = StoreError::from(e);
                                error!(%err, "sweep task failed, stopping sweeper");
                                break;
                            }
                        }
                    }
                }
            }

            info!("expiry sweeper stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Whether the background task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for it.
    pub async fn stop(mut self) -> StoreResult<()> {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        debug!("expiry sweeper shutdown complete");
        Ok(())
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("expiry sweeper dropped without stop, aborting");
            handle.abort();
        }
    }
}

/// Run one sweep on the calling thread. Returns `false` if the manager is
/// unusable.
fn sweep_once<B, R, C>(manager: &SharedManager<B, R, C>) -> bool
where
    B: BlobStore,
    R: RecordStore,
    C: Clock,
{
    match manager.lock() {
        Ok(mut manager) => {
            let removed = manager.expire_now();
            debug!(removed = removed.len(), "expiry sweep tick");
            true
        }
        Err(e) => {
            error!(error = %e, "manager mutex poisoned, stopping sweeper");
            false
        }
    }
}
