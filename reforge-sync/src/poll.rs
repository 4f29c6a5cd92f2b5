//! Periodic poll fallback (component C7).

use crate::checkpoint::CheckpointLoader;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct PollLoop {
    interval: Duration,
    loader: Arc<CheckpointLoader>,
    on_unauthorized: Arc<dyn Fn() + Send + Sync>,
}

impl PollLoop {
    pub fn new(
        interval: Duration,
        loader: Arc<CheckpointLoader>,
        on_unauthorized: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            interval,
            loader,
            on_unauthorized,
        }
    }

    /// Runs until `shutdown` fires, issuing one checkpoint GET per tick (no cache
    /// fallback — the disk cache is only consulted during bootstrap).
    pub async fn run(&self, shutdown: Arc<Shutdown>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => return,
            }
            if shutdown.is_shutting_down() {
                return;
            }
            match self.loader.load_checkpoint_without_cache().await {
                Ok(_) => {}
                Err(err) if err.is_unauthorized() => {
                    (self.on_unauthorized)();
                    return;
                }
                Err(err) => warn!(error = %err, "poll loop checkpoint fetch failed"),
            }
        }
    }

    /// Runs a single checkpoint fetch immediately; used by the watchdog's
    /// poll-fallback hook, which needs a one-shot call rather than the ticking loop.
    pub async fn poll_once(&self) -> anyhow::Result<()> {
        self.loader
            .load_checkpoint_without_cache()
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    }
}
