//! SSE liveness watchdog (component C6).
//!
//! Ported from the reference implementation's `SSEWatchdog`: a periodic check of
//! `now - last_activity`, forcing a poll-fallback plus a stream close when the
//! connection has gone quiet for longer than `max_silence`. The cyclic dependency the
//! original carries between the watchdog and the stream is broken here: the watchdog
//! only ever sees a `Closeable` behind an `ArcSwapOption` it doesn't own, and a poll
//! closure it doesn't call into directly.

use crate::shutdown::Shutdown;
use arc_swap::ArcSwapOption;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_SILENCE: Duration = Duration::from_secs(120);

/// Anything the watchdog can force-close to push the SSE state machine back to
/// `CONNECT` via `ERROR` -> `BACKOFF`.
pub trait Closeable: Send + Sync {
    fn close(&self);
}

pub type PollFallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

pub struct SseWatchdog {
    check_interval: Duration,
    max_silence: Duration,
    last_activity: Mutex<Instant>,
}

impl Default for SseWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_SILENCE)
    }
}

impl SseWatchdog {
    pub fn new(check_interval: Duration, max_silence: Duration) -> Self {
        Self {
            check_interval,
            max_silence,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Called from the byte-stream interposer on every byte received — including
    /// filtered-out keepalive comment lines.
    pub fn touch(&self) {
        *self.last_activity.lock().expect("lock poisoned") = Instant::now();
    }

    fn silent_for(&self) -> Duration {
        self.last_activity.lock().expect("lock poisoned").elapsed()
    }

    /// Runs until `shutdown` fires. `stream_handle` is consulted fresh on every
    /// recovery, never cached, since C5 may have already replaced it.
    pub async fn run<H: Closeable + 'static>(
        &self,
        stream_handle: Arc<ArcSwapOption<H>>,
        poll_fallback: PollFallback,
        shutdown: Arc<Shutdown>,
    ) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => return,
            }

            if shutdown.is_shutting_down() {
                return;
            }

            let silence = self.silent_for();
            if silence > self.max_silence {
                self.trigger_recovery(&stream_handle, &poll_fallback, silence)
                    .await;
            }
        }
    }

    async fn trigger_recovery<H: Closeable + 'static>(
        &self,
        stream_handle: &Arc<ArcSwapOption<H>>,
        poll_fallback: &PollFallback,
        silence: Duration,
    ) {
        warn!(
            silence_secs = silence.as_secs_f64(),
            "SSE stream silent past max_silence, forcing recovery"
        );

        if let Err(err) = poll_fallback().await {
            warn!(error = %err, "poll fallback failed during watchdog recovery");
        }

        if let Some(handle) = stream_handle.load_full() {
            handle.close();
        }

        self.touch();
    }
}
