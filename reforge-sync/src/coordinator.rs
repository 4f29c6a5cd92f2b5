//! Sync coordinator / SDK facade (component C8).
//!
//! Owns the lifecycle of every background task and the ready latch that gates the
//! first successful read. Construction wires the bootstrap checkpoint, the SSE
//! manager, the watchdog, and the poll loop together purely through closures and
//! shared atomics — none of them hold a reference back to this struct.

use crate::checkpoint::CheckpointLoader;
use crate::poll::PollLoop;
use crate::shutdown::Shutdown;
use crate::sse::{ConnectionHandle, SseConnectionManager};
use crate::transport::ResilientHttpClient;
use crate::watchdog::SseWatchdog;
use arc_swap::ArcSwapOption;
use reforge_core::{ConfigEntry, OnConnectionFailure, OnNoDefault, Options, ResolutionError};
use reforge_store::ConfigStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

const BACKGROUND_TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Placeholder interval for a [`PollLoop`] that only ever serves the watchdog's
/// one-shot fallback (`collect_sync_interval` unset) — `PollLoop::run` is never
/// spawned for it, so this value is never actually ticked against.
const POLL_FALLBACK_ONLY_INTERVAL: Duration = Duration::from_secs(60);

/// One-shot event released either by the first non-empty merge or by an
/// `Unauthorized` observation, so readers blocked on startup fail fast either way.
struct ReadyLatch {
    released: AtomicBool,
    notify: Notify,
}

impl ReadyLatch {
    fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Idempotent: a second call is a no-op. Returns whether this call was the one
    /// that performed the release, so callers can fire "first release" side effects
    /// (like the on-ready callback) exactly once.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    fn is_ready(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Waits until released, or `timeout` elapses. Returns whether the latch is
    /// ready by the time this call returns.
    async fn wait(&self, timeout: Duration) -> bool {
        if self.is_ready() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        self.is_ready()
    }
}

/// Result of a raw key lookup, before the `on_no_default` policy is applied.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<ConfigEntry>),
    NotFound,
    NotReady,
}

/// The running SDK instance. `close()` shuts every background task down and is
/// idempotent; a [`Handle`] is otherwise read-only from the outside.
pub struct Handle {
    store: Arc<ConfigStore>,
    options: Options,
    ready: Arc<ReadyLatch>,
    unauthorized: Arc<AtomicBool>,
    shutdown: Arc<Shutdown>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Handle {
    /// Boots the SDK per the configured `Options`: local-only mode loads the
    /// datafile directly and releases readiness immediately; remote mode runs the
    /// checkpoint bootstrap inline and spawns the streaming, watchdog, and poll
    /// background tasks.
    pub async fn new(options: Options) -> Arc<Self> {
        let handle = Arc::new(Self {
            store: Arc::new(ConfigStore::new()),
            options: options.clone(),
            ready: Arc::new(ReadyLatch::new()),
            unauthorized: Arc::new(AtomicBool::new(false)),
            shutdown: Shutdown::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        if options.local_only() {
            handle.bootstrap_local_only();
            return handle;
        }

        handle.bootstrap_remote().await;
        handle
    }

    fn bootstrap_local_only(&self) {
        let Some(path) = &self.options.x_datafile else {
            warn!("LOCAL_ONLY datasources configured without x_datafile; store stays empty");
            self.release_ready();
            return;
        };
        match std::fs::read(path) {
            Ok(bytes) => match reforge_core::decode_envelope(&bytes) {
                Ok(configs) => {
                    self.store.set_all(configs, "datafile");
                }
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "failed to decode x_datafile")
                }
            },
            Err(err) => warn!(error = %err, path = %path.display(), "failed to read x_datafile"),
        }
        self.release_ready();
    }

    async fn bootstrap_remote(self: &Arc<Self>) {
        let http = Arc::new(ResilientHttpClient::new(
            self.options.api_urls.clone().unwrap_or_default(),
            self.options.api_key.clone(),
            self.options.connection_timeout,
        ));
        let cache_path =
            reforge_store::cache_path(self.options.use_local_cache, &self.options.api_key_id);

        let loader = Arc::new(CheckpointLoader::new(
            Arc::clone(&http),
            Arc::clone(&self.store),
            cache_path.clone(),
            self.ready_hook(),
        ));

        match loader.load_checkpoint().await {
            Ok(_) => {}
            Err(err) if err.is_unauthorized() => {
                self.mark_unauthorized();
                return;
            }
            Err(err) => warn!(error = %err, "initial checkpoint bootstrap failed"),
        }

        let watchdog = Arc::new(SseWatchdog::default());
        let stream_handle: Arc<ArcSwapOption<ConnectionHandle>> =
            Arc::new(ArcSwapOption::from(None));
        // Shared by the watchdog's one-shot poll-fallback and (if configured) the
        // periodic poll task, so there is exactly one place that knows how to issue a
        // no-cache checkpoint fetch.
        let poll = Arc::new(PollLoop::new(
            self.options.collect_sync_interval.unwrap_or(POLL_FALLBACK_ONLY_INTERVAL),
            loader,
            self.on_unauthorized_hook(),
        ));

        self.spawn_sse(
            Arc::clone(&watchdog),
            Arc::clone(&stream_handle),
            cache_path.clone(),
        );
        self.spawn_watchdog(Arc::clone(&watchdog), Arc::clone(&stream_handle), Arc::clone(&poll));
        self.spawn_poll(poll);
    }

    fn ready_hook(self: &Arc<Self>) -> Arc<dyn Fn() + Send + Sync> {
        let this = Arc::clone(self);
        Arc::new(move || this.release_ready())
    }

    fn on_unauthorized_hook(self: &Arc<Self>) -> Arc<dyn Fn() + Send + Sync> {
        let this = Arc::clone(self);
        Arc::new(move || this.mark_unauthorized())
    }

    fn mark_unauthorized(&self) {
        self.unauthorized.store(true, Ordering::Release);
        self.release_ready();
    }

    /// Releases the ready latch and, the first time it actually flips, spawns a
    /// dedicated task that invokes `on_ready_callback` once. A panic inside the
    /// callback is caught and logged rather than taking down the task.
    fn release_ready(&self) {
        if !self.ready.release() {
            return;
        }
        if let Some(callback) = self.options.on_ready_callback.clone() {
            tokio::spawn(async move {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback()));
                if let Err(payload) = outcome {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    warn!(panic = %message, "on_ready_callback panicked");
                }
            });
        }
    }

    fn spawn_sse(
        self: &Arc<Self>,
        watchdog: Arc<SseWatchdog>,
        stream_handle: Arc<ArcSwapOption<ConnectionHandle>>,
        cache_path: Option<std::path::PathBuf>,
    ) {
        let manager = SseConnectionManager::new(
            self.options.stream_urls.clone().unwrap_or_default(),
            self.options.api_key.clone(),
            Arc::clone(&self.store),
            self.ready_hook(),
        )
        .with_cache_path(cache_path);
        let shutdown = Arc::clone(&self.shutdown);
        let on_unauthorized = self.on_unauthorized_hook();

        let task = tokio::spawn(async move {
            let touch = {
                let watchdog = Arc::clone(&watchdog);
                move || watchdog.touch()
            };
            manager
                .run(stream_handle, touch, move || on_unauthorized(), shutdown)
                .await;
        });
        self.tasks.lock().expect("lock poisoned").push(task);
    }

    fn spawn_watchdog(
        self: &Arc<Self>,
        watchdog: Arc<SseWatchdog>,
        stream_handle: Arc<ArcSwapOption<ConnectionHandle>>,
        poll: Arc<PollLoop>,
    ) {
        let shutdown = Arc::clone(&self.shutdown);
        let poll_fallback: crate::watchdog::PollFallback = Arc::new(move || {
            let poll = Arc::clone(&poll);
            Box::pin(async move { poll.poll_once().await })
        });

        let task =
            tokio::spawn(async move { watchdog.run(stream_handle, poll_fallback, shutdown).await });
        self.tasks.lock().expect("lock poisoned").push(task);
    }

    fn spawn_poll(self: &Arc<Self>, poll: Arc<PollLoop>) {
        let Some(interval) = self.options.collect_sync_interval else {
            return;
        };
        if interval.is_zero() {
            return;
        }
        let shutdown = Arc::clone(&self.shutdown);
        let task = tokio::spawn(async move { poll.run(shutdown).await });
        self.tasks.lock().expect("lock poisoned").push(task);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        self.ready.wait(timeout).await
    }

    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Looks up `key` without applying the `on_no_default` policy: `NotReady` is
    /// distinguished from `NotFound` so a caller willing to wait can tell the two
    /// apart instead of always falling through to a default.
    pub fn resolve(&self, key: &str) -> Resolution {
        if !self.is_ready() {
            return Resolution::NotReady;
        }
        match self.store.get(key) {
            Some(entry) => Resolution::Found(entry),
            None => Resolution::NotFound,
        }
    }

    /// Reads `key`, applying the configured `on_no_default` policy when it is
    /// missing (or the SDK hasn't become ready yet): `RAISE` surfaces a
    /// [`ResolutionError`], `RETURN_NONE` yields `Ok(None)`.
    ///
    /// This never waits for readiness; a call made before the SDK becomes ready is
    /// treated the same as a missing key. Use [`Handle::get_with_timeout`] to give
    /// the SDK a chance to finish initializing first.
    pub fn get(&self, key: &str) -> Result<Option<Arc<ConfigEntry>>, ResolutionError> {
        match self.resolve(key) {
            Resolution::Found(entry) => Ok(Some(entry)),
            Resolution::NotFound | Resolution::NotReady => match self.options.on_no_default {
                OnNoDefault::ReturnNone => Ok(None),
                OnNoDefault::Raise => Err(ResolutionError::MissingDefault(key.to_string())),
            },
        }
    }

    /// Reads `key`, first waiting up to `timeout` for the SDK to become ready if it
    /// hasn't already. If the SDK never becomes ready within `timeout`, the
    /// configured `on_connection_failure` policy applies (`RETURN` yields `Ok(None)`,
    /// `RAISE` surfaces [`ResolutionError::ConnectionTimeout`]); once ready, falls
    /// through to the same `on_no_default` handling as [`Handle::get`].
    pub async fn get_with_timeout(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<Arc<ConfigEntry>>, ResolutionError> {
        if !self.is_ready() && !self.ready.wait(timeout).await {
            return match self.options.on_connection_failure {
                OnConnectionFailure::Return => Ok(None),
                OnConnectionFailure::Raise => {
                    Err(ResolutionError::ConnectionTimeout(key.to_string()))
                }
            };
        }
        self.get(key)
    }

    /// Shuts every background task down. Idempotent: a second call is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.signal();

        let tasks = std::mem::take(&mut *self.tasks.lock().expect("lock poisoned"));
        for task in tasks {
            if tokio::time::timeout(BACKGROUND_TASK_JOIN_TIMEOUT, task)
                .await
                .is_err()
            {
                warn!("background task did not stop within the shutdown join timeout");
            }
        }

        // Unblocks any reader still waiting on `wait_for_ready`, but deliberately
        // bypasses `release_ready`: shutting down before the SDK ever became ready
        // is not a readiness event, so `on_ready_callback` must not fire here.
        self.ready.release();
    }
}
