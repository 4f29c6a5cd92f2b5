//! SSE connection manager (component C5).
//!
//! Maintains one streaming connection at a time. Every received chunk — including
//! chunks that turn out to be nothing but a keepalive comment — touches the watchdog
//! before the event parser gets a chance to filter anything out, per the byte-stream
//! interposition requirement: the parser operates on a copy of the buffer, but the
//! touch happens on the raw bytes as they arrive.
//!
//! A successful merge closes the connection and lets the caller reopen it on the next
//! loop iteration, confirmed against the reference implementation's test that a
//! single valid payload triggers exactly one `close()`.

use crate::backoff::Backoff;
use crate::error::SyncError;
use crate::shutdown::Shutdown;
use crate::watchdog::Closeable;
use arc_swap::ArcSwapOption;
use reforge_core::{EnvelopeError, decode_envelope};
use reforge_store::ConfigStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};

const SSE_PATH: &str = "/api/v1/sse/config";
const START_AT_ID_HEADER: &str = "x-reforge-start-at-id";

/// Per-connection close signal, handed to the watchdog behind an `ArcSwapOption` so
/// it can force a reconnect without the SSE manager and the watchdog sharing any
/// other mutable state.
pub struct ConnectionHandle {
    closed: AtomicBool,
    notify: Notify,
}

impl ConnectionHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    async fn wait_closed(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.notify.notified().await;
    }
}

impl Closeable for ConnectionHandle {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

pub struct SseConnectionManager {
    client: reqwest::Client,
    stream_urls: Vec<String>,
    sdk_key: Option<String>,
    store: Arc<ConfigStore>,
    backoff: Backoff,
    ready_hook: Arc<dyn Fn() + Send + Sync>,
    cache_path: Option<std::path::PathBuf>,
}

impl SseConnectionManager {
    pub fn new(
        stream_urls: Vec<String>,
        sdk_key: Option<String>,
        store: Arc<ConfigStore>,
        ready_hook: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            stream_urls,
            sdk_key,
            store,
            backoff: Backoff::default(),
            ready_hook,
            cache_path: None,
        }
    }

    /// Enables write-through to the disk cache on every merge that changes the
    /// store, mirroring the checkpoint loader's behavior.
    pub fn with_cache_path(mut self, cache_path: Option<std::path::PathBuf>) -> Self {
        self.cache_path = cache_path;
        self
    }

    /// Runs the reconnect loop until `shutdown` fires. `touch` is called on every raw
    /// chunk received; `current_handle` is published so the watchdog can force a
    /// reconnect.
    pub async fn run(
        &self,
        current_handle: Arc<ArcSwapOption<ConnectionHandle>>,
        touch: impl Fn() + Send + Sync,
        on_unauthorized: impl Fn(),
        shutdown: Arc<Shutdown>,
    ) {
        let mut attempt: u32 = 0;
        loop {
            if shutdown.is_shutting_down() {
                return;
            }

            match self
                .connect_and_stream(&current_handle, &touch, &shutdown)
                .await
            {
                Ok(()) => {
                    attempt = 0;
                    debug!("SSE merge complete, reconnecting");
                }
                Err(SyncError::Unauthorized) => {
                    on_unauthorized();
                    return;
                }
                Err(err) => {
                    attempt += 1;
                    let delay = self.backoff.delay_for_attempt(attempt);
                    warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "SSE connection failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait() => return,
                    }
                }
            }
        }
    }

    async fn connect_and_stream(
        &self,
        current_handle: &Arc<ArcSwapOption<ConnectionHandle>>,
        touch: &impl Fn(),
        shutdown: &Arc<Shutdown>,
    ) -> Result<(), SyncError> {
        let response = self.open_stream().await?;
        let handle = ConnectionHandle::new();
        current_handle.store(Some(Arc::clone(&handle)));

        let result = self.read_until_merge(response, touch, &handle, shutdown).await;
        current_handle.store(None);
        result
    }

    async fn open_stream(&self) -> Result<reqwest::Response, SyncError> {
        let highwater = self.store.highwater();
        for base in &self.stream_urls {
            let url = format!("{}{}", base.trim_end_matches('/'), SSE_PATH);
            let mut request = self
                .client
                .get(&url)
                .header(START_AT_ID_HEADER, highwater.to_string())
                .header(reqwest::header::ACCEPT, "text/event-stream");
            if let Some(key) = &self.sdk_key {
                request = request.basic_auth("", Some(key));
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => match SyncError::classify(response.status()) {
                    reforge_core::ErrorClass::Unauthorized => return Err(SyncError::Unauthorized),
                    reforge_core::ErrorClass::Transient => {
                        warn!(url = %url, status = %response.status(), "SSE connect failed, trying next URL");
                    }
                    reforge_core::ErrorClass::FatalClient => {
                        return Err(SyncError::FatalClient(format!(
                            "http {}",
                            response.status()
                        )));
                    }
                },
                Err(err) => {
                    warn!(url = %url, error = %err, "SSE connect failed, trying next URL");
                }
            }
        }
        Err(SyncError::Transient(
            "all stream URLs failed to connect".to_string(),
        ))
    }

    async fn read_until_merge(
        &self,
        mut response: reqwest::Response,
        touch: &impl Fn(),
        handle: &Arc<ConnectionHandle>,
        shutdown: &Arc<Shutdown>,
    ) -> Result<(), SyncError> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            tokio::select! {
                chunk = response.chunk() => {
                    match chunk {
                        Ok(Some(bytes)) => {
                            touch();
                            buf.extend_from_slice(&bytes);
                            loop {
                                match take_frame(&mut buf) {
                                    Frame::Incomplete => break,
                                    Frame::NoData => continue,
                                    Frame::Data(data) => return self.merge_event(&data).await,
                                }
                            }
                        }
                        Ok(None) => return Err(SyncError::Transient("SSE stream ended".to_string())),
                        Err(err) => return Err(SyncError::Transient(err.to_string())),
                    }
                }
                _ = handle.wait_closed() => {
                    return Err(SyncError::Transient("closed by watchdog".to_string()));
                }
                _ = shutdown.wait() => {
                    return Err(SyncError::Transient("shutdown".to_string()));
                }
            }
        }
    }

    async fn merge_event(&self, data: &str) -> Result<(), SyncError> {
        match decode_envelope(data.as_bytes()) {
            Ok(configs) => {
                reforge_telemetry::guarded(|| async {
                    let changed = self.store.set_all(configs, "sse_streaming");
                    if !self.store.is_empty() {
                        (self.ready_hook)();
                    }
                    if changed {
                        if let Some(path) = &self.cache_path {
                            reforge_store::cache::write(path, &self.store.snapshot());
                        }
                    }
                })
                .await;
                Ok(())
            }
            Err(EnvelopeError::ZeroByte) => {
                warn!(
                    "Received zero-byte config payload from SSE stream, treating as connection error"
                );
                Err(SyncError::Transient("zero-byte SSE payload".to_string()))
            }
            Err(err) => {
                warn!(error = %err, "malformed SSE payload, dropping connection");
                Err(SyncError::Envelope(err))
            }
        }
    }
}

enum Frame {
    /// No complete `\n\n`-terminated frame in the buffer yet; wait for more bytes.
    Incomplete,
    /// A complete frame with no `data:` line (keepalive comment, bare `retry:`, etc).
    NoData,
    /// A complete frame carrying a `data:` line, the base64 envelope text.
    Data(String),
}

/// Scans `buf` for the next `\n\n`-delimited SSE frame and drains the consumed bytes.
fn take_frame(buf: &mut Vec<u8>) -> Frame {
    let Some(pos) = find_double_newline(buf) else {
        return Frame::Incomplete;
    };
    let frame_bytes: Vec<u8> = buf.drain(..pos + 2).collect();
    let text = String::from_utf8_lossy(&frame_bytes);

    let mut data_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim());
        }
        // `event:`, `id:`, `retry:`, and `:`-prefixed keepalive comments carry no
        // merge-relevant information for this engine; only presence matters for the
        // watchdog touch, which already happened on the raw chunk.
    }

    if data_lines.is_empty() {
        Frame::NoData
    } else {
        Frame::Data(data_lines.join(""))
    }
}

fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}
