//! The single shutdown signal shared by every background task (§5): an `AtomicBool`
//! for a cheap synchronous check plus a `Notify` so a waiting task wakes promptly
//! instead of on its next timed tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
pub struct Shutdown {
    flag: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn signal(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Resolves immediately if already shutting down; otherwise waits for [`signal`].
    pub async fn wait(&self) {
        if self.is_shutting_down() {
            return;
        }
        self.notify.notified().await;
    }
}
