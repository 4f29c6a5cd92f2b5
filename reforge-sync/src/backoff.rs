//! Exponential backoff with jitter, shared by the HTTP client (C3) and the SSE
//! reconnect loop (C5).
//!
//! Jitter is derived from the current time hashed through `DefaultHasher` rather than
//! pulling in a `rand` dependency for one call site — the same trick the corpus uses
//! for retry jitter elsewhere.

use std::hash::{Hash, Hasher};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    factor: f64,
    cap: Duration,
    jitter_min_factor: f64,
    jitter_max_factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(30),
            jitter_min_factor: 0.8,
            jitter_max_factor: 1.2,
        }
    }
}

impl Backoff {
    /// `attempt` is 1-based: the delay before the first retry.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unjittered = self.initial.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = unjittered.min(self.cap.as_secs_f64());
        Duration::from_secs_f64(capped * self.jitter_factor())
    }

    fn jitter_factor(&self) -> f64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .hash(&mut hasher);
        let hash = hasher.finish();
        let range = self.jitter_max_factor - self.jitter_min_factor;
        self.jitter_min_factor + (hash % 1000) as f64 / 1000.0 * range
    }
}
