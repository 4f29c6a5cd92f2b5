//! Reentrancy guard (component C10).
//!
//! An external logging-level-evaluation integration (out of scope for this crate) may
//! itself call back into config resolution from inside a log call. Left unchecked,
//! that callback can re-enter the SDK's own logging and recurse indefinitely. This
//! guard gives that integration a scoped flag to check first.
//!
//! Keyed to the async task via [`tokio::task_local!`] rather than a bare OS
//! thread-local, since tasks — not threads — are this SDK's unit of concurrency: the
//! streaming task, the watchdog task and the poll task all run on a shared
//! multi-threaded runtime and must not share one thread's reentrancy state.

tokio::task_local! {
    static INSIDE_SDK: std::cell::Cell<bool>;
}

/// True if the current task is already inside an SDK-owned logging call.
///
/// Returns `false` outside of [`guarded`] — including on a task that never set up the
/// task-local at all — so a caller on an unrelated task never sees a stale `true`.
pub fn is_inside_sdk() -> bool {
    INSIDE_SDK
        .try_with(|flag| flag.get())
        .unwrap_or(false)
}

/// Runs `f` with the reentrancy flag set for the duration of the call, scoped to the
/// current async task. Nested calls on the same task observe `is_inside_sdk() ==
/// true` without re-acquiring anything — this is a marker, not a lock.
pub async fn guarded<F, Fut, T>(f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    if INSIDE_SDK.try_with(|flag| flag.get()).unwrap_or(false) {
        return f().await;
    }
    INSIDE_SDK
        .scope(std::cell::Cell::new(true), f())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flag_is_false_outside_any_guard() {
        assert!(!is_inside_sdk());
    }

    #[tokio::test]
    async fn flag_is_true_inside_guard() {
        let observed = guarded(|| async { is_inside_sdk() }).await;
        assert!(observed);
    }

    #[tokio::test]
    async fn flag_resets_after_guard_completes() {
        guarded(|| async {}).await;
        assert!(!is_inside_sdk());
    }

    #[tokio::test]
    async fn nested_guard_stays_true() {
        let observed = guarded(|| async { guarded(|| async { is_inside_sdk() }).await }).await;
        assert!(observed);
    }
}
