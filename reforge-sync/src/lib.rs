//! Resilient HTTP/SSE synchronization pipeline: the checkpoint loader, streaming
//! manager, watchdog, poll fallback, and the coordinator that wires them together
//! behind a single `Handle`.

pub mod backoff;
pub mod checkpoint;
pub mod coordinator;
pub mod error;
pub mod poll;
pub mod shutdown;
pub mod sse;
pub mod transport;
pub mod watchdog;

pub use coordinator::{Handle, Resolution};
pub use error::SyncError;
pub use shutdown::Shutdown;
