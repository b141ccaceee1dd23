//! In-flight stream registry
//!
//! Tracks active relay streams by an opaque id so a client can request early
//! termination out-of-band. The registry is the single source of truth for
//! "is this stream still active": whichever of relay completion or explicit
//! cancel happens first removes the entry, the other is a no-op.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to one in-flight upstream stream.
///
/// Cancellation is a capability: handles created from a transport that can be
/// aborted carry a token, others are bookkeeping-only and `cancel` just
/// removes them from the registry.
#[derive(Debug)]
pub struct StreamHandle {
    abort: Option<CancellationToken>,
}

impl StreamHandle {
    /// Handle whose underlying transport supports cooperative abort.
    pub fn with_abort(token: CancellationToken) -> Self {
        Self { abort: Some(token) }
    }

    /// Handle for a transport that cannot be aborted mid-flight.
    pub fn bookkeeping_only() -> Self {
        Self { abort: None }
    }

    pub fn supports_abort(&self) -> bool {
        self.abort.is_some()
    }

    fn abort(self) {
        if let Some(token) = self.abort {
            token.cancel();
        }
    }
}

/// Process-local map of stream id to handle.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<String, StreamHandle>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an id unique for the process lifetime.
    pub fn next_id() -> String {
        format!(
            "{}-{:06x}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>() & 0xff_ffff
        )
    }

    pub fn register(&self, id: String, handle: StreamHandle) {
        debug!(stream_id = %id, "Registered stream");
        self.streams.lock().unwrap().insert(id, handle);
    }

    /// Whether a stream is still active.
    pub fn lookup(&self, id: &str) -> bool {
        self.streams.lock().unwrap().contains_key(id)
    }

    /// Request early termination of a stream. Removes the entry and aborts
    /// the underlying transport best-effort. Returns whether an entry was
    /// found; cancelling an unknown id is not an error.
    pub fn cancel(&self, id: &str) -> bool {
        let handle = self.streams.lock().unwrap().remove(id);
        match handle {
            Some(handle) => {
                debug!(stream_id = %id, abortable = handle.supports_abort(), "Cancelling stream");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Remove a completed stream. No-op when the entry was already cancelled.
    pub fn deregister(&self, id: &str) {
        if self.streams.lock().unwrap().remove(id).is_some() {
            debug!(stream_id = %id, "Deregistered stream");
        }
    }

    pub fn active_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}
