//! Liveness clock shared by the reader and heartbeat tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Time of the last liveness signal from the broker.
///
/// Stored as milliseconds since the clock was created so one task can
/// record beats while another reads the silence without locking.
#[derive(Debug)]
pub struct Heartbeat {
    origin: Instant,
    last_beat_ms: AtomicU64,
}

impl Heartbeat {
    /// A clock whose last beat is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_beat_ms: AtomicU64::new(0),
        }
    }

    /// Record a liveness signal.
    pub fn beat(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_beat_ms.fetch_max(now, Ordering::AcqRel);
    }

    /// Time since the last liveness signal.
    pub fn elapsed(&self) -> Duration {
        let last = Duration::from_millis(self.last_beat_ms.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
