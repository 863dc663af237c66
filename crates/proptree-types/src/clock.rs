use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::record::MTime;

/// Source of modification times.
///
/// Injected into every component that stamps records so tests can control
/// ordering between writes.
pub trait Clock: Send + Sync {
    fn now(&self) -> MTime;
}

/// Wall-clock time at one-second resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> MTime {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        MTime::from_secs(secs)
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            secs: AtomicU64::new(start),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, secs: u64) -> MTime {
        MTime::from_secs(self.secs.fetch_add(secs, Ordering::SeqCst) + secs)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> MTime {
        MTime::from_secs(self.secs.load(Ordering::SeqCst))
    }
}
