//! Epoch clock abstraction for timeouts, heartbeats and reuse deadlines.
//!
//! Everything time-dependent in the coordination protocols takes an
//! `EpochClock` rather than reading the system clock directly, so tests can
//! pin time and exercise timeout boundaries deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of milliseconds since the Unix epoch.
pub trait EpochClock {
    fn time(&self) -> i64;
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64
    }
}

/// A manually-advanced clock for tests.
///
/// Clones share the same underlying instant, so a test can keep one handle to
/// advance time while another is owned by the component under test.
#[derive(Clone, Debug, Default)]
pub struct CachedEpochClock {
    time_ms: Arc<AtomicI64>,
}

impl CachedEpochClock {
    pub fn at(time_ms: i64) -> Self {
        let clock = Self::default();
        clock.set(time_ms);
        clock
    }

    pub fn set(&self, time_ms: i64) {
        self.time_ms.store(time_ms, Ordering::Release);
    }

    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.time_ms.fetch_add(delta_ms, Ordering::AcqRel) + delta_ms
    }
}

impl EpochClock for CachedEpochClock {
    fn time(&self) -> i64 {
        self.time_ms.load(Ordering::Acquire)
    }
}
