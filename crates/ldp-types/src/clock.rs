use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Wall-clock timestamp used throughout the store.
pub type Timestamp = DateTime<Utc>;

/// Source of timestamps for container and membership mutations.
///
/// Injected into the repository so tests can drive time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A manually driven clock for tests.
///
/// Every call to [`Clock::now`] returns the current value and then advances
/// it by the configured step, so consecutive mutations get distinct,
/// strictly increasing timestamps.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<Timestamp>,
    step: Duration,
}

impl ManualClock {
    /// Start at `start`, advancing one millisecond per reading.
    pub fn new(start: Timestamp) -> Self {
        Self::with_step(start, Duration::milliseconds(1))
    }

    pub fn with_step(start: Timestamp, step: Duration) -> Self {
        Self {
            state: Mutex::new(start),
            step,
        }
    }

    /// Start at the UNIX epoch.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Move the clock forward without reading it.
    pub fn advance(&self, by: Duration) {
        let mut now = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// The value the next reading will return.
    pub fn peek(&self) -> Timestamp {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let mut now = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let current = *now;
        *now += self.step;
        current
    }
}
