//! Injectable time source so the Generator, Lifecycle Processor, and
//! Anomaly Detector can be driven deterministically in tests and in the
//! simulator, and read real wall-clock time in production.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: thin wrapper over `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests and the simulator. Stores the current
/// instant as epoch millis so it can be advanced from any thread without
/// requiring interior `Mutex` poisoning concerns.
#[derive(Debug, Clone)]
pub struct SimClock {
    millis: Arc<AtomicI64>,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

pub type SharedClock = Arc<dyn Clock>;
