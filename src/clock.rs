//! Injected time source and a time-stamped cache value.
//!
//! Everything that stamps rows or expires cached data asks a [`Clock`]
//! instead of calling `Utc::now()` directly, so expiry can be tested by
//! moving a [`ManualClock`] rather than sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ts(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// A payload together with the instant it was loaded.
#[derive(Debug, Clone)]
pub struct TimedCache<T> {
    pub payload: T,
    pub loaded_at: DateTime<Utc>,
}

impl<T> TimedCache<T> {
    pub fn new(payload: T, loaded_at: DateTime<Utc>) -> Self {
        Self { payload, loaded_at }
    }

    /// Expired strictly after `loaded_at + ttl`. A zero TTL is treated as one second.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = ttl.max(Duration::seconds(1));
        now > self.loaded_at + ttl
    }
}
