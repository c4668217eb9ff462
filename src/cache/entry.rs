//! Timestamped cache records and the clock they are judged against.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source used for TTL evaluation.
///
/// Production code uses [`SystemClock`]; tests drive [`ManualClock`] so expiry
/// can be asserted without sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Move the clock forward by `by`. The offset saturates instead of wrapping.
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .offset_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |offset| {
                Some(offset.saturating_add(nanos))
            });
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

/// Immutable cache record: a value and the instant it was loaded.
///
/// Entries are never mutated; a refresh replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, cached_at: Instant) -> Self {
        Self { value, cached_at }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn cached_at(&self) -> Instant {
        self.cached_at
    }

    /// True while `now` is strictly before `cached_at + ttl`.
    pub fn is_valid_at(&self, ttl: Duration, now: Instant) -> bool {
        match self.cached_at.checked_add(ttl) {
            Some(deadline) => now < deadline,
            // Deadline beyond what `Instant` can represent: never expires.
            None => true,
        }
    }

    pub fn is_valid(&self, ttl: Duration, clock: &dyn Clock) -> bool {
        self.is_valid_at(ttl, clock.now())
    }
}
