//! Time sources and timestamp stamping.
//!
//! Wall-clock time is read through the [`Clock`] trait so tests can drive it.
//! The [`Stamper`] turns raw readings into timestamps that never repeat or go
//! backwards within one engine, even when the wall clock does.

use crate::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Timestamp;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        // Pre-epoch clocks clamp to zero rather than wrapping.
        chrono::Utc::now().timestamp_millis().max(0) as Timestamp
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Issues strictly increasing timestamps for the write path.
///
/// Ordering rules:
/// 1. A stamp is at least the current wall-clock reading
/// 2. A stamp is strictly greater than every stamp issued before it
/// 3. A stamp is strictly greater than every timestamp passed to [`Stamper::observe`]
pub struct Stamper<C: Clock + ?Sized> {
    last: AtomicU64,
    clock: std::sync::Arc<C>,
}

impl<C: Clock + ?Sized> Stamper<C> {
    /// Create a stamper reading from `clock`.
    pub fn new(clock: std::sync::Arc<C>) -> Self {
        Self {
            last: AtomicU64::new(0),
            clock,
        }
    }

    /// Issue the next timestamp.
    pub fn stamp(&self) -> Timestamp {
        let now = self.clock.now_millis();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(last.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// Fold a timestamp seen from elsewhere into the stamper so that later
    /// stamps sort after it. Used when a remote record is accepted.
    pub fn observe(&self, seen: Timestamp) {
        self.last.fetch_max(seen, Ordering::SeqCst);
    }

    /// The most recent stamp issued or observed.
    pub fn last(&self) -> Timestamp {
        self.last.load(Ordering::SeqCst)
    }
}
