//! Failure isolation for storage and asset access.
//!
//! Two mechanisms live here:
//!
//! - [`ErrorTracker`] remembers failures per key (a language or a word) so a
//!   dictionary that is known to be missing is not re-read on every
//!   keystroke.
//! - [`CircuitBreaker`] counts consecutive storage failures across all keys
//!   and gates storage access while that count is high.
//!
//! Every time-dependent method has an `_at` variant taking the current
//! [`Instant`], which is what the tests drive.
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use log::{debug, warn};
use lru::LruCache;
use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::config::ResilienceConfig;
use crate::error::StorageFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorTrackerEntry {
    pub failure_count: u32,
    pub last_failure: Instant,
}

struct TrackerState {
    entries: LruCache<SmolStr, ErrorTrackerEntry>,
    last_sweep: Instant,
}

/// Bounded per-key failure memory with least-recently-used eviction.
pub struct ErrorTracker {
    state: Mutex<TrackerState>,
    retry_threshold: u32,
    cooldown: Duration,
    expiry: Duration,
    sweep_interval: Duration,
}

impl ErrorTracker {
    pub fn new(config: &ResilienceConfig) -> ErrorTracker {
        let capacity = NonZeroUsize::new(config.tracker_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        ErrorTracker {
            state: Mutex::new(TrackerState {
                entries: LruCache::new(capacity),
                last_sweep: Instant::now(),
            }),
            retry_threshold: config.retry_threshold.max(1),
            cooldown: config.cooldown(),
            expiry: config.expiry(),
            sweep_interval: config.sweep_interval(),
        }
    }

    #[inline]
    pub fn should_skip(&self, key: &str) -> bool {
        self.should_skip_at(key, Instant::now())
    }

    /// True while `key` has failed at least `retry_threshold` times and the
    /// last failure is within the cooldown.
    pub fn should_skip_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.maybe_sweep(&mut state, now);

        match state.entries.peek(key) {
            Some(entry) => {
                entry.failure_count >= self.retry_threshold
                    && now.saturating_duration_since(entry.last_failure) < self.cooldown
            }
            None => false,
        }
    }

    #[inline]
    pub fn record_failure(&self, key: &str) -> u32 {
        self.record_failure_at(key, Instant::now())
    }

    /// Records a failure and returns the key's new failure count.
    pub fn record_failure_at(&self, key: &str, now: Instant) -> u32 {
        let mut state = self.state.lock();
        self.maybe_sweep(&mut state, now);

        let key = SmolStr::new(key);
        let count = match state.entries.get_mut(&key) {
            Some(entry) => {
                entry.failure_count = entry.failure_count.saturating_add(1);
                entry.last_failure = now;
                entry.failure_count
            }
            None => {
                state.entries.put(
                    key.clone(),
                    ErrorTrackerEntry {
                        failure_count: 1,
                        last_failure: now,
                    },
                );
                1
            }
        };

        if count == self.retry_threshold {
            warn!("'{}' failed {} times, cooling down for {:?}", key, count, self.cooldown);
        }

        count
    }

    /// Forgets every failure recorded for `key`.
    pub fn record_success(&self, key: &str) {
        self.state.lock().entries.pop(key);
    }

    pub fn entry(&self, key: &str) -> Option<ErrorTrackerEntry> {
        self.state.lock().entries.peek(key).copied()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts entries whose last failure is older than the expiry window.
    /// Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        self.sweep_locked(&mut state, now)
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    fn maybe_sweep(&self, state: &mut TrackerState, now: Instant) {
        if now.saturating_duration_since(state.last_sweep) >= self.sweep_interval {
            self.sweep_locked(state, now);
        }
    }

    fn sweep_locked(&self, state: &mut TrackerState, now: Instant) -> usize {
        state.last_sweep = now;

        let expired: Vec<SmolStr> = state
            .entries
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_failure) >= self.expiry)
            .map(|(k, _)| k.clone())
            .collect();

        for key in expired.iter() {
            state.entries.pop(key);
        }

        if !expired.is_empty() {
            debug!("swept {} expired error tracker entries", expired.len());
        }

        expired.len()
    }
}

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Normal,
    Cooldown,
    Destroyed,
}

#[derive(Debug)]
struct BreakerInner {
    failure_count: u32,
    last_failure: Option<Instant>,
    destroyed: bool,
}

/// Global consecutive-failure counter gating storage access.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    base_cooldown: Duration,
    max_cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &ResilienceConfig) -> CircuitBreaker {
        CircuitBreaker {
            inner: Mutex::new(BreakerInner {
                failure_count: 0,
                last_failure: None,
                destroyed: false,
            }),
            threshold: config.breaker_threshold.max(1),
            base_cooldown: config.cooldown(),
            max_cooldown: config.breaker_max_cooldown(),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// True when storage access should be skipped. A destroyed breaker is
    /// always open.
    pub fn is_open_at(&self, now: Instant) -> bool {
        self.state_at(now) != BreakerState::Normal
    }

    pub fn state_at(&self, now: Instant) -> BreakerState {
        let inner = self.inner.lock();
        if inner.destroyed {
            return BreakerState::Destroyed;
        }

        match inner.last_failure {
            Some(last) if inner.failure_count >= self.threshold => {
                if now.saturating_duration_since(last) < self.backoff(inner.failure_count) {
                    BreakerState::Cooldown
                } else {
                    BreakerState::Normal
                }
            }
            _ => BreakerState::Normal,
        }
    }

    /// Cooldown for the given failure count: doubles for every failure past
    /// the threshold, capped at the configured maximum.
    pub fn backoff(&self, failure_count: u32) -> Duration {
        let excess = failure_count.saturating_sub(self.threshold).min(16);
        self.base_cooldown
            .checked_mul(1u32 << excess)
            .unwrap_or(self.max_cooldown)
            .min(self.max_cooldown)
    }

    #[inline]
    pub fn record_failure(&self, kind: StorageFailure) -> u32 {
        self.record_failure_at(kind, Instant::now())
    }

    /// Updates the counter after a classified failure and returns it.
    ///
    /// A transient lock only counts when the counter is at most one;
    /// otherwise it walks the counter back by one.
    pub fn record_failure_at(&self, kind: StorageFailure, now: Instant) -> u32 {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return inner.failure_count;
        }

        let before = inner.failure_count;
        inner.failure_count = match kind {
            StorageFailure::TransientLock if before > 1 => before - 1,
            _ => before.saturating_add(1),
        };
        inner.last_failure = Some(now);

        if before < self.threshold && inner.failure_count >= self.threshold {
            warn!(
                "storage failed {} times in a row ({:?}), backing off",
                inner.failure_count, kind
            );
        }

        inner.failure_count
    }

    /// Resets the counter after a successful storage operation.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.failure_count >= self.threshold && !inner.destroyed {
            debug!("storage recovered after {} failures", inner.failure_count);
        }
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Moves the breaker into its terminal state.
    pub fn destroy(&self) {
        self.inner.lock().destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }
}
