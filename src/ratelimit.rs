//! Per-identity rate limiting.
//!
//! Two small components own the mutable state that throttles callers: a
//! cooldown map for spacing out key requests, and a failure tracker that
//! temporarily locks out identities after repeated unauthorized attempts.
//! Both are injected into their consumers so they can be exercised without
//! any chat-platform machinery.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Spaces out repeated operations per identity.
///
/// Identities are caller-chosen strings, typically `"{user}:{operation}"`.
#[derive(Debug)]
pub struct Cooldowns {
    period: Duration,
    last_used: Mutex<HashMap<String, Instant>>,
}

impl Cooldowns {
    /// Creates a cooldown map enforcing `period` between recorded uses.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_used: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the remaining wait for `id`, or `None` when the identity may
    /// proceed.
    pub fn check(&self, id: &str) -> Option<Duration> {
        let last_used = self.last_used.lock().unwrap();
        let last = last_used.get(id)?;
        self.period.checked_sub(last.elapsed())
    }

    /// Marks `id` as having just used the guarded operation.
    pub fn record(&self, id: &str) {
        let mut last_used = self.last_used.lock().unwrap();
        last_used.insert(id.to_string(), Instant::now());
    }
}

#[derive(Debug, Default)]
struct FailureState {
    failures: u32,
    locked_until: Option<Instant>,
}

/// Tracks unauthorized attempts per identity and locks out repeat offenders.
///
/// After `max_failures` recorded failures the identity is locked out for
/// `lockout` and its counter resets, so the next offense starts a fresh
/// count once the lockout has passed.
#[derive(Debug)]
pub struct FailureTracker {
    max_failures: u32,
    lockout: Duration,
    state: Mutex<HashMap<String, FailureState>>,
}

impl FailureTracker {
    /// Creates a tracker engaging a `lockout` after `max_failures` failures.
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            lockout,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the remaining lockout for `id`, or `None` when the identity
    /// may proceed.
    pub fn check(&self, id: &str) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        let locked_until = state.get(id)?.locked_until?;
        locked_until.checked_duration_since(Instant::now())
    }

    /// Records a failed attempt for `id`.
    ///
    /// Returns the lockout duration when this failure crosses the threshold,
    /// `None` otherwise.
    pub fn record_failure(&self, id: &str) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(id.to_string()).or_default();
        entry.failures += 1;
        if entry.failures >= self.max_failures {
            entry.failures = 0;
            entry.locked_until = Some(Instant::now() + self.lockout);
            Some(self.lockout)
        } else {
            None
        }
    }
}
