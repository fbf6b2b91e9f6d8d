//! # Fixed-interval reconnection policy.
//!
//! [`RetryPolicy`] decides whether and how soon a connectivity collaborator
//! re-attempts a connection after a failure. [`RetryTimer`] applies it to the
//! tick of the last recorded failure.
//!
//! The interval is fixed, not exponential: the orchestrator relies on
//! collaborators retrying on a predictable cadence and never schedules retries itself.
//!
//! ## Signed-millisecond convention
//! Device configuration expresses the policy as one signed number of milliseconds,
//! see [`RetryPolicy::from_millis`]:
//! - `< 0`: never retry;
//! - `0`: retry on the next step;
//! - `> 0`: retry once that many ticks elapsed since the last failure.
//!
//! ## Example
//! ```rust
//! use nodevisor::{RetryPolicy, RetryTimer};
//!
//! let mut timer = RetryTimer::new(RetryPolicy::from_millis(5000));
//!
//! // A fresh timer is due at once: the first attempt is not delayed.
//! assert!(timer.poll(0));
//!
//! timer.record_failure(100);
//! assert!(!timer.poll(5099));
//! assert!(timer.poll(5100));  // due: re-armed at 5100
//! assert!(!timer.poll(5101));
//! ```

use std::time::Duration;

use crate::policies::clock::Tick;

/// Reconnection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Never retry after a failure.
    Disabled,
    /// Retry on the next step after a failure.
    Immediate,
    /// Retry once the interval elapsed since the last failure.
    Every(Duration),
}

impl Default for RetryPolicy {
    /// Retry every [`RetryPolicy::DEFAULT_INTERVAL`].
    fn default() -> Self {
        RetryPolicy::Every(Self::DEFAULT_INTERVAL)
    }
}

impl RetryPolicy {
    /// Default reconnection interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

    /// Builds a policy from the signed-millisecond convention.
    pub fn from_millis(ms: i64) -> Self {
        match ms {
            ..0 => RetryPolicy::Disabled,
            0 => RetryPolicy::Immediate,
            ms => RetryPolicy::Every(Duration::from_millis(ms.unsigned_abs())),
        }
    }

    /// Returns the retry interval in ticks, `None` when retries are disabled.
    ///
    /// Intervals longer than the tick range saturate.
    #[inline]
    pub fn interval_ticks(&self) -> Option<Tick> {
        match self {
            RetryPolicy::Disabled => None,
            RetryPolicy::Immediate => Some(0),
            RetryPolicy::Every(d) => Some(Tick::try_from(d.as_millis()).unwrap_or(Tick::MAX)),
        }
    }
}

/// Tracks the last failure and answers "is a retry due now?".
///
/// Tick arithmetic wraps: elapsed time is `now.wrapping_sub(last_failure)`.
#[derive(Clone, Copy, Debug)]
pub struct RetryTimer {
    policy: RetryPolicy,
    last_failure: Option<Tick>,
}

impl RetryTimer {
    /// Creates a fresh timer: the first attempt is due immediately.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            last_failure: None,
        }
    }

    /// The configured policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Tick of the last recorded failure (or re-arm), if any.
    pub fn last_failure(&self) -> Option<Tick> {
        self.last_failure
    }

    /// Records a failed (or lost) connection at `now`.
    pub fn record_failure(&mut self, now: Tick) {
        self.last_failure = Some(now);
    }

    /// Forgets the last failure; the next attempt is due immediately.
    pub fn record_success(&mut self) {
        self.last_failure = None;
    }

    /// `true` if an attempt should be made at `now`.
    pub fn is_due(&self, now: Tick) -> bool {
        let Some(since) = self.last_failure else {
            return true;
        };
        match self.policy.interval_ticks() {
            None => false,
            Some(interval) => now.wrapping_sub(since) >= interval,
        }
    }

    /// Like [`is_due`](Self::is_due), but re-arms the timer at `now` when due.
    pub fn poll(&mut self, now: Tick) -> bool {
        if self.is_due(now) {
            self.last_failure = Some(now);
            true
        } else {
            false
        }
    }
}
