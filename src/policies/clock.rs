//! # Tick source for retry timing.
//!
//! A [`Tick`] is one millisecond of a wrapping 32-bit counter, like an RTOS tick.
//! [`Clock`] abstracts where ticks come from so retry logic can be driven by a
//! fake clock in tests.

use tokio::time::Instant;

/// Milliseconds on a wrapping 32-bit counter.
pub type Tick = u32;

/// Source of the current tick.
pub trait Clock: Send + Sync {
    /// Current tick.
    fn now(&self) -> Tick;
}

/// Milliseconds elapsed since the clock was created, on tokio's clock.
///
/// Follows `tokio::time::pause`/`advance` in tests.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose tick 0 is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        // Truncation wraps the counter.
        self.epoch.elapsed().as_millis() as Tick
    }
}
