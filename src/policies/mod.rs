//! Reconnection policy.
//!
//! This module groups the knobs that control **if/when** a connectivity
//! collaborator re-attempts a connection after a failure.
//!
//! ## Contents
//! - [`RetryPolicy`] disabled / immediate / fixed interval
//! - [`RetryTimer`]  last-failure tracking and the "due now?" check
//! - [`Clock`], [`MonotonicClock`], [`Tick`] where ticks come from
//!
//! ## Quick wiring
//! ```text
//! ReconnectConfig { interval_ms, step_interval }
//!      └─► core::reconnect::Reconnector uses:
//!           - RetryTimer::poll(clock.now()) on every step while disconnected
//!           - record_failure on error / link loss, record_success on connect
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → fixed 5s interval.
//! - A fresh `RetryTimer` is due immediately (no delay before the first attempt).

mod clock;
mod retry;

pub use clock::{Clock, MonotonicClock, Tick};
pub use retry::{RetryPolicy, RetryTimer};
