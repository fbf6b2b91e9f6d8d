//! # Orchestrator and reconnection configuration.
//!
//! Provides [`OrchestratorConfig`] and [`ReconnectConfig`]. The bus has its own
//! [`BusConfig`](crate::BusConfig).
//!
//! ## Sentinel values
//! - `ReconnectConfig::interval_ms < 0` → never retry
//! - `ReconnectConfig::interval_ms = 0` → retry on every step
//! - `step_interval = 0s` → clamped to 1ms by the host loops

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Orchestrator settings.
///
/// ## Field semantics
/// - `name`: state machine name in logs and errors
/// - `step_interval`: period of [`Orchestrator::tick`](crate::Orchestrator::tick) in the host loop
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// State machine name.
    pub name: &'static str,
    /// Period of the host loop tick.
    pub step_interval: Duration,
}

impl OrchestratorConfig {
    /// Returns the step interval clamped to at least 1ms.
    #[inline]
    pub fn step_interval_clamped(&self) -> Duration {
        self.step_interval.max(Duration::from_millis(1))
    }
}

impl Default for OrchestratorConfig {
    /// - `name = "app"`
    /// - `step_interval = 100ms`
    fn default() -> Self {
        Self {
            name: "app",
            step_interval: Duration::from_millis(100),
        }
    }
}

/// Reconnection settings of one connectivity collaborator.
#[derive(Clone, Debug)]
pub struct ReconnectConfig {
    /// Signed retry interval in milliseconds, see [`RetryPolicy::from_millis`].
    pub interval_ms: i64,
    /// Period of [`Reconnector::step`](crate::Reconnector::step) in its host loop.
    pub step_interval: Duration,
}

impl ReconnectConfig {
    /// Returns the retry policy encoded by `interval_ms`.
    #[inline]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.interval_ms)
    }

    /// Returns the step interval clamped to at least 1ms.
    #[inline]
    pub fn step_interval_clamped(&self) -> Duration {
        self.step_interval.max(Duration::from_millis(1))
    }
}

impl Default for ReconnectConfig {
    /// - `interval_ms = 5000` (fixed 5s between attempts)
    /// - `step_interval = 500ms`
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            step_interval: Duration::from_millis(500),
        }
    }
}
