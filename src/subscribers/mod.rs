//! # Event handlers.
//!
//! This module provides the [`Subscribe`] trait, the closure adapter [`HandlerFn`]
//! and the subscription list used by the [`EventBus`](crate::EventBus).
//!
//! ## Architecture
//! ```text
//! EventBus ──► SubscriberSet::dispatch(&Event)
//!                   │
//!              ┌────┴─────┬──────────────┐
//!              ▼          ▼              ▼
//!        Orchestrator  LogWriter      Custom ...
//!        (wildcard)   (wildcard)   (display, update client)
//! ```

mod subscriber;
mod subscriber_set;

pub use subscriber::{HandlerFn, HandlerRef, Subscribe};
pub(crate) use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
mod embedded;
#[cfg(feature = "logging")]
pub use embedded::LogWriter;
