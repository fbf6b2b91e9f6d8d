//! Events: data model and publish/subscribe bus.
//!
//! ## Contents
//! - [`EventId`], [`EventCategory`], [`SourceId`], [`Payload`], [`Event`]: the event data model
//! - [`EventBus`], [`BusConfig`], [`BusStats`]: the bus (async queue + sync delivery)
//!
//! ## Quick reference
//! - **Publishers**: the orchestrator state callbacks, `Reconnector`, collaborators, inputs.
//! - **Consumers**: the orchestrator (wildcard subscription), `LogWriter`, user handlers.
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::{BusConfig, BusStats, EventBus};
pub use event::{Event, EventCategory, EventId, Payload, SourceId};
