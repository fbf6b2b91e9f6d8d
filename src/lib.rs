//! # nodevisor
//!
//! **Nodevisor** is the runtime coordination layer of a networked device.
//!
//! It decides in which order, and under which conditions, the device brings up
//! its link, connects its messaging transport, enters out-of-band provisioning and
//! recovers from failures. Drivers, clients and provisioning stacks are external
//! collaborators reached only through events and a small command contract.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │     Link     │   │  Transport   │   │ Provisioning │    (collaborators)
//!   │ (Reconnector)│   │ (Reconnector)│   │              │
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          │ post(...)        │ post(...)        │ post(...)
//!          ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 EventBus (bounded queue, 32 by default)           │
//! │   publish(): try_send, drop + count on full                       │
//! │   publish_sync(): dispatch in the caller's task                   │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │     dispatch task      │
//!                       │  SubscriberSet (FIFO)  │
//!                       └───┬────────────────┬───┘
//!                           ▼                ▼
//!                   Orchestrator        LogWriter / user handlers
//!                  (wildcard sub)
//!                           │ process_event(id)
//!                           ▼
//!              Fsm<OrchestratorCtx> (first match wins)
//!                           │ on_enter / on_exit
//!                           ▼
//!       link.start() / transport.connect() / provisioning.start() ...
//! ```
//!
//! ### Lifecycle
//! ```text
//! EventBus::new ─► init ─► Orchestrator::builder(..).build(bus) ─► init ─► start
//!
//! INIT ─(init-done)─► LINK_CONNECTING ─(link-connected)─► LINK_UP
//!      ─(address-acquired)─► TRANSPORT_CONNECTING ─(transport-connected)─► READY
//!
//! degradation: link lost ─► LINK_CONNECTING, transport lost ─► TRANSPORT_CONNECTING
//! override:    provisioning-start ─► PROVISIONING ─(done / stop)─► LINK_CONNECTING
//! fatal:       system-error from any state ─► ERROR
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Event bus**     | Async queue and sync delivery with id or wildcard filters.    | [`EventBus`], [`Event`], [`EventId`]        |
//! | **Handlers**      | Plug consumers into the bus.                                  | [`Subscribe`], [`HandlerFn`]                |
//! | **State machines**| Table-driven FSM with guards, actions and wildcard sources.   | [`Fsm`], [`State`], [`Transition`]          |
//! | **Orchestration** | The device's connectivity lifecycle.                          | [`Orchestrator`], [`AppState`]              |
//! | **Collaborators** | Contract for link, transport and provisioning subsystems.     | [`Collaborator`], [`Connectivity`]          |
//! | **Retry**         | Fixed-interval reconnection.                                  | [`RetryPolicy`], [`Reconnector`]            |
//! | **Errors**        | Typed errors with stable labels.                              | [`BusError`], [`FsmError`], [`OrchestratorError`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use nodevisor::{AppState, BusConfig, EventBus, EventId, Orchestrator, OrchestratorConfig, SourceId};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new(BusConfig::default());
//!     bus.init()?;
//!
//!     // Collaborators left out are replaced by no-op placeholders.
//!     let orch = Orchestrator::builder(OrchestratorConfig::default()).build(bus.clone())?;
//!     orch.init()?;
//!     orch.start()?;
//!
//!     // Drivers would post these; synchronous delivery keeps the example deterministic.
//!     bus.post_sync(EventId::SYSTEM_INIT_DONE, SourceId::SYSTEM)?;
//!     bus.post_sync(EventId::LINK_CONNECTED, SourceId::LINK)?;
//!     bus.post_sync(EventId::LINK_ADDRESS_ACQUIRED, SourceId::LINK)?;
//!     bus.post_sync(EventId::TRANSPORT_CONNECTED, SourceId::TRANSPORT)?;
//!     assert_eq!(orch.state(), AppState::Ready);
//!
//!     orch.stop()?;
//!     bus.deinit().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod fsm;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    AppState, Collaborator, CollaboratorRef, Connectivity, ConnectivityRef, Detached,
    Orchestrator, OrchestratorBuilder, OrchestratorConfig, ReconnectConfig, ReconnectEvents,
    Reconnector, wait_for_shutdown_signal,
};
pub use error::{BusError, ControlError, FsmError, OrchestratorError};
pub use events::{BusConfig, BusStats, Event, EventBus, EventCategory, EventId, Payload, SourceId};
pub use fsm::{ActionFn, Fsm, FsmConfig, GuardFn, Shadowed, State, StateFn, StateId, Transition};
pub use policies::{Clock, MonotonicClock, RetryPolicy, RetryTimer, Tick};
pub use subscribers::{HandlerFn, HandlerRef, Subscribe};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
