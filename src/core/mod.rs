//! Runtime core: orchestration and collaborator plumbing.
//!
//! ## Wiring
//! ```text
//!  Collaborators (link, transport, provisioning)
//!      │  post(LINK_CONNECTED, TRANSPORT_CONNECTED, ...)
//!      ▼
//!  EventBus ── dispatch task ──► FsmBridge (wildcard) ──► Fsm<OrchestratorCtx>::process_event
//!      ▲                                                        │
//!      │                                                        ├─ on_enter / on_exit
//!      │                                                        ▼
//!      └──────────── post(SYSTEM_READY, ...) ◄────── link.start() / transport.connect() / ...
//!
//!  Reconnector<T> ── step(clock.now()) ──► T::connect()  (fixed-interval retries)
//! ```
//!
//! Internal modules:
//! - `orchestrator`: the fixed state table and the [`Orchestrator`] handle;
//! - `builder`: attaches collaborators;
//! - `collaborator`: the traits collaborators implement;
//! - `reconnect`: the shared retry loop of connectivity collaborators;
//! - `config`: orchestrator and reconnection settings;
//! - `shutdown`: OS termination signals for host loops.

mod builder;
mod collaborator;
mod config;
mod orchestrator;
mod reconnect;
mod shutdown;

pub use builder::OrchestratorBuilder;
pub use collaborator::{
    Collaborator, CollaboratorRef, Connectivity, ConnectivityRef, Detached,
};
pub use config::{OrchestratorConfig, ReconnectConfig};
pub use orchestrator::{AppState, Orchestrator};
pub use reconnect::{ReconnectEvents, Reconnector};
pub use shutdown::wait_for_shutdown_signal;
