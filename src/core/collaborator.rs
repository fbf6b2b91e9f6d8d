//! # Collaborator contract.
//!
//! External subsystems (link driver, transport client, provisioning stack) are
//! reached only through these traits and through the event bus. The orchestrator
//! calls them from state callbacks; they report progress by posting events.
//!
//! ## Rules
//! - Entry points are synchronous and must return quickly: start the work, then
//!   report completion later with an event (`LINK_CONNECTED`, `TRANSPORT_CONNECTED`, ...).
//! - Entry points run while the orchestrator's state machine is locked. Events they
//!   publish synchronously are queued by the orchestrator and applied once the
//!   current transition completes; [`EventBus::post`](crate::EventBus::post) is
//!   still preferred. Calling back into `Orchestrator` queries from an entry point
//!   blocks.
//! - Failures are returned as [`ControlError`]; the orchestrator logs them and
//!   stays in the state it just entered (the collaborator's own retry policy recovers).

use std::sync::Arc;

use tracing::debug;

use crate::error::ControlError;

/// A subsystem with a start/stop lifecycle (provisioning, display, ...).
pub trait Collaborator: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Starts the subsystem.
    fn start(&self) -> Result<(), ControlError>;

    /// Stops the subsystem and releases its resources.
    fn stop(&self) -> Result<(), ControlError>;
}

/// A subsystem that additionally holds a connection (link, transport).
pub trait Connectivity: Collaborator {
    /// Begins a connection attempt.
    fn connect(&self) -> Result<(), ControlError>;

    /// Tears the connection down.
    fn disconnect(&self) -> Result<(), ControlError>;
}

/// Shared handle to a start/stop collaborator.
pub type CollaboratorRef = Arc<dyn Collaborator>;
/// Shared handle to a connectivity collaborator.
pub type ConnectivityRef = Arc<dyn Connectivity>;

/// Placeholder used when no collaborator was attached: every call succeeds and is logged.
#[derive(Debug, Clone, Copy)]
pub struct Detached {
    name: &'static str,
}

impl Detached {
    /// Creates a placeholder reporting `name` in logs.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Collaborator for Detached {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&self) -> Result<(), ControlError> {
        debug!(collaborator = self.name, "start ignored: detached");
        Ok(())
    }

    fn stop(&self) -> Result<(), ControlError> {
        debug!(collaborator = self.name, "stop ignored: detached");
        Ok(())
    }
}

impl Connectivity for Detached {
    fn connect(&self) -> Result<(), ControlError> {
        debug!(collaborator = self.name, "connect ignored: detached");
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ControlError> {
        debug!(collaborator = self.name, "disconnect ignored: detached");
        Ok(())
    }
}
