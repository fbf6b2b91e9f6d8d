use std::sync::Arc;

use crate::core::collaborator::{CollaboratorRef, ConnectivityRef, Detached};
use crate::core::config::OrchestratorConfig;
use crate::core::orchestrator::{Orchestrator, OrchestratorCtx};
use crate::error::OrchestratorError;
use crate::events::EventBus;

/// Builder for constructing an [`Orchestrator`] with its collaborators.
///
/// Collaborators that are not attached are replaced by [`Detached`] placeholders
/// that accept every call.
pub struct OrchestratorBuilder {
    cfg: OrchestratorConfig,
    link: Option<ConnectivityRef>,
    transport: Option<ConnectivityRef>,
    provisioning: Option<CollaboratorRef>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: OrchestratorConfig) -> Self {
        Self {
            cfg,
            link: None,
            transport: None,
            provisioning: None,
        }
    }

    /// Sets the link collaborator (started on entering LINK_CONNECTING).
    pub fn with_link(mut self, link: ConnectivityRef) -> Self {
        self.link = Some(link);
        self
    }

    /// Sets the transport collaborator (connected on entering TRANSPORT_CONNECTING).
    pub fn with_transport(mut self, transport: ConnectivityRef) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the provisioning collaborator (started/stopped around PROVISIONING).
    pub fn with_provisioning(mut self, provisioning: CollaboratorRef) -> Self {
        self.provisioning = Some(provisioning);
        self
    }

    /// Builds the orchestrator on `bus`.
    ///
    /// The state machine is created stopped and detached: call
    /// [`Orchestrator::init`] then [`Orchestrator::start`].
    pub fn build(self, bus: EventBus) -> Result<Orchestrator, OrchestratorError> {
        let ctx = OrchestratorCtx {
            bus,
            link: self
                .link
                .unwrap_or_else(|| Arc::new(Detached::new("link"))),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(Detached::new("transport"))),
            provisioning: self
                .provisioning
                .unwrap_or_else(|| Arc::new(Detached::new("provisioning"))),
        };
        Orchestrator::new_internal(self.cfg, ctx)
    }
}
