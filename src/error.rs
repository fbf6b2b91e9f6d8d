//! Error types used by the event bus, the state machine engine and the orchestrator.
//!
//! This module defines four enums:
//!
//! - [`BusError`]: failures of [`EventBus`](crate::EventBus) operations.
//! - [`FsmError`]: outcomes of [`Fsm`](crate::Fsm) operations.
//! - [`ControlError`]: failures reported by collaborator entry points.
//! - [`OrchestratorError`]: failures of the top-level [`Orchestrator`](crate::Orchestrator).
//!
//! Every enum provides `as_label` (stable snake_case for logs/metrics).
//! `NotFound` outcomes are benign no-ops rather than failures requiring recovery,
//! see [`BusError::is_benign`] and [`FsmError::is_benign`].

use thiserror::Error;

use crate::events::EventId;
use crate::fsm::StateId;

/// # Errors produced by the event bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An argument was rejected (for example a zero queue capacity).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: &'static str,
    },

    /// Operation attempted before `init`, after `deinit`, or a second `init`.
    #[error("invalid bus state: {reason}")]
    InvalidState {
        /// Which state check failed.
        reason: &'static str,
    },

    /// A payload copy could not be allocated.
    #[error("out of memory allocating {len} bytes")]
    OutOfMemory {
        /// Requested allocation size in bytes.
        len: usize,
    },

    /// `unsubscribe` matched no subscription.
    #[error("no subscription for event {filter}")]
    NotFound {
        /// The filter that was looked up.
        filter: EventId,
    },

    /// The async queue was full; the event was dropped.
    #[error("event queue full, dropped event {id}")]
    QueueFull {
        /// Id of the dropped event.
        id: EventId,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::{BusError, EventId};
    ///
    /// let err = BusError::QueueFull { id: EventId::SYSTEM_READY };
    /// assert_eq!(err.as_label(), "bus_queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::InvalidArgument { .. } => "bus_invalid_argument",
            BusError::InvalidState { .. } => "bus_invalid_state",
            BusError::OutOfMemory { .. } => "bus_out_of_memory",
            BusError::NotFound { .. } => "bus_not_found",
            BusError::QueueFull { .. } => "bus_queue_full",
        }
    }

    /// `true` for outcomes that callers treat as a no-op.
    pub fn is_benign(&self) -> bool {
        matches!(self, BusError::NotFound { .. })
    }
}

/// # Outcomes of state machine operations that did not transition.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// The configuration was unusable (empty state table).
    #[error("invalid fsm configuration: {reason}")]
    InvalidArgument {
        /// What was wrong with the configuration.
        reason: &'static str,
    },

    /// Started twice, stopped twice, or fed an event while not running.
    #[error("fsm '{fsm}' is in the wrong run state: {reason}")]
    InvalidState {
        /// Machine name.
        fsm: &'static str,
        /// Which state check failed.
        reason: &'static str,
    },

    /// No transition matched the event in the current state.
    #[error("no transition for event {event} in state {state}")]
    NotFound {
        /// Current state when the event arrived.
        state: StateId,
        /// The unmatched event.
        event: EventId,
    },

    /// A matching transition's guard rejected the event.
    #[error("guard rejected event {event} in state {state}")]
    NotAllowed {
        /// Current state when the event arrived.
        state: StateId,
        /// The rejected event.
        event: EventId,
    },

    /// A state id is absent from the state table.
    #[error("state {state} is not declared in fsm '{fsm}'")]
    UnknownState {
        /// Machine name.
        fsm: &'static str,
        /// The undeclared state.
        state: StateId,
    },
}

impl FsmError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::{EventId, FsmError, StateId};
    ///
    /// let err = FsmError::NotAllowed { state: StateId(1), event: EventId(0x0101) };
    /// assert_eq!(err.as_label(), "fsm_not_allowed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FsmError::InvalidArgument { .. } => "fsm_invalid_argument",
            FsmError::InvalidState { .. } => "fsm_invalid_state",
            FsmError::NotFound { .. } => "fsm_not_found",
            FsmError::NotAllowed { .. } => "fsm_not_allowed",
            FsmError::UnknownState { .. } => "fsm_unknown_state",
        }
    }

    /// `true` when the event was simply irrelevant to the current state.
    pub fn is_benign(&self) -> bool {
        matches!(self, FsmError::NotFound { .. })
    }
}

/// # Errors reported by collaborator entry points (`start`, `connect`, ...).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The collaborator cannot act right now (not initialized, radio off, ...).
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        /// Collaborator name.
        collaborator: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The request was attempted and failed.
    #[error("{collaborator} failed: {reason}")]
    Failed {
        /// Collaborator name.
        collaborator: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::Unavailable { .. } => "control_unavailable",
            ControlError::Failed { .. } => "control_failed",
        }
    }
}

/// # Errors produced by the orchestrator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// `init` was called twice.
    #[error("orchestrator already initialized")]
    AlreadyInitialized,

    /// `start`/`stop` before `init`.
    #[error("orchestrator not initialized")]
    NotInitialized,

    /// An event bus operation failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// A state machine operation failed.
    #[error(transparent)]
    Fsm(#[from] FsmError),
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::AlreadyInitialized => "orchestrator_already_initialized",
            OrchestratorError::NotInitialized => "orchestrator_not_initialized",
            OrchestratorError::Bus(e) => e.as_label(),
            OrchestratorError::Fsm(e) => e.as_label(),
        }
    }
}
