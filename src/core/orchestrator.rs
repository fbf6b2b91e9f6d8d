//! # Orchestrator: sequences link, transport and provisioning.
//!
//! The [`Orchestrator`] is one fixed instantiation of the [`Fsm`] engine, driven by
//! the [`EventBus`]. It subscribes once to [`EventId::ANY`] and feeds every event id
//! into the state machine; events irrelevant to the current state are no-ops.
//!
//! ## States and transitions
//! Rules are listed in priority order.
//! ```text
//!  #  from                   event                      to
//!  1  INIT                   SYSTEM_INIT_DONE           LINK_CONNECTING
//!  2  LINK_CONNECTING        LINK_CONNECTED             LINK_UP
//!  3  LINK_CONNECTING        CMD_PROVISIONING_START     PROVISIONING
//!  4  LINK_UP                LINK_ADDRESS_ACQUIRED      TRANSPORT_CONNECTING
//!  5  LINK_UP                LINK_DISCONNECTED          LINK_CONNECTING
//!  6  TRANSPORT_CONNECTING   TRANSPORT_CONNECTED        READY
//!  7  TRANSPORT_CONNECTING   LINK_DISCONNECTED          LINK_CONNECTING
//!  8  READY                  LINK_DISCONNECTED          LINK_CONNECTING
//!  9  READY                  TRANSPORT_DISCONNECTED     TRANSPORT_CONNECTING
//! 10  READY                  CMD_PROVISIONING_START     PROVISIONING
//! 11  PROVISIONING           PROVISIONING_DONE          LINK_CONNECTING
//! 12  PROVISIONING           CMD_PROVISIONING_STOP      LINK_CONNECTING
//! 13  ANY                    SYSTEM_ERROR               ERROR   (guard: not already in ERROR)
//! ```
//!
//! ## Callbacks
//! - `INIT` enter: posts `SYSTEM_INIT_DONE`.
//! - `LINK_CONNECTING` enter: `link.start()`.
//! - `LINK_UP` enter: waits for an address (log only).
//! - `TRANSPORT_CONNECTING` enter: `transport.connect()`.
//! - `READY` enter: posts `SYSTEM_READY`.
//! - `PROVISIONING` enter/exit: `provisioning.start()` / `provisioning.stop()`.
//! - `ERROR` enter: posts `SYSTEM_ERROR` for observers.
//!
//! ## Rules
//! - The catch-all error rule is last, so the specific degradation rules win.
//! - Collaborator failures are logged and never abort a transition.
//! - Callbacks run with the state machine locked and only publish asynchronously.
//! - Events a collaborator publishes synchronously from a callback reach the
//!   orchestrator while its machine is still locked on the same thread. They are
//!   queued and applied, in order, right after the current transition.
//! - The orchestrator never schedules reconnections: collaborators retry on their own.
//! - No state defines periodic work, so [`Orchestrator::tick`] is a no-op with the
//!   built-in table; the host loop keeps it for the engine contract and mainly
//!   waits for cancellation or a shutdown signal.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::builder::OrchestratorBuilder;
use crate::core::collaborator::{CollaboratorRef, ConnectivityRef};
use crate::core::config::OrchestratorConfig;
use crate::core::shutdown;
use crate::error::{ControlError, FsmError, OrchestratorError};
use crate::events::{Event, EventBus, EventId, SourceId};
use crate::fsm::{Fsm, FsmConfig, State, StateId, Transition};
use crate::subscribers::{HandlerRef, Subscribe};

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AppState {
    /// Boot; leaves immediately on `SYSTEM_INIT_DONE`.
    Init = 0,
    /// Link collaborator started, waiting for association.
    LinkConnecting = 1,
    /// Associated, waiting for a network address.
    LinkUp = 2,
    /// Address acquired, transport connecting.
    TransportConnecting = 3,
    /// Link and transport up.
    Ready = 4,
    /// Out-of-band provisioning running.
    Provisioning = 5,
    /// Fatal error.
    Error = 6,
}

impl AppState {
    /// Every state, in table order.
    pub const ALL: [AppState; 7] = [
        AppState::Init,
        AppState::LinkConnecting,
        AppState::LinkUp,
        AppState::TransportConnecting,
        AppState::Ready,
        AppState::Provisioning,
        AppState::Error,
    ];

    /// State id in the orchestrator's table.
    #[inline]
    pub const fn id(self) -> StateId {
        StateId(self as u16)
    }

    /// Inverse of [`id`](Self::id).
    pub fn from_id(id: StateId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Name as reported by [`Orchestrator::state_name`].
    pub const fn name(self) -> &'static str {
        match self {
            AppState::Init => "INIT",
            AppState::LinkConnecting => "LINK_CONNECTING",
            AppState::LinkUp => "LINK_UP",
            AppState::TransportConnecting => "TRANSPORT_CONNECTING",
            AppState::Ready => "READY",
            AppState::Provisioning => "PROVISIONING",
            AppState::Error => "ERROR",
        }
    }
}

/// Context owned by the orchestrator's state machine.
pub(crate) struct OrchestratorCtx {
    pub bus: EventBus,
    pub link: ConnectivityRef,
    pub transport: ConnectivityRef,
    pub provisioning: CollaboratorRef,
}

impl OrchestratorCtx {
    fn post(&self, id: EventId) {
        if let Err(e) = self.bus.post(id, SourceId::SYSTEM) {
            warn!(event_id = %id, error = %e, label = e.as_label(), "post failed");
        }
    }
}

fn report(collaborator: &'static str, call: &'static str, res: Result<(), ControlError>) {
    if let Err(e) = res {
        warn!(collaborator, call, error = %e, label = e.as_label(), "collaborator call failed");
    }
}

fn enter_init(ctx: &mut OrchestratorCtx) {
    info!("==> INIT");
    ctx.post(EventId::SYSTEM_INIT_DONE);
}

fn enter_link_connecting(ctx: &mut OrchestratorCtx) {
    info!("==> LINK_CONNECTING");
    report(ctx.link.name(), "start", ctx.link.start());
}

fn enter_link_up(_: &mut OrchestratorCtx) {
    info!("==> LINK_UP (waiting for address)");
}

fn enter_transport_connecting(ctx: &mut OrchestratorCtx) {
    info!("==> TRANSPORT_CONNECTING");
    report(ctx.transport.name(), "connect", ctx.transport.connect());
}

fn enter_ready(ctx: &mut OrchestratorCtx) {
    info!("==> READY");
    ctx.post(EventId::SYSTEM_READY);
}

fn enter_provisioning(ctx: &mut OrchestratorCtx) {
    info!("==> PROVISIONING");
    report(ctx.provisioning.name(), "start", ctx.provisioning.start());
}

fn exit_provisioning(ctx: &mut OrchestratorCtx) {
    info!("<== PROVISIONING");
    report(ctx.provisioning.name(), "stop", ctx.provisioning.stop());
}

fn enter_error(ctx: &mut OrchestratorCtx) {
    error!("==> ERROR");
    ctx.post(EventId::SYSTEM_ERROR);
}

fn not_in_error(_: &OrchestratorCtx, current: StateId, _: EventId) -> bool {
    current != AppState::Error.id()
}

static STATES: [State<OrchestratorCtx>; 7] = [
    State::new(AppState::Init.id(), AppState::Init.name()).on_enter(enter_init),
    State::new(AppState::LinkConnecting.id(), AppState::LinkConnecting.name())
        .on_enter(enter_link_connecting),
    State::new(AppState::LinkUp.id(), AppState::LinkUp.name()).on_enter(enter_link_up),
    State::new(
        AppState::TransportConnecting.id(),
        AppState::TransportConnecting.name(),
    )
    .on_enter(enter_transport_connecting),
    State::new(AppState::Ready.id(), AppState::Ready.name()).on_enter(enter_ready),
    State::new(AppState::Provisioning.id(), AppState::Provisioning.name())
        .on_enter(enter_provisioning)
        .on_exit(exit_provisioning),
    State::new(AppState::Error.id(), AppState::Error.name()).on_enter(enter_error),
];

// Order is priority: specific rules first, the catch-all last.
static TRANSITIONS: [Transition<OrchestratorCtx>; 13] = [
    Transition::new(
        AppState::Init.id(),
        EventId::SYSTEM_INIT_DONE,
        AppState::LinkConnecting.id(),
    ),
    Transition::new(
        AppState::LinkConnecting.id(),
        EventId::LINK_CONNECTED,
        AppState::LinkUp.id(),
    ),
    Transition::new(
        AppState::LinkConnecting.id(),
        EventId::CMD_PROVISIONING_START,
        AppState::Provisioning.id(),
    ),
    Transition::new(
        AppState::LinkUp.id(),
        EventId::LINK_ADDRESS_ACQUIRED,
        AppState::TransportConnecting.id(),
    ),
    Transition::new(
        AppState::LinkUp.id(),
        EventId::LINK_DISCONNECTED,
        AppState::LinkConnecting.id(),
    ),
    Transition::new(
        AppState::TransportConnecting.id(),
        EventId::TRANSPORT_CONNECTED,
        AppState::Ready.id(),
    ),
    Transition::new(
        AppState::TransportConnecting.id(),
        EventId::LINK_DISCONNECTED,
        AppState::LinkConnecting.id(),
    ),
    Transition::new(
        AppState::Ready.id(),
        EventId::LINK_DISCONNECTED,
        AppState::LinkConnecting.id(),
    ),
    Transition::new(
        AppState::Ready.id(),
        EventId::TRANSPORT_DISCONNECTED,
        AppState::TransportConnecting.id(),
    ),
    Transition::new(
        AppState::Ready.id(),
        EventId::CMD_PROVISIONING_START,
        AppState::Provisioning.id(),
    ),
    Transition::new(
        AppState::Provisioning.id(),
        EventId::PROVISIONING_DONE,
        AppState::LinkConnecting.id(),
    ),
    Transition::new(
        AppState::Provisioning.id(),
        EventId::CMD_PROVISIONING_STOP,
        AppState::LinkConnecting.id(),
    ),
    Transition::new(StateId::ANY, EventId::SYSTEM_ERROR, AppState::Error.id()).guard(not_in_error),
];

type AppFsm = Fsm<'static, OrchestratorCtx>;

thread_local! {
    // Machines locked by the current thread, by address.
    static LOCKED_HERE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Pops its key from [`LOCKED_HERE`] on drop.
struct LockMark(usize);

impl Drop for LockMark {
    fn drop(&mut self) {
        let _ = LOCKED_HERE.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|k| *k == self.0) {
                held.remove(pos);
            }
        });
    }
}

fn apply(fsm: &mut AppFsm, id: EventId) {
    match fsm.process_event(id) {
        Ok(to) => debug!(event_id = %id, to = %to, "state transition triggered"),
        Err(e) if e.is_benign() => {}
        Err(FsmError::InvalidState { .. }) => {}
        Err(e) => debug!(event_id = %id, error = %e, label = e.as_label(), "event not applied"),
    }
}

/// The orchestrator's state machine and the events raised while it was locked.
struct SharedFsm {
    fsm: Mutex<AppFsm>,
    deferred: Mutex<VecDeque<EventId>>,
}

impl SharedFsm {
    fn new(fsm: AppFsm) -> Self {
        Self {
            fsm: Mutex::new(fsm),
            deferred: Mutex::new(VecDeque::new()),
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    fn is_locked_here(&self) -> bool {
        let key = self.key();
        LOCKED_HERE.with(|held| held.borrow().contains(&key))
    }

    fn deferred(&self) -> MutexGuard<'_, VecDeque<EventId>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with the machine locked, then applies the events deferred meanwhile.
    fn with<R>(&self, f: impl FnOnce(&mut AppFsm) -> R) -> R {
        let mut fsm = self.fsm.lock().unwrap_or_else(PoisonError::into_inner);
        let key = self.key();
        LOCKED_HERE.with(|held| held.borrow_mut().push(key));
        let _mark = LockMark(key);

        let out = f(&mut *fsm);
        loop {
            let next = self.deferred().pop_front();
            let Some(id) = next else { break };
            apply(&mut *fsm, id);
        }
        out
    }

    /// Feeds one event id into the machine.
    ///
    /// Re-entrant calls from the thread holding the lock are queued instead of blocking.
    fn feed(&self, id: EventId) {
        if self.is_locked_here() {
            debug!(event_id = %id, "event raised during a transition, deferred");
            self.deferred().push_back(id);
            return;
        }
        self.with(|fsm| apply(fsm, id));
    }
}

/// Bus handler forwarding every event id into the state machine.
struct FsmBridge {
    fsm: Arc<SharedFsm>,
}

impl Subscribe for FsmBridge {
    fn on_event(&self, ev: &Event) {
        self.fsm.feed(ev.id);
    }

    fn name(&self) -> &'static str {
        "orchestrator"
    }
}

/// Top-level coordinator of the device's connectivity lifecycle.
///
/// Built with [`Orchestrator::builder`]; see the module docs for the state table.
pub struct Orchestrator {
    cfg: OrchestratorConfig,
    bus: EventBus,
    fsm: Arc<SharedFsm>,
    handler: Mutex<Option<HandlerRef>>,
}

impl Orchestrator {
    /// Returns a builder with the given configuration.
    pub fn builder(cfg: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: OrchestratorConfig,
        ctx: OrchestratorCtx,
    ) -> Result<Self, OrchestratorError> {
        let bus = ctx.bus.clone();
        let fsm = Fsm::new(FsmConfig {
            name: cfg.name,
            states: &STATES,
            transitions: &TRANSITIONS,
            initial: AppState::Init.id(),
            context: ctx,
        })?;
        Ok(Self {
            cfg,
            bus,
            fsm: Arc::new(SharedFsm::new(fsm)),
            handler: Mutex::new(None),
        })
    }

    fn handler(&self) -> MutexGuard<'_, Option<HandlerRef>> {
        self.handler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes the state machine to every event on the bus.
    ///
    /// Also re-subscribes after the bus was deinitialized and initialized again,
    /// which drops every subscription.
    ///
    /// ### Errors
    /// - `AlreadyInitialized` while the subscription is live (until [`stop`](Self::stop)).
    /// - `Bus(InvalidState)` if the bus is not initialized.
    pub fn init(&self) -> Result<(), OrchestratorError> {
        let mut slot = self.handler();
        if let Some(handler) = slot.as_ref() {
            if self.bus.is_subscribed(handler) {
                return Err(OrchestratorError::AlreadyInitialized);
            }
            debug!(fsm = self.cfg.name, "subscription lost with the bus, subscribing again");
        }
        let handler: HandlerRef = match slot.take() {
            Some(handler) => handler,
            None => Arc::new(FsmBridge {
                fsm: Arc::clone(&self.fsm),
            }),
        };
        self.bus.subscribe(EventId::ANY, Arc::clone(&handler))?;
        *slot = Some(handler);

        info!(fsm = self.cfg.name, "orchestrator initialized");
        Ok(())
    }

    /// Enters INIT, which immediately posts `SYSTEM_INIT_DONE`.
    ///
    /// ### Errors
    /// - `NotInitialized` before [`init`](Self::init).
    /// - `Fsm(InvalidState)` if already started.
    pub fn start(&self) -> Result<(), OrchestratorError> {
        if self.handler().is_none() {
            return Err(OrchestratorError::NotInitialized);
        }
        self.fsm.with(|fsm| fsm.start())?;
        Ok(())
    }

    /// Detaches from the bus and stops the state machine (running the current exit callback).
    ///
    /// Call [`init`](Self::init) again before restarting.
    ///
    /// ### Errors
    /// - `NotInitialized` before [`init`](Self::init).
    /// - `Fsm(InvalidState)` if not started.
    pub fn stop(&self) -> Result<(), OrchestratorError> {
        let Some(handler) = self.handler().take() else {
            return Err(OrchestratorError::NotInitialized);
        };
        match self.bus.unsubscribe_all(&handler) {
            Ok(_) => {}
            Err(e) => debug!(error = %e, "bus already torn down"),
        }
        self.fsm.with(|fsm| fsm.stop())?;
        info!(fsm = self.cfg.name, "orchestrator stopped");
        Ok(())
    }

    /// Current state.
    pub fn state(&self) -> AppState {
        let id = self.fsm.with(|fsm| fsm.state());
        AppState::from_id(id).unwrap_or_else(|| {
            error!(fsm = self.cfg.name, state = %id, "state id missing from AppState, reporting ERROR");
            debug_assert!(false, "state id {id} missing from AppState");
            AppState::Error
        })
    }

    /// State before the last transition, `None` before the first one.
    pub fn previous_state(&self) -> Option<AppState> {
        AppState::from_id(self.fsm.with(|fsm| fsm.previous_state()))
    }

    /// Name of the current state.
    pub fn state_name(&self) -> &'static str {
        self.fsm.with(|fsm| fsm.state_name())
    }

    /// `true` if the current state is `state`.
    pub fn is_in_state(&self, state: AppState) -> bool {
        self.fsm.with(|fsm| fsm.is_in_state(state.id()))
    }

    /// `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.fsm.with(|fsm| fsm.is_running())
    }

    /// Requests provisioning by posting `CMD_PROVISIONING_START`.
    ///
    /// Honoured from LINK_CONNECTING and READY; ignored elsewhere.
    pub fn enter_provisioning(&self) -> Result<(), OrchestratorError> {
        self.bus
            .post(EventId::CMD_PROVISIONING_START, SourceId::SYSTEM)?;
        Ok(())
    }

    /// Cancels provisioning by posting `CMD_PROVISIONING_STOP`.
    pub fn leave_provisioning(&self) -> Result<(), OrchestratorError> {
        self.bus
            .post(EventId::CMD_PROVISIONING_STOP, SourceId::SYSTEM)?;
        Ok(())
    }

    /// Runs the current state's periodic callback once.
    ///
    /// The built-in states define none, so this changes nothing today.
    pub fn tick(&self) {
        self.fsm.with(|fsm| fsm.run());
    }

    /// Host loop: ticks every `step_interval` until `token` is cancelled or the
    /// process receives a termination signal, then stops the orchestrator.
    ///
    /// Expects [`init`](Self::init) and [`start`](Self::start) to have been called.
    pub async fn run(&self, token: CancellationToken) -> Result<(), OrchestratorError> {
        let mut ticker = interval(self.cfg.step_interval_clamped());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let signal = shutdown::wait_for_shutdown_signal();
        tokio::pin!(signal);
        let mut signals = true;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(fsm = self.cfg.name, "host loop cancelled");
                    break;
                }
                res = &mut signal, if signals => match res {
                    Ok(()) => {
                        info!(fsm = self.cfg.name, "shutdown signal received");
                        token.cancel();
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "signal handlers unavailable, relying on the token");
                        signals = false;
                    }
                },
                _ = ticker.tick() => self.tick(),
            }
        }

        self.stop()
    }
}
