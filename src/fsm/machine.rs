//! # Table-driven finite state machine.
//!
//! [`Fsm`] interprets a borrowed state table and transition table over an owned
//! context `C`. The engine never allocates.
//!
//! ## Lifecycle
//! ```text
//! new(cfg) ── current = initial, no callbacks, stopped
//!    │
//! start() ─── running, initial.on_enter
//!    │
//!    ├─ process_event(ev) ── first matching rule ─► guard? ─► exit → action → update → enter
//!    ├─ set_state(id) ────── exit → update → enter (no table, guard or action)
//!    ├─ run() ────────────── current.on_run
//!    │
//! stop() ──── current.on_exit, stopped
//! ```
//!
//! ## Rules
//! - Rules are scanned in table order; the first whose `event` matches and whose
//!   `from` is the current state or [`StateId::ANY`] wins.
//! - No matching rule is `NotFound`: a benign no-op.
//! - A rejecting guard is `NotAllowed` and does not fall through to later rules.
//! - A rule whose target is not declared fails with `UnknownState` before any callback runs.
//! - Callbacks run with `&mut C` and must not block.

use tracing::{debug, error, trace, warn};

use super::table::{FsmConfig, State, StateId, Transition};
use crate::error::FsmError;
use crate::events::EventId;

/// A running (or stopped) state machine instance.
pub struct Fsm<'a, C> {
    name: &'static str,
    states: &'a [State<C>],
    transitions: &'a [Transition<C>],
    initial: StateId,
    current: StateId,
    previous: StateId,
    context: C,
    running: bool,
}

impl<'a, C> Fsm<'a, C> {
    /// Attaches the tables and sets the current state to `cfg.initial` without
    /// invoking any callback. The machine starts stopped.
    ///
    /// Logs a warning for every transition hidden by an earlier rule (guarded or not).
    ///
    /// ### Errors
    /// - `InvalidArgument` if the state table is empty.
    pub fn new(cfg: FsmConfig<'a, C>) -> Result<Self, FsmError> {
        if cfg.states.is_empty() {
            return Err(FsmError::InvalidArgument {
                reason: "state table is empty",
            });
        }
        for s in cfg.shadowed() {
            let t = &cfg.transitions[s.index];
            warn!(
                fsm = cfg.name,
                index = s.index,
                by = s.by,
                from = %t.from,
                event_id = %t.event,
                "transition can never fire"
            );
        }

        debug!(
            fsm = cfg.name,
            states = cfg.states.len(),
            transitions = cfg.transitions.len(),
            initial = %cfg.initial,
            "fsm initialized"
        );
        Ok(Self {
            name: cfg.name,
            states: cfg.states,
            transitions: cfg.transitions,
            initial: cfg.initial,
            current: cfg.initial,
            previous: StateId::INVALID,
            context: cfg.context,
            running: false,
        })
    }

    fn find_state(&self, id: StateId) -> Option<&'a State<C>> {
        let states: &'a [State<C>] = self.states;
        states.iter().find(|s| s.id == id)
    }

    fn unknown(&self, state: StateId) -> FsmError {
        FsmError::UnknownState {
            fsm: self.name,
            state,
        }
    }

    fn enter(&mut self, state: &State<C>) {
        if let Some(f) = state.on_enter {
            f(&mut self.context);
        }
    }

    fn exit_current(&mut self) {
        if let Some(f) = self.find_state(self.current).and_then(|s| s.on_exit) {
            f(&mut self.context);
        }
    }

    /// Enters the initial state and marks the machine running.
    ///
    /// ### Errors
    /// - `InvalidState` if already running.
    /// - `UnknownState` if the initial state is not in the table.
    pub fn start(&mut self) -> Result<(), FsmError> {
        if self.running {
            return Err(FsmError::InvalidState {
                fsm: self.name,
                reason: "already running",
            });
        }
        let initial = self
            .find_state(self.initial)
            .ok_or_else(|| self.unknown(self.initial))?;

        self.current = self.initial;
        self.running = true;
        debug!(fsm = self.name, state = initial.name, "fsm started");
        self.enter(initial);
        Ok(())
    }

    /// Runs the current state's exit callback and marks the machine stopped.
    ///
    /// ### Errors
    /// - `InvalidState` if not running.
    pub fn stop(&mut self) -> Result<(), FsmError> {
        if !self.running {
            return Err(FsmError::InvalidState {
                fsm: self.name,
                reason: "not running",
            });
        }
        self.exit_current();
        self.running = false;
        debug!(fsm = self.name, state = self.state_name(), "fsm stopped");
        Ok(())
    }

    /// Feeds one event to the machine; returns the new current state on success.
    ///
    /// ### Errors
    /// - `InvalidState` if not running.
    /// - `NotFound` if no rule matches (benign).
    /// - `NotAllowed` if the first matching rule's guard rejects.
    /// - `UnknownState` if the rule targets an undeclared state.
    pub fn process_event(&mut self, event: EventId) -> Result<StateId, FsmError> {
        if !self.running {
            return Err(FsmError::InvalidState {
                fsm: self.name,
                reason: "not running",
            });
        }
        let transitions: &'a [Transition<C>] = self.transitions;
        let current = self.current;

        let Some(rule) = transitions.iter().find(|t| t.matches(current, event)) else {
            trace!(fsm = self.name, state = %current, event_id = %event, "no transition");
            return Err(FsmError::NotFound {
                state: current,
                event,
            });
        };

        if rule
            .guard
            .is_some_and(|guard| !guard(&self.context, current, event))
        {
            debug!(fsm = self.name, state = %current, event_id = %event, "guard rejected");
            return Err(FsmError::NotAllowed {
                state: current,
                event,
            });
        }

        let Some(target) = self.find_state(rule.to) else {
            error!(fsm = self.name, from = %current, to = %rule.to, event_id = %event, "target state not declared");
            return Err(self.unknown(rule.to));
        };

        debug!(
            fsm = self.name,
            from = self.state_name(),
            to = target.name,
            event_id = %event,
            "transition"
        );
        self.exit_current();
        if let Some(action) = rule.action {
            action(&mut self.context, event);
        }
        self.previous = current;
        self.current = target.id;
        self.enter(target);
        Ok(target.id)
    }

    /// Forces the current state, bypassing the transition table, guards and actions.
    ///
    /// When running, the exit and enter callbacks run as for a normal transition;
    /// when stopped only the state id moves.
    ///
    /// ### Errors
    /// - `UnknownState` if `state` is not in the table.
    pub fn set_state(&mut self, state: StateId) -> Result<(), FsmError> {
        let target = self.find_state(state).ok_or_else(|| self.unknown(state))?;

        debug!(fsm = self.name, from = self.state_name(), to = target.name, "forced state");
        if self.running {
            self.exit_current();
        }
        self.previous = self.current;
        self.current = state;
        if self.running {
            self.enter(target);
        }
        Ok(())
    }

    /// Invokes the current state's periodic callback. No-op when stopped.
    pub fn run(&mut self) {
        if !self.running {
            return;
        }
        if let Some(f) = self.find_state(self.current).and_then(|s| s.on_run) {
            f(&mut self.context);
        }
    }

    /// Current state id.
    pub fn state(&self) -> StateId {
        self.current
    }

    /// State before the last transition, [`StateId::INVALID`] if none yet.
    pub fn previous_state(&self) -> StateId {
        self.previous
    }

    /// Name of the current state, `"UNKNOWN"` if it is not in the table.
    pub fn state_name(&self) -> &'static str {
        self.find_state(self.current)
            .map(|s| s.name)
            .unwrap_or("UNKNOWN")
    }

    /// `true` if the current state is `state`.
    pub fn is_in_state(&self, state: StateId) -> bool {
        self.current == state
    }

    /// `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Machine name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Shared access to the context.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Exclusive access to the context.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: StateId = StateId(0);
    const S1: StateId = StateId(1);
    const S2: StateId = StateId(2);
    const GHOST: StateId = StateId(9);

    const X: EventId = EventId(0x1000);
    const Y: EventId = EventId(0x1001);
    const Z: EventId = EventId(0x1002);
    const BAD: EventId = EventId(0x1003);

    #[derive(Default)]
    struct Trace {
        calls: Vec<String>,
        allow: bool,
    }

    fn enter_a(t: &mut Trace) {
        t.calls.push("enter A".into());
    }
    fn exit_a(t: &mut Trace) {
        t.calls.push("exit A".into());
    }
    fn enter_s1(t: &mut Trace) {
        t.calls.push("enter S1".into());
    }
    fn exit_s1(t: &mut Trace) {
        t.calls.push("exit S1".into());
    }
    fn enter_s2(t: &mut Trace) {
        t.calls.push("enter S2".into());
    }
    fn run_s1(t: &mut Trace) {
        t.calls.push("run S1".into());
    }
    fn act(t: &mut Trace, ev: EventId) {
        t.calls.push(format!("action {ev}"));
    }
    fn allowed(t: &Trace, _: StateId, _: EventId) -> bool {
        t.allow
    }

    static STATES: [State<Trace>; 3] = [
        State::new(A, "A").on_enter(enter_a).on_exit(exit_a),
        State::new(S1, "S1")
            .on_enter(enter_s1)
            .on_exit(exit_s1)
            .on_run(run_s1),
        State::new(S2, "S2").on_enter(enter_s2),
    ];

    static TRANSITIONS: [Transition<Trace>; 5] = [
        Transition::new(A, X, S1).action(act),
        Transition::new(StateId::ANY, X, S2),
        Transition::new(S1, Y, A).guard(allowed),
        Transition::new(S2, Y, S1),
        Transition::new(A, BAD, GHOST),
    ];

    fn machine() -> Fsm<'static, Trace> {
        Fsm::new(FsmConfig {
            name: "test",
            states: &STATES,
            transitions: &TRANSITIONS,
            initial: A,
            context: Trace::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_empty_state_table() {
        let res = Fsm::new(FsmConfig::<()> {
            name: "empty",
            states: &[],
            transitions: &[],
            initial: A,
            context: (),
        });
        assert!(matches!(res, Err(FsmError::InvalidArgument { .. })));
    }

    #[test]
    fn test_new_does_not_enter() {
        let fsm = machine();
        assert_eq!(fsm.state(), A);
        assert_eq!(fsm.previous_state(), StateId::INVALID);
        assert!(!fsm.is_running());
        assert!(fsm.context().calls.is_empty());
    }

    #[test]
    fn test_process_event_requires_running() {
        let mut fsm = machine();
        assert!(matches!(
            fsm.process_event(X),
            Err(FsmError::InvalidState { .. })
        ));
        assert_eq!(fsm.state(), A);
    }

    #[test]
    fn test_start_and_stop_are_not_reentrant() {
        let mut fsm = machine();
        fsm.start().unwrap();
        assert!(matches!(fsm.start(), Err(FsmError::InvalidState { .. })));
        fsm.stop().unwrap();
        assert!(matches!(fsm.stop(), Err(FsmError::InvalidState { .. })));
        assert_eq!(fsm.context().calls, vec!["enter A", "exit A"]);
    }

    #[test]
    fn test_start_with_undeclared_initial_state() {
        let mut fsm = Fsm::new(FsmConfig {
            name: "ghost",
            states: &STATES,
            transitions: &TRANSITIONS,
            initial: GHOST,
            context: Trace::default(),
        })
        .unwrap();
        assert_eq!(
            fsm.start(),
            Err(FsmError::UnknownState {
                fsm: "ghost",
                state: GHOST
            })
        );
        assert!(!fsm.is_running());
    }

    #[test]
    fn test_first_match_wins() {
        let mut fsm = machine();
        fsm.start().unwrap();
        assert_eq!(fsm.process_event(X), Ok(S1));

        // From S1 the specific rule does not match: the wildcard does.
        assert_eq!(fsm.process_event(X), Ok(S2));
        assert_eq!(fsm.previous_state(), S1);
    }

    #[test]
    fn test_exit_action_enter_order() {
        let mut fsm = machine();
        fsm.start().unwrap();
        fsm.context_mut().calls.clear();

        fsm.process_event(X).unwrap();
        assert_eq!(
            fsm.context().calls,
            vec!["exit A", "action 0x1000", "enter S1"]
        );
    }

    #[test]
    fn test_guard_rejects_without_change() {
        let mut fsm = machine();
        fsm.start().unwrap();
        fsm.process_event(X).unwrap();
        fsm.context_mut().calls.clear();

        assert_eq!(
            fsm.process_event(Y),
            Err(FsmError::NotAllowed { state: S1, event: Y })
        );
        assert_eq!(fsm.state(), S1);
        assert!(fsm.context().calls.is_empty());

        fsm.context_mut().allow = true;
        assert_eq!(fsm.process_event(Y), Ok(A));
    }

    #[test]
    fn test_unmatched_event_is_not_found() {
        let mut fsm = machine();
        fsm.start().unwrap();
        let err = fsm.process_event(Z).unwrap_err();
        assert!(err.is_benign());
        assert_eq!(fsm.state(), A);
    }

    #[test]
    fn test_undeclared_target_leaves_machine_untouched() {
        let mut fsm = machine();
        fsm.start().unwrap();
        fsm.context_mut().calls.clear();

        assert!(matches!(
            fsm.process_event(BAD),
            Err(FsmError::UnknownState { state: GHOST, .. })
        ));
        assert_eq!(fsm.state(), A);
        assert!(fsm.context().calls.is_empty());
    }

    #[test]
    fn test_set_state_lifecycle_depends_on_running() {
        let mut fsm = machine();
        fsm.set_state(S2).unwrap();
        assert_eq!(fsm.state(), S2);
        assert!(fsm.context().calls.is_empty());

        fsm.set_state(A).unwrap();
        fsm.start().unwrap();
        fsm.set_state(S1).unwrap();
        assert_eq!(fsm.context().calls, vec!["enter A", "exit A", "enter S1"]);

        assert!(matches!(
            fsm.set_state(GHOST),
            Err(FsmError::UnknownState { .. })
        ));
        assert_eq!(fsm.state(), S1);
    }

    #[test]
    fn test_run_only_when_running() {
        let mut fsm = machine();
        fsm.set_state(S1).unwrap();
        fsm.run();
        assert!(fsm.context().calls.is_empty());

        fsm.start().unwrap();
        fsm.process_event(X).unwrap();
        fsm.run();
        assert_eq!(fsm.context().calls.last().map(String::as_str), Some("run S1"));
    }

    #[test]
    fn test_state_name_unknown() {
        let mut fsm = machine();
        assert_eq!(fsm.state_name(), "A");
        fsm.current = GHOST;
        assert_eq!(fsm.state_name(), "UNKNOWN");
    }
}
